// SPDX-License-Identifier: AGPL-3.0
// R2 Uploader Core - Versioned JSON files
//
// Every store keeps its state in one JSON document carrying a `version`
// field. Schema changes only add fields with serde defaults, so loading an
// older document and writing it back under the current version never drops
// rows. Documents from a newer version are readable but never overwritten.

use crate::types::AppError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// A document with a schema version
pub trait Versioned: Serialize + DeserializeOwned {
    const CURRENT_VERSION: u32;

    fn version(&self) -> u32;
    fn set_version(&mut self, version: u32);
}

/// Resolve `name` inside the application config directory, creating the directory
pub fn config_file(name: &str) -> Result<PathBuf, AppError> {
    let config_dir = directories::ProjectDirs::from("com", "r2uploader", "r2-uploader")
        .ok_or_else(|| AppError::FileIo("Could not determine config directory".to_string()))?
        .config_dir()
        .to_path_buf();

    fs::create_dir_all(&config_dir)
        .map_err(|e| AppError::FileIo(format!("Failed to create config dir: {}", e)))?;

    Ok(config_dir.join(name))
}

/// Load a document, upgrading older versions in place.
///
/// Returns `Ok(None)` when the file is missing or unreadable as JSON. An
/// unparsable file is renamed to `<file>.corrupt` so its contents survive.
pub fn load<T: Versioned>(path: &Path) -> Result<Option<T>, AppError> {
    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(path)
        .map_err(|e| AppError::FileIo(format!("Failed to read {}: {}", path.display(), e)))?;

    let mut doc: T = match serde_json::from_str(&content) {
        Ok(doc) => doc,
        Err(e) => {
            let aside = corrupt_path(path);
            tracing::warn!(
                "Failed to parse {}, moving it to {}: {}",
                path.display(),
                aside.display(),
                e
            );
            fs::rename(path, &aside).map_err(|e| {
                AppError::FileIo(format!("Failed to move aside {}: {}", path.display(), e))
            })?;
            return Ok(None);
        }
    };

    let found = doc.version();
    if found < T::CURRENT_VERSION {
        tracing::info!(
            "Migrating {} from version {} to {}",
            path.display(),
            found,
            T::CURRENT_VERSION
        );
        doc.set_version(T::CURRENT_VERSION);
        write(path, &doc)?;
    } else if found > T::CURRENT_VERSION {
        tracing::warn!(
            "{} was written by a newer version ({}), opening it read-only",
            path.display(),
            found
        );
    }

    Ok(Some(doc))
}

#[derive(Deserialize)]
struct VersionOnly {
    #[serde(default)]
    version: u32,
}

/// Version of the document currently at `path`, if it is readable JSON
fn version_on_disk(path: &Path) -> Option<u32> {
    let content = fs::read_to_string(path).ok()?;
    serde_json::from_str::<VersionOnly>(&content)
        .ok()
        .map(|doc| doc.version)
}

/// Write a document atomically: temp file in the same directory, then rename.
///
/// Refuses to replace a document written by a newer version, whose fields
/// this build would silently drop.
pub fn write<T: Versioned>(path: &Path, doc: &T) -> Result<(), AppError> {
    if let Some(found) = version_on_disk(path) {
        if found > T::CURRENT_VERSION {
            tracing::error!(
                "Not overwriting {}: written by version {}, this build writes {}",
                path.display(),
                found,
                T::CURRENT_VERSION
            );
            return Err(AppError::InvalidConfig(format!(
                "{} was written by a newer version of R2 Uploader",
                path.display()
            )));
        }
    }

    let content = serde_json::to_string_pretty(doc)
        .map_err(|e| AppError::Serialization(format!("Failed to serialize {}: {}", path.display(), e)))?;

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, content)
        .map_err(|e| AppError::FileIo(format!("Failed to write {}: {}", tmp.display(), e)))?;
    fs::rename(&tmp, path)
        .map_err(|e| AppError::FileIo(format!("Failed to replace {}: {}", path.display(), e)))?;

    Ok(())
}

fn corrupt_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".corrupt");
    path.with_file_name(name)
}
