// SPDX-License-Identifier: AGPL-3.0
// R2 Uploader Core - Settings persistence
//
// Settings are stored in a local JSON file.
// No cloud sync, no tracking, just simple local persistence.

use crate::store::{self, Versioned};
use crate::types::{AppError, AppSettings};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};

/// In-memory cache of settings, persisted to disk on changes
pub struct SettingsStore {
    settings: RwLock<AppSettings>,
    file_path: PathBuf,
}

#[derive(Serialize, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    settings: AppSettings,
}

impl Versioned for SettingsFile {
    const CURRENT_VERSION: u32 = 1;

    fn version(&self) -> u32 {
        self.version
    }

    fn set_version(&mut self, version: u32) {
        self.version = version;
    }
}

impl SettingsStore {
    /// Open the settings file in the application config directory
    pub fn new() -> Result<Self, AppError> {
        Self::open(store::config_file("settings.json")?)
    }

    /// Open settings at `file_path`, creating the file with defaults if needed
    pub fn open(file_path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let file_path = file_path.into();
        tracing::info!("Settings file path: {:?}", file_path);

        let loaded = store::load::<SettingsFile>(&file_path)?;
        let created = loaded.is_none();
        let settings = loaded.map(|file| file.settings).unwrap_or_else(|| {
            tracing::info!("No settings file found, using defaults");
            AppSettings::default()
        });

        let store = Self {
            settings: RwLock::new(settings),
            file_path,
        };

        if created {
            tracing::info!("Creating initial settings file");
            store.persist()?;
        }

        Ok(store)
    }

    /// Persist settings to disk
    fn persist(&self) -> Result<(), AppError> {
        let file = SettingsFile {
            version: SettingsFile::CURRENT_VERSION,
            settings: self.get(),
        };
        store::write(&self.file_path, &file)
    }

    /// Get current settings
    pub fn get(&self) -> AppSettings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Update settings and persist to disk
    pub fn update(&self, new_settings: AppSettings) -> Result<(), AppError> {
        tracing::info!("Updating settings, locale: {}", new_settings.locale);
        {
            let mut settings = self.settings.write().unwrap_or_else(PoisonError::into_inner);
            *settings = new_settings;
        }

        let result = self.persist();
        if let Err(e) = &result {
            tracing::error!("Failed to persist settings: {}", e);
        }
        result
    }

    /// Choose the bucket selected on startup
    pub fn set_default_bucket(&self, bucket_id: Option<u32>) -> Result<(), AppError> {
        let mut settings = self.get();
        settings.default_bucket_id = bucket_id;
        self.update(settings)
    }
}
