// SPDX-License-Identifier: AGPL-3.0
// R2 Uploader Core - Bucket storage
//
// Bucket definitions are stored in a local JSON file. The engine only reads
// the active bucket through `BucketProvider`.

use crate::settings::SettingsStore;
use crate::store::{self, Versioned};
use crate::types::{AppError, BucketConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

/// Supplies the bucket transfers are sent to
pub trait BucketProvider: Send + Sync {
    fn active_bucket(&self) -> Option<BucketConfig>;
}

impl BucketProvider for BucketConfig {
    fn active_bucket(&self) -> Option<BucketConfig> {
        Some(self.clone())
    }
}

/// File-based bucket store with auto-incrementing ids
pub struct BucketStore {
    state: RwLock<BucketsFile>,
    file_path: PathBuf,
}

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BucketsFile {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    next_id: u32,
    buckets: Vec<BucketConfig>,
}

impl Versioned for BucketsFile {
    const CURRENT_VERSION: u32 = 1;

    fn version(&self) -> u32 {
        self.version
    }

    fn set_version(&mut self, version: u32) {
        self.version = version;
    }
}

impl BucketStore {
    /// Open the bucket store in the application config directory
    pub fn new() -> Result<Self, AppError> {
        Self::open(store::config_file("buckets.json")?)
    }

    /// Open the bucket store at `file_path`, loading from disk if available
    pub fn open(file_path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let file_path = file_path.into();
        let mut state = store::load::<BucketsFile>(&file_path)?.unwrap_or_default();

        // Files written before `nextId` existed
        let max_id = state.buckets.iter().map(|b| b.id).max().unwrap_or(0);
        state.next_id = state.next_id.max(max_id + 1);

        Ok(Self {
            state: RwLock::new(state),
            file_path,
        })
    }

    /// Persist buckets to disk
    fn persist(&self, state: &BucketsFile) -> Result<(), AppError> {
        let mut file = state.clone();
        file.version = BucketsFile::CURRENT_VERSION;
        store::write(&self.file_path, &file)
    }

    pub fn list(&self) -> Vec<BucketConfig> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .buckets
            .clone()
    }

    pub fn get(&self, id: u32) -> Option<BucketConfig> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .buckets
            .iter()
            .find(|b| b.id == id)
            .cloned()
    }

    /// Add a bucket, assigning it a fresh id
    pub fn add(&self, mut bucket: BucketConfig) -> Result<BucketConfig, AppError> {
        bucket.validate()?;

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        bucket.id = state.next_id;
        state.next_id += 1;
        state.buckets.push(bucket.clone());

        if let Err(e) = self.persist(&state) {
            state.buckets.pop();
            state.next_id -= 1;
            return Err(e);
        }

        tracing::info!("Added bucket {} ({})", bucket.id, bucket.bucket_name);
        Ok(bucket)
    }

    /// Replace the bucket with the same id
    pub fn update(&self, bucket: BucketConfig) -> Result<BucketConfig, AppError> {
        bucket.validate()?;

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let slot = state
            .buckets
            .iter_mut()
            .find(|b| b.id == bucket.id)
            .ok_or_else(|| AppError::InvalidConfig(format!("Bucket not found: {}", bucket.id)))?;
        let previous = std::mem::replace(slot, bucket.clone());

        if let Err(e) = self.persist(&state) {
            if let Some(slot) = state.buckets.iter_mut().find(|b| b.id == bucket.id) {
                *slot = previous;
            }
            return Err(e);
        }
        Ok(bucket)
    }

    pub fn delete(&self, id: u32) -> Result<(), AppError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let index = state
            .buckets
            .iter()
            .position(|b| b.id == id)
            .ok_or_else(|| AppError::InvalidConfig(format!("Bucket not found: {}", id)))?;
        let removed = state.buckets.remove(index);

        if let Err(e) = self.persist(&state) {
            state.buckets.insert(index, removed);
            return Err(e);
        }

        tracing::info!("Deleted bucket {}", id);
        Ok(())
    }
}

/// Active bucket picked from settings: the explicit selection if any, else the
/// default bucket id
pub struct ConfiguredBucket {
    buckets: Arc<BucketStore>,
    settings: Arc<SettingsStore>,
    selected: RwLock<Option<u32>>,
}

impl ConfiguredBucket {
    pub fn new(buckets: Arc<BucketStore>, settings: Arc<SettingsStore>) -> Self {
        Self {
            buckets,
            settings,
            selected: RwLock::new(None),
        }
    }

    /// Select a bucket for this session without changing the saved default
    pub fn select(&self, id: Option<u32>) {
        *self.selected.write().unwrap_or_else(PoisonError::into_inner) = id;
    }
}

impl BucketProvider for ConfiguredBucket {
    fn active_bucket(&self) -> Option<BucketConfig> {
        let selected = *self.selected.read().unwrap_or_else(PoisonError::into_inner);
        let id = selected.or(self.settings.get().default_bucket_id)?;
        self.buckets.get(id)
    }
}
