// SPDX-License-Identifier: AGPL-3.0
// R2 Uploader Core - Shared logic for all frontends
//
// This crate provides:
// - StagedItem, TransferStatus and the status machine
// - Normalizer for turning paths, clipboard content and text into items
// - preview_file for small image and text previews of local files
// - StagingEngine and EngineBridge for queueing and tracking transfers
// - TransferHistory for the durable record of finished transfers
// - BucketStore and SettingsStore for persistent configuration
//
// Moving bytes to the bucket is the job of a TransferExecutor supplied by
// the frontend.

pub mod bridge;
pub mod buckets;
pub mod engine;
pub mod executor;
pub mod history;
pub mod item;
pub mod normalizer;
pub mod preview;
pub mod progress;
pub mod queue;
pub mod settings;
pub mod status;
pub mod store;
pub mod types;

// Re-export commonly used items
pub use bridge::{EngineBridge, EngineCommand};
pub use buckets::{BucketProvider, BucketStore, ConfiguredBucket};
pub use engine::{ClearReport, EngineEvent, QueuedItem, StagingEngine};
pub use executor::{
    NotificationKind, TransferExecutor, TransferNotification, TransferNotifier, TransferRequest,
};
pub use history::{HistoryEntry, StatusCategory, TransferHistory};
pub use item::{ItemKind, ItemSource, StagedItem};
pub use normalizer::{
    ClipboardReader, FsPathResolver, IngestFailure, IngestReport, Normalizer, PathResolver,
    ResolvedPath,
};
pub use preview::{preview_file, FilePreview};
pub use progress::ProgressAggregator;
pub use queue::StagingQueue;
pub use settings::SettingsStore;
pub use status::{TransferEvent, TransferStatus, UploadProgress};
pub use types::{AppError, AppSettings, BucketConfig, BucketKind};
