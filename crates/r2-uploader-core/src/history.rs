// SPDX-License-Identifier: AGPL-3.0
// R2 Uploader Core - Transfer history persistence
//
// Append-only record of finished transfers, stored in a local JSON file.
// Entries are never edited or removed; a correction is a new entry.

use crate::status::TransferStatus;
use crate::store::{self, Versioned};
use crate::types::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};

/// Immutable record of one finished transfer attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub item_id: String,
    pub filename: String,
    /// When the transfer reached its terminal state
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub remote_url: String,
    pub status: TransferStatus,
}

/// Filter used by history views
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StatusCategory {
    #[default]
    All,
    /// Waiting or uploading. Entries are only written once terminal, so
    /// history never has any; the live queue is the place to look.
    InProgress,
    /// Uploaded successfully
    Completed,
}

impl StatusCategory {
    pub fn matches(&self, status: &TransferStatus) -> bool {
        match self {
            Self::All => true,
            Self::InProgress => !status.is_terminal(),
            Self::Completed => matches!(status, TransferStatus::Success),
        }
    }
}

impl std::str::FromStr for StatusCategory {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All),
            "in-progress" | "inProgress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            other => Err(AppError::InvalidConfig(format!(
                "Unknown status category: {}",
                other
            ))),
        }
    }
}

/// File-based transfer history storage
pub struct TransferHistory {
    /// Most recent first
    records: RwLock<Vec<HistoryEntry>>,
    file_path: PathBuf,
}

#[derive(Serialize, Deserialize)]
struct HistoryFile {
    #[serde(default)]
    version: u32,
    records: Vec<HistoryEntry>,
}

impl Versioned for HistoryFile {
    const CURRENT_VERSION: u32 = 1;

    fn version(&self) -> u32 {
        self.version
    }

    fn set_version(&mut self, version: u32) {
        self.version = version;
    }
}

impl TransferHistory {
    /// Open the history in the application config directory
    pub fn new() -> Result<Self, AppError> {
        Self::open(store::config_file("history.json")?)
    }

    /// Open the history stored at `file_path`, loading existing entries
    pub fn open(file_path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let file_path = file_path.into();

        let mut records = store::load::<HistoryFile>(&file_path)?
            .map(|file| file.records)
            .unwrap_or_default();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        tracing::info!(
            "Loaded {} history entries from {:?}",
            records.len(),
            file_path
        );

        Ok(Self {
            records: RwLock::new(records),
            file_path,
        })
    }

    /// Persist history to disk
    fn persist(&self, records: &[HistoryEntry]) -> Result<(), AppError> {
        let file = HistoryFile {
            version: HistoryFile::CURRENT_VERSION,
            records: records.to_vec(),
        };
        store::write(&self.file_path, &file)
    }

    /// Append an entry. It is on disk once this returns `Ok`.
    ///
    /// Only terminal outcomes are recorded and each item appears at most once.
    pub fn record(&self, entry: HistoryEntry) -> Result<(), AppError> {
        if !entry.status.is_terminal() {
            return Err(AppError::InvalidTransition {
                id: entry.item_id,
                from: entry.status.label(),
                event: "record",
            });
        }

        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        if records.iter().any(|r| r.item_id == entry.item_id) {
            return Err(AppError::DuplicateHistoryEntry(entry.item_id));
        }

        let index = records.partition_point(|r| r.timestamp > entry.timestamp);
        records.insert(index, entry);

        if let Err(e) = self.persist(&records) {
            records.remove(index);
            return Err(e);
        }
        Ok(())
    }

    /// Entries matching `category`, most recent first
    pub fn list_by_status_category(&self, category: StatusCategory) -> Vec<HistoryEntry> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| category.matches(&r.status))
            .cloned()
            .collect()
    }

    /// One page of entries ordered by timestamp, most recent first
    pub fn page(&self, offset: usize, limit: usize) -> Vec<HistoryEntry> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Look up the entry written for an item
    pub fn get(&self, item_id: &str) -> Option<HistoryEntry> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|r| r.item_id == item_id)
            .cloned()
    }

    /// Get the count of history entries
    pub fn count(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, minutes: i64, status: TransferStatus) -> HistoryEntry {
        HistoryEntry {
            item_id: id.to_string(),
            filename: format!("{}.txt", id),
            timestamp: DateTime::from_timestamp(minutes * 60, 0).unwrap(),
            remote_url: format!("https://cdn.example.com/{}.txt", id),
            status,
        }
    }

    fn open_temp() -> (tempfile::TempDir, TransferHistory) {
        let dir = tempfile::tempdir().unwrap();
        let history = TransferHistory::open(dir.path().join("history.json")).unwrap();
        (dir, history)
    }

    #[test]
    fn test_pagination_most_recent_first() {
        let (_dir, history) = open_temp();
        for i in 0..25 {
            history
                .record(entry(&format!("item-{}", i), i, TransferStatus::Success))
                .unwrap();
        }

        let first = history.page(0, 10);
        assert_eq!(first.len(), 10);
        assert_eq!(first[0].item_id, "item-24");
        assert_eq!(first[9].item_id, "item-15");

        let last = history.page(20, 10);
        assert_eq!(last.len(), 5);
        assert_eq!(last[4].item_id, "item-0");

        assert!(history.page(30, 10).is_empty());
    }

    #[test]
    fn test_out_of_order_timestamps_stay_sorted() {
        let (_dir, history) = open_temp();
        history.record(entry("b", 20, TransferStatus::Success)).unwrap();
        history.record(entry("a", 10, TransferStatus::Success)).unwrap();
        history.record(entry("c", 30, TransferStatus::Cancelled)).unwrap();

        let ids: Vec<_> = history.page(0, 10).into_iter().map(|e| e.item_id).collect();
        assert_eq!(ids, ["c", "b", "a"]);
    }

    #[test]
    fn test_entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        {
            let history = TransferHistory::open(&path).unwrap();
            history.record(entry("a", 1, TransferStatus::Success)).unwrap();
            history.record(entry("b", 2, TransferStatus::Cancelled)).unwrap();
        }

        let reopened = TransferHistory::open(&path).unwrap();
        assert_eq!(reopened.count(), 2);
        assert_eq!(reopened.get("b").unwrap().status, TransferStatus::Cancelled);
    }

    #[test]
    fn test_duplicate_item_rejected() {
        let (_dir, history) = open_temp();
        history.record(entry("a", 1, TransferStatus::Success)).unwrap();
        let err = history
            .record(entry("a", 2, TransferStatus::Success))
            .unwrap_err();
        assert_eq!(err, AppError::DuplicateHistoryEntry("a".into()));
        assert_eq!(history.count(), 1);
    }

    #[test]
    fn test_non_terminal_status_rejected() {
        let (_dir, history) = open_temp();
        assert!(history
            .record(entry("a", 1, TransferStatus::Waiting))
            .is_err());
        assert_eq!(history.count(), 0);
    }

    #[test]
    fn test_status_categories() {
        let (_dir, history) = open_temp();
        history.record(entry("ok", 1, TransferStatus::Success)).unwrap();
        history.record(entry("stop", 2, TransferStatus::Cancelled)).unwrap();
        history
            .record(entry(
                "bad",
                3,
                TransferStatus::Error {
                    message: "403".into(),
                    code: "UPLOAD_ERROR".into(),
                },
            ))
            .unwrap();

        assert_eq!(history.list_by_status_category(StatusCategory::All).len(), 3);
        let completed = history.list_by_status_category(StatusCategory::Completed);
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].item_id, "ok");
        assert!(history
            .list_by_status_category(StatusCategory::InProgress)
            .is_empty());
    }

    #[test]
    fn test_legacy_file_without_version_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let legacy = serde_json::json!({
            "records": [{
                "itemId": "old",
                "filename": "old.png",
                "timestamp": "2024-01-01T00:00:00Z",
                "status": "success"
            }]
        });
        std::fs::write(&path, legacy.to_string()).unwrap();

        let history = TransferHistory::open(&path).unwrap();
        let old = history.get("old").unwrap();
        assert_eq!(old.remote_url, "");
        assert_eq!(old.status, TransferStatus::Success);
    }
}
