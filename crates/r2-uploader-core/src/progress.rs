// SPDX-License-Identifier: AGPL-3.0
// R2 Uploader Core - Progress aggregation
//
// Keeps the latest upload metrics per item and derives speed from
// consecutive samples.

use crate::status::UploadProgress;
use std::collections::HashMap;
use std::time::Instant;

struct Tracked {
    latest: UploadProgress,
    sampled_at: Instant,
}

/// Latest `Uploading` payload per item id
#[derive(Default)]
pub struct ProgressAggregator {
    entries: HashMap<String, Tracked>,
}

impl ProgressAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a raw sample into the item's metrics.
    ///
    /// Returns `None` when the sample goes backwards; it is dropped and logged.
    pub fn record(
        &mut self,
        id: &str,
        bytes_transferred: u64,
        total_bytes: u64,
        at: Instant,
    ) -> Option<UploadProgress> {
        let speed = match self.entries.get(id) {
            Some(prev) if bytes_transferred < prev.latest.bytes_transferred => {
                tracing::warn!(
                    "Discarding stale progress for {}: {} bytes after {}",
                    id,
                    bytes_transferred,
                    prev.latest.bytes_transferred
                );
                return None;
            }
            Some(prev) => {
                let elapsed = at.saturating_duration_since(prev.sampled_at).as_secs_f64();
                if elapsed > 0.0 {
                    (bytes_transferred - prev.latest.bytes_transferred) as f64 / elapsed
                } else {
                    prev.latest.speed
                }
            }
            None => 0.0,
        };

        let progress = if total_bytes == 0 {
            0.0
        } else {
            (bytes_transferred as f64 / total_bytes as f64).min(1.0)
        };

        let latest = UploadProgress {
            progress,
            bytes_transferred,
            total_bytes,
            speed,
        };
        self.entries.insert(
            id.to_string(),
            Tracked {
                latest,
                sampled_at: at,
            },
        );
        Some(latest)
    }

    pub fn get(&self, id: &str) -> Option<UploadProgress> {
        self.entries.get(id).map(|t| t.latest)
    }

    /// Forget an item once it reaches a terminal state
    pub fn remove(&mut self, id: &str) -> Option<UploadProgress> {
        self.entries.remove(id).map(|t| t.latest)
    }

    pub fn snapshot(&self) -> HashMap<String, UploadProgress> {
        self.entries
            .iter()
            .map(|(id, t)| (id.clone(), t.latest))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
