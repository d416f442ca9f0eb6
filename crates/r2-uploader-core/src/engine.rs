// SPDX-License-Identifier: AGPL-3.0
// R2 Uploader Core - Staging engine
//
// Owns the staging queue and every item's transfer status. All mutations go
// through `&mut self`, so whoever holds the engine is the single point where
// transitions are serialized (see `EngineBridge`). Observers subscribe to
// `EngineEvent`s instead of reading engine state directly.

use crate::buckets::BucketProvider;
use crate::executor::{NotificationKind, TransferExecutor, TransferNotification, TransferNotifier, TransferRequest};
use crate::history::{HistoryEntry, TransferHistory};
use crate::item::StagedItem;
use crate::normalizer::{IngestFailure, IngestReport};
use crate::progress::ProgressAggregator;
use crate::queue::StagingQueue;
use crate::status::{TransferEvent, TransferStatus, UploadProgress};
use crate::types::AppError;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;

/// Error code recorded when the executor refuses to start a transfer
pub const EXECUTOR_ERROR_CODE: &str = "EXECUTOR_ERROR";

/// Change notifications for frontends
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    ItemStaged(StagedItem),
    ItemRenamed(StagedItem),
    StatusChanged {
        item_id: String,
        status: TransferStatus,
    },
    /// The item reached a terminal state and left the queue
    ItemSettled(HistoryEntry),
    /// Transient, user-facing message
    Alert(String),
}

/// Outcome of clearing the waiting items
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClearReport {
    pub cancelled: Vec<HistoryEntry>,
    /// Items that were cancelled but whose history entry is still unwritten
    pub failures: Vec<(String, AppError)>,
}

/// A queued item together with its current status
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedItem {
    pub item: StagedItem,
    pub status: TransferStatus,
}

pub struct StagingEngine {
    queue: StagingQueue,
    statuses: HashMap<String, TransferStatus>,
    progress: ProgressAggregator,
    /// Public URL per item, fixed when its transfer starts
    remote_urls: HashMap<String, String>,
    /// Items cancelled mid-upload whose executor has not reported back yet
    awaiting_ack: HashSet<String>,
    /// Settled entries whose history write failed; retried on every settle
    pending_history: Vec<HistoryEntry>,
    history: Arc<TransferHistory>,
    buckets: Arc<dyn BucketProvider>,
    executor: Arc<dyn TransferExecutor>,
    notifier: TransferNotifier,
    events: broadcast::Sender<EngineEvent>,
}

impl StagingEngine {
    pub fn new(
        history: Arc<TransferHistory>,
        buckets: Arc<dyn BucketProvider>,
        executor: Arc<dyn TransferExecutor>,
        notifier: TransferNotifier,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            queue: StagingQueue::new(),
            statuses: HashMap::new(),
            progress: ProgressAggregator::new(),
            remote_urls: HashMap::new(),
            awaiting_ack: HashSet::new(),
            pending_history: Vec::new(),
            history,
            buckets,
            executor,
            notifier,
            events,
        }
    }

    /// Subscribe to engine events
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Sender side of the event channel, for subscribing after the engine moves
    pub fn event_sender(&self) -> broadcast::Sender<EngineEvent> {
        self.events.clone()
    }

    fn emit(&self, event: EngineEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Add one item to the queue in `Waiting`
    pub fn stage(&mut self, item: StagedItem) -> Result<(), AppError> {
        if self.settled_status(item.id()).is_some() {
            let err = AppError::DuplicateItem(item.id().to_string());
            tracing::error!("{}", err);
            return Err(err);
        }
        if let Err(err) = self.queue.append(item.clone()) {
            tracing::error!("{}", err);
            return Err(err);
        }

        tracing::info!("Staged {} as {}", item.id(), item.remote_name);
        self.statuses
            .insert(item.id().to_string(), TransferStatus::Waiting);
        self.emit(EngineEvent::ItemStaged(item));
        Ok(())
    }

    /// Stage the items of an ingestion batch.
    ///
    /// The returned report lists what was actually staged; items the queue
    /// refused join the batch's own failures. Failures raise one alert.
    pub fn stage_batch(&mut self, batch: IngestReport) -> IngestReport {
        let mut report = IngestReport {
            staged: Vec::new(),
            failures: batch.failures,
        };

        for item in batch.staged {
            match self.stage(item.clone()) {
                Ok(()) => report.staged.push(item),
                Err(error) => report.failures.push(IngestFailure {
                    source: item.remote_name,
                    error,
                }),
            }
        }

        if !report.failures.is_empty() {
            let sources: Vec<_> = report.failures.iter().map(|f| f.source.as_str()).collect();
            self.emit(EngineEvent::Alert(format!(
                "Could not add {} item(s): {}",
                report.failures.len(),
                sources.join(", ")
            )));
        }
        report
    }

    /// Change the remote naming of an item that has not started uploading
    pub fn rename(
        &mut self,
        id: &str,
        remote_name: Option<String>,
        remote_name_prefix: Option<String>,
    ) -> Result<StagedItem, AppError> {
        let status = self.current_status(id, "rename")?;
        if *status != TransferStatus::Waiting {
            return Err(AppError::InvalidTransition {
                id: id.to_string(),
                from: status.label(),
                event: "rename",
            });
        }

        let item = self
            .queue
            .find_by_id_mut(id)
            .ok_or_else(|| AppError::ItemNotFound(id.to_string()))?;
        if let Some(name) = remote_name {
            item.remote_name = name;
        }
        if let Some(prefix) = remote_name_prefix {
            item.remote_name_prefix = prefix;
        }

        let item = item.clone();
        self.emit(EngineEvent::ItemRenamed(item.clone()));
        Ok(item)
    }

    /// Hand every `Waiting` item to the executor.
    ///
    /// Fails with `NoBucketConfigured` before touching any item when there
    /// is no active bucket. Returns how many transfers were started.
    pub fn start_transfers(&mut self) -> Result<usize, AppError> {
        let bucket = self.buckets.active_bucket().ok_or_else(|| {
            tracing::warn!("Upload requested with no bucket configured");
            AppError::NoBucketConfigured
        })?;

        let waiting: Vec<StagedItem> = self
            .queue
            .iter()
            .filter(|i| self.statuses.get(i.id()) == Some(&TransferStatus::Waiting))
            .cloned()
            .collect();

        let mut started = 0;
        for item in waiting {
            let id = item.id().to_string();
            let destination = item.object_key();
            let total_bytes = item.source().known_len().unwrap_or(0);

            self.transition(&id, TransferEvent::Start { total_bytes })?;
            self.remote_urls
                .insert(id.clone(), bucket.public_url(&destination));

            let request = TransferRequest {
                item_id: id.clone(),
                source: item.source().clone(),
                destination,
                bucket: bucket.clone(),
            };

            match self.executor.start(request, self.notifier.clone()) {
                Ok(()) => {
                    tracing::info!("Started transfer of {} to {}", id, bucket.bucket_name);
                    started += 1;
                }
                Err(e) => {
                    tracing::error!("Executor refused {}: {}", id, e);
                    if let Err(record_err) = self.transition(
                        &id,
                        TransferEvent::Fail {
                            message: e.to_string(),
                            code: EXECUTOR_ERROR_CODE.to_string(),
                        },
                    ) {
                        tracing::error!("Failed to settle {}: {}", id, record_err);
                    }
                }
            }
        }

        Ok(started)
    }

    /// Cancel an item that is waiting or uploading
    pub fn cancel(&mut self, id: &str) -> Result<HistoryEntry, AppError> {
        let was_uploading = matches!(
            self.current_status(id, "cancel")?,
            TransferStatus::Uploading(_)
        );

        if was_uploading {
            self.awaiting_ack.insert(id.to_string());
            self.executor.cancel(id);
        }
        let entry = self.transition(id, TransferEvent::Cancel)?;
        tracing::info!("Cancelled {}", id);
        entry.ok_or_else(|| AppError::ItemNotFound(id.to_string()))
    }

    /// Cancel every item that has not started uploading.
    ///
    /// Items whose cancellation could not be written to history are still
    /// cancelled; they are listed in `failures` and their entries stay pending.
    pub fn clear_waiting(&mut self) -> ClearReport {
        let waiting: Vec<String> = self
            .queue
            .iter()
            .filter(|i| self.statuses.get(i.id()) == Some(&TransferStatus::Waiting))
            .map(|i| i.id().to_string())
            .collect();

        let mut report = ClearReport::default();
        for id in waiting {
            match self.cancel(&id) {
                Ok(entry) => report.cancelled.push(entry),
                Err(e) => report.failures.push((id, e)),
            }
        }
        report
    }

    /// React to a notification from the executor.
    ///
    /// Returns the history entry when the item settled, `None` when it is
    /// still uploading or the sample was discarded.
    pub fn handle_notification(
        &mut self,
        notification: TransferNotification,
        at: Instant,
    ) -> Result<Option<HistoryEntry>, AppError> {
        let id = notification.item_id.as_str();

        // Whatever the executor ends with after a cancel, the item already settled
        if notification.kind.is_terminal() && self.awaiting_ack.remove(id) {
            tracing::debug!("Executor finished {} after cancel: {:?}", id, notification.kind);
            return Ok(None);
        }

        match notification.kind {
            NotificationKind::Progress {
                bytes_transferred,
                total_bytes,
            } => {
                let status = self.current_status(id, "progress")?;
                if status.upload_progress().is_none() {
                    let err = AppError::InvalidTransition {
                        id: id.to_string(),
                        from: status.label(),
                        event: "progress",
                    };
                    tracing::error!("{}", err);
                    return Err(err);
                }

                match self.progress.record(id, bytes_transferred, total_bytes, at) {
                    Some(sample) => self.transition(id, TransferEvent::Progress(sample)),
                    None => Ok(None),
                }
            }
            NotificationKind::Success => self.transition(id, TransferEvent::Complete),
            NotificationKind::CancelledAck => self.transition(id, TransferEvent::Cancel),
            NotificationKind::Error { message, code } => {
                tracing::warn!("Transfer of {} failed ({}): {}", id, code, message);
                self.transition(id, TransferEvent::Fail { message, code })
            }
        }
    }

    /// Status of a queued item, or the rejection for one that is gone
    fn current_status(&self, id: &str, event: &'static str) -> Result<&TransferStatus, AppError> {
        if let Some(status) = self.statuses.get(id) {
            return Ok(status);
        }

        if self.awaiting_ack.contains(id) {
            tracing::debug!("Ignoring {} for cancelled item {}", event, id);
            return Err(AppError::InvalidTransition {
                id: id.to_string(),
                from: TransferStatus::Cancelled.label(),
                event,
            });
        }

        match self.settled_status(id) {
            Some(settled) => {
                let err = AppError::InvalidTransition {
                    id: id.to_string(),
                    from: settled.label(),
                    event,
                };
                tracing::error!("{}", err);
                Err(err)
            }
            None => {
                tracing::warn!("{} for unknown item {}", event, id);
                Err(AppError::ItemNotFound(id.to_string()))
            }
        }
    }

    /// Apply `event` through the status machine; settles on a terminal state
    fn transition(
        &mut self,
        id: &str,
        event: TransferEvent,
    ) -> Result<Option<HistoryEntry>, AppError> {
        let event_name = event.name();
        let next = self
            .current_status(id, event_name)?
            .apply(event)
            .map_err(|illegal| {
                let err = illegal.for_item(id);
                tracing::error!("{}", err);
                err
            })?;

        if next.is_terminal() {
            return self.settle(id, next).map(Some);
        }

        self.statuses.insert(id.to_string(), next.clone());
        self.emit(EngineEvent::StatusChanged {
            item_id: id.to_string(),
            status: next,
        });
        Ok(None)
    }

    /// Terminal status of an item that already left the queue
    fn settled_status(&self, id: &str) -> Option<TransferStatus> {
        self.pending_history
            .iter()
            .find(|e| e.item_id == id)
            .map(|e| e.status.clone())
            .or_else(|| self.history.get(id).map(|e| e.status))
    }

    /// Move an item out of the queue and into history.
    ///
    /// `ItemSettled` is only announced once the entry is written. If the
    /// write fails the entry stays pending and the error is returned.
    fn settle(&mut self, id: &str, status: TransferStatus) -> Result<HistoryEntry, AppError> {
        let item = self
            .queue
            .remove(id)
            .ok_or_else(|| AppError::ItemNotFound(id.to_string()))?;
        self.statuses.remove(id);
        self.progress.remove(id);

        let entry = HistoryEntry {
            item_id: id.to_string(),
            filename: item.object_key(),
            timestamp: Utc::now(),
            remote_url: self.remote_urls.remove(id).unwrap_or_default(),
            status: status.clone(),
        };

        self.emit(EngineEvent::StatusChanged {
            item_id: id.to_string(),
            status,
        });

        self.pending_history.push(entry.clone());
        match self.write_pending_history().into_iter().find(|(failed, _)| failed == id) {
            Some((_, e)) => {
                self.emit(EngineEvent::Alert(format!(
                    "Could not save history for {}: {}",
                    entry.filename, e
                )));
                Err(e)
            }
            None => Ok(entry),
        }
    }

    /// Write pending entries in settle order; returns the ones that failed
    fn write_pending_history(&mut self) -> Vec<(String, AppError)> {
        let mut failures = Vec::new();
        for entry in std::mem::take(&mut self.pending_history) {
            match self.history.record(entry.clone()) {
                Ok(()) => self.emit(EngineEvent::ItemSettled(entry)),
                Err(AppError::DuplicateHistoryEntry(_)) => {
                    tracing::warn!("History already holds {}", entry.item_id);
                }
                Err(e) => {
                    tracing::error!("Failed to record history for {}: {}", entry.item_id, e);
                    failures.push((entry.item_id.clone(), e));
                    self.pending_history.push(entry);
                }
            }
        }
        failures
    }

    /// Snapshot of the queue with statuses, in staging order
    pub fn items(&self) -> Vec<QueuedItem> {
        self.queue
            .iter()
            .map(|item| QueuedItem {
                item: item.clone(),
                status: self.statuses.get(item.id()).cloned().unwrap_or_default(),
            })
            .collect()
    }

    /// Current status of a queued or settled item
    pub fn status(&self, id: &str) -> Option<TransferStatus> {
        self.statuses
            .get(id)
            .cloned()
            .or_else(|| self.settled_status(id))
    }

    /// Live metrics of uploading items
    pub fn progress(&self) -> HashMap<String, UploadProgress> {
        self.progress.snapshot()
    }

    pub fn history(&self) -> &Arc<TransferHistory> {
        &self.history
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }
}
