// SPDX-License-Identifier: AGPL-3.0
// R2 Uploader Core - Engine Bridge
//
// Runs the StagingEngine on its own task. Frontends talk to it through a
// command channel, executors push notifications into a second channel, and
// engine events fan out over a broadcast channel.

use crate::buckets::BucketProvider;
use crate::engine::{ClearReport, EngineEvent, QueuedItem, StagingEngine};
use crate::executor::{TransferExecutor, TransferNotification, TransferNotifier};
use crate::history::{HistoryEntry, StatusCategory, TransferHistory};
use crate::item::StagedItem;
use crate::normalizer::{self, ClipboardReader, IngestFailure, IngestReport, Normalizer};
use crate::status::UploadProgress;
use crate::types::AppError;
use async_channel::{Receiver, Sender};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Commands that can be sent to the engine
#[derive(Debug)]
pub enum EngineCommand {
    IngestPaths {
        paths: Vec<String>,
        reply: Sender<IngestReport>,
    },
    IngestClipboard {
        reply: Sender<IngestReport>,
    },
    AddText {
        content: String,
        remote_name: String,
        reply: Sender<Result<StagedItem, AppError>>,
    },
    Rename {
        id: String,
        remote_name: Option<String>,
        remote_name_prefix: Option<String>,
        reply: Sender<Result<StagedItem, AppError>>,
    },
    StartTransfers {
        reply: Sender<Result<usize, AppError>>,
    },
    Cancel {
        id: String,
        reply: Sender<Result<HistoryEntry, AppError>>,
    },
    ClearWaiting {
        reply: Sender<ClearReport>,
    },
    GetItems {
        reply: Sender<Vec<QueuedItem>>,
    },
    GetProgress {
        reply: Sender<HashMap<String, UploadProgress>>,
    },
}

/// A normalized batch on its way back into the engine
struct ResolvedBatch {
    report: IngestReport,
    reply: Sender<IngestReport>,
}

/// Bridge between frontends and the staging engine
pub struct EngineBridge {
    command_tx: Sender<EngineCommand>,
    events: broadcast::Sender<EngineEvent>,
    history: Arc<TransferHistory>,
    task: JoinHandle<()>,
}

impl EngineBridge {
    /// Spawn the engine task on the current Tokio runtime
    pub fn spawn(
        history: Arc<TransferHistory>,
        buckets: Arc<dyn BucketProvider>,
        executor: Arc<dyn TransferExecutor>,
        normalizer: Normalizer,
        clipboard: Option<Arc<dyn ClipboardReader>>,
    ) -> Self {
        let (command_tx, command_rx) = async_channel::bounded::<EngineCommand>(32);
        let (notification_tx, notification_rx) = async_channel::bounded::<TransferNotification>(256);

        let engine = StagingEngine::new(
            history.clone(),
            buckets,
            executor,
            TransferNotifier::new(notification_tx),
        );
        let events = engine.event_sender();

        let task = tokio::spawn(async move {
            Self::run_engine(engine, normalizer, clipboard, command_rx, notification_rx).await;
        });

        Self {
            command_tx,
            events,
            history,
            task,
        }
    }

    async fn run_engine(
        mut engine: StagingEngine,
        normalizer: Normalizer,
        clipboard: Option<Arc<dyn ClipboardReader>>,
        command_rx: Receiver<EngineCommand>,
        notification_rx: Receiver<TransferNotification>,
    ) {
        let (batch_tx, batch_rx) = async_channel::unbounded::<ResolvedBatch>();
        tracing::info!("Staging engine started");

        loop {
            tokio::select! {
                // Handle commands from frontends
                cmd = command_rx.recv() => {
                    match cmd {
                        Ok(EngineCommand::IngestPaths { paths, reply }) => {
                            let normalizer = normalizer.clone();
                            let batch_tx = batch_tx.clone();
                            tokio::spawn(async move {
                                let report = normalizer.normalize_paths(&paths).await;
                                let _ = batch_tx.send(ResolvedBatch { report, reply }).await;
                            });
                        }
                        Ok(EngineCommand::IngestClipboard { reply }) => {
                            let Some(clipboard) = clipboard.clone() else {
                                let report = IngestReport {
                                    staged: Vec::new(),
                                    failures: vec![IngestFailure {
                                        source: "clipboard".to_string(),
                                        error: AppError::Clipboard("No clipboard available".to_string()),
                                    }],
                                };
                                let _ = reply.send(engine.stage_batch(report)).await;
                                continue;
                            };
                            let normalizer = normalizer.clone();
                            let batch_tx = batch_tx.clone();
                            tokio::spawn(async move {
                                let report = normalizer.normalize_clipboard(clipboard.as_ref()).await;
                                let _ = batch_tx.send(ResolvedBatch { report, reply }).await;
                            });
                        }
                        Ok(EngineCommand::AddText { content, remote_name, reply }) => {
                            let item = normalizer::text_item(content, remote_name);
                            let result = engine.stage(item.clone()).map(|_| item);
                            let _ = reply.send(result).await;
                        }
                        Ok(EngineCommand::Rename { id, remote_name, remote_name_prefix, reply }) => {
                            let _ = reply.send(engine.rename(&id, remote_name, remote_name_prefix)).await;
                        }
                        Ok(EngineCommand::StartTransfers { reply }) => {
                            let _ = reply.send(engine.start_transfers()).await;
                        }
                        Ok(EngineCommand::Cancel { id, reply }) => {
                            let _ = reply.send(engine.cancel(&id)).await;
                        }
                        Ok(EngineCommand::ClearWaiting { reply }) => {
                            let _ = reply.send(engine.clear_waiting()).await;
                        }
                        Ok(EngineCommand::GetItems { reply }) => {
                            let _ = reply.send(engine.items()).await;
                        }
                        Ok(EngineCommand::GetProgress { reply }) => {
                            let _ = reply.send(engine.progress()).await;
                        }
                        Err(_) => break, // Channel closed
                    }
                }
                // Stage batches whose paths finished resolving
                Ok(batch) = batch_rx.recv() => {
                    let report = engine.stage_batch(batch.report);
                    let _ = batch.reply.send(report).await;
                }
                // Executor progress and outcomes; rejections are logged by the engine
                Ok(notification) = notification_rx.recv() => {
                    let _ = engine.handle_notification(notification, Instant::now());
                }
            }
        }

        tracing::info!("Staging engine stopped");
    }

    async fn request<T>(&self, make: impl FnOnce(Sender<T>) -> EngineCommand) -> Result<T, AppError> {
        let (reply_tx, reply_rx) = async_channel::bounded(1);
        self.command_tx
            .send(make(reply_tx))
            .await
            .map_err(|_| AppError::EngineStopped)?;
        reply_rx.recv().await.map_err(|_| AppError::EngineStopped)
    }

    /// Stage the files under each path; resolves once the whole batch is staged
    pub async fn ingest_paths(&self, paths: Vec<String>) -> Result<IngestReport, AppError> {
        self.request(|reply| EngineCommand::IngestPaths { paths, reply })
            .await
    }

    /// Stage whatever the clipboard holds
    pub async fn ingest_clipboard(&self) -> Result<IngestReport, AppError> {
        self.request(|reply| EngineCommand::IngestClipboard { reply })
            .await
    }

    /// Stage user-authored text under `remote_name`
    pub async fn add_text(
        &self,
        content: impl Into<String>,
        remote_name: impl Into<String>,
    ) -> Result<StagedItem, AppError> {
        let (content, remote_name) = (content.into(), remote_name.into());
        self.request(|reply| EngineCommand::AddText {
            content,
            remote_name,
            reply,
        })
        .await?
    }

    pub async fn rename(
        &self,
        id: impl Into<String>,
        remote_name: Option<String>,
        remote_name_prefix: Option<String>,
    ) -> Result<StagedItem, AppError> {
        let id = id.into();
        self.request(|reply| EngineCommand::Rename {
            id,
            remote_name,
            remote_name_prefix,
            reply,
        })
        .await?
    }

    /// Start every waiting item; returns how many were handed to the executor
    pub async fn start_transfers(&self) -> Result<usize, AppError> {
        self.request(|reply| EngineCommand::StartTransfers { reply })
            .await?
    }

    pub async fn cancel(&self, id: impl Into<String>) -> Result<HistoryEntry, AppError> {
        let id = id.into();
        self.request(|reply| EngineCommand::Cancel { id, reply })
            .await?
    }

    /// Cancel every item that has not started
    pub async fn clear_waiting(&self) -> Result<ClearReport, AppError> {
        self.request(|reply| EngineCommand::ClearWaiting { reply })
            .await
    }

    /// Queue snapshot with statuses
    pub async fn items(&self) -> Result<Vec<QueuedItem>, AppError> {
        self.request(|reply| EngineCommand::GetItems { reply }).await
    }

    pub async fn progress(&self) -> Result<HashMap<String, UploadProgress>, AppError> {
        self.request(|reply| EngineCommand::GetProgress { reply })
            .await
    }

    /// One page of history, most recent first
    pub fn history_page(&self, offset: usize, limit: usize) -> Vec<HistoryEntry> {
        self.history.page(offset, limit)
    }

    pub fn history_by_category(&self, category: StatusCategory) -> Vec<HistoryEntry> {
        self.history.list_by_status_category(category)
    }

    /// Get a receiver for engine events
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Close the command channel and wait for the engine task to finish
    pub async fn shutdown(self) {
        self.command_tx.close();
        if let Err(e) = self.task.await {
            tracing::error!("Engine task failed: {}", e);
        }
    }
}
