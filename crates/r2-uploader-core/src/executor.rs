// SPDX-License-Identifier: AGPL-3.0
// R2 Uploader Core - Transfer executor contract
//
// The executor moves the bytes. The engine hands it one request per item
// and then only listens to the notifications it pushes back.

use crate::item::ItemSource;
use crate::types::{AppError, BucketConfig};
use async_channel::Sender;

/// Everything the executor needs to upload one item
#[derive(Debug, Clone, PartialEq)]
pub struct TransferRequest {
    pub item_id: String,
    pub source: ItemSource,
    /// Object key inside the bucket
    pub destination: String,
    pub bucket: BucketConfig,
}

/// What the executor reports about an item
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationKind {
    Progress {
        bytes_transferred: u64,
        total_bytes: u64,
    },
    Success,
    /// The executor aborted the transfer after a cancel request
    CancelledAck,
    Error {
        message: String,
        code: String,
    },
}

impl NotificationKind {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransferNotification {
    pub item_id: String,
    pub kind: NotificationKind,
}

/// Handle the executor uses to push notifications back to the engine
#[derive(Debug, Clone)]
pub struct TransferNotifier {
    tx: Sender<TransferNotification>,
}

impl TransferNotifier {
    pub fn new(tx: Sender<TransferNotification>) -> Self {
        Self { tx }
    }

    async fn push(&self, item_id: &str, kind: NotificationKind) {
        let notification = TransferNotification {
            item_id: item_id.to_string(),
            kind,
        };
        if self.tx.send(notification).await.is_err() {
            tracing::debug!("Engine gone, dropping notification for {}", item_id);
        }
    }

    pub async fn progress(&self, item_id: &str, bytes_transferred: u64, total_bytes: u64) {
        self.push(
            item_id,
            NotificationKind::Progress {
                bytes_transferred,
                total_bytes,
            },
        )
        .await
    }

    pub async fn success(&self, item_id: &str) {
        self.push(item_id, NotificationKind::Success).await
    }

    pub async fn cancelled(&self, item_id: &str) {
        self.push(item_id, NotificationKind::CancelledAck).await
    }

    pub async fn error(&self, item_id: &str, message: impl Into<String>, code: impl Into<String>) {
        self.push(
            item_id,
            NotificationKind::Error {
                message: message.into(),
                code: code.into(),
            },
        )
        .await
    }
}

/// Performs transfers on behalf of the engine.
///
/// `start` must return without waiting for the upload; progress and the
/// single terminal outcome are reported through the notifier. `cancel` asks
/// for an abort. Any concurrency limit is the executor's own policy.
pub trait TransferExecutor: Send + Sync {
    fn start(&self, request: TransferRequest, notifier: TransferNotifier) -> Result<(), AppError>;

    fn cancel(&self, item_id: &str);
}
