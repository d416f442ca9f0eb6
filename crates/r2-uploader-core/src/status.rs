// SPDX-License-Identifier: AGPL-3.0
// R2 Uploader Core - Transfer status machine
//
// Every legal status change goes through `TransferStatus::apply`.

use crate::types::AppError;
use serde::{Deserialize, Serialize};

/// Live metrics of an item that is uploading
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgress {
    /// Fraction done, 0.0 to 1.0
    pub progress: f64,
    pub bytes_transferred: u64,
    pub total_bytes: u64,
    /// Bytes per second between the two most recent samples
    pub speed: f64,
}

impl UploadProgress {
    pub fn starting(total_bytes: u64) -> Self {
        Self {
            total_bytes,
            ..Self::default()
        }
    }
}

/// Transfer state of one item
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransferStatus {
    #[default]
    Waiting,
    Uploading(UploadProgress),
    Success,
    Cancelled,
    Error { message: String, code: String },
}

/// Something that happened to an item's transfer
#[derive(Debug, Clone, PartialEq)]
pub enum TransferEvent {
    Start { total_bytes: u64 },
    Progress(UploadProgress),
    Complete,
    Fail { message: String, code: String },
    Cancel,
}

impl TransferEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Progress(_) => "progress",
            Self::Complete => "complete",
            Self::Fail { .. } => "fail",
            Self::Cancel => "cancel",
        }
    }
}

/// A status change the machine refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IllegalTransition {
    pub from: &'static str,
    pub event: &'static str,
}

impl IllegalTransition {
    pub fn for_item(self, id: &str) -> AppError {
        AppError::InvalidTransition {
            id: id.to_string(),
            from: self.from,
            event: self.event,
        }
    }
}

impl TransferStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Uploading(_) => "uploading",
            Self::Success => "success",
            Self::Cancelled => "cancelled",
            Self::Error { .. } => "error",
        }
    }

    /// Success, Cancelled and Error end the item's lifecycle
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Cancelled | Self::Error { .. })
    }

    pub fn upload_progress(&self) -> Option<&UploadProgress> {
        match self {
            Self::Uploading(progress) => Some(progress),
            _ => None,
        }
    }

    /// Compute the status that follows `event`, or refuse it.
    pub fn apply(&self, event: TransferEvent) -> Result<TransferStatus, IllegalTransition> {
        let illegal = IllegalTransition {
            from: self.label(),
            event: event.name(),
        };

        match (self, event) {
            (Self::Waiting, TransferEvent::Start { total_bytes }) => {
                Ok(Self::Uploading(UploadProgress::starting(total_bytes)))
            }
            (Self::Uploading(current), TransferEvent::Progress(next)) => {
                if next.bytes_transferred < current.bytes_transferred {
                    Err(illegal)
                } else {
                    Ok(Self::Uploading(next))
                }
            }
            (Self::Uploading(_), TransferEvent::Complete) => Ok(Self::Success),
            (Self::Uploading(_), TransferEvent::Fail { message, code }) => {
                Ok(Self::Error { message, code })
            }
            (Self::Waiting | Self::Uploading(_), TransferEvent::Cancel) => Ok(Self::Cancelled),
            _ => Err(illegal),
        }
    }
}
