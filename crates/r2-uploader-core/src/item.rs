// SPDX-License-Identifier: AGPL-3.0
// R2 Uploader Core - Staged item model

use serde::{Deserialize, Serialize};

/// What a staged item contains, used for previews and icons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    File,
    Text,
    Image,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Text => "text",
            Self::Image => "image",
        }
    }
}

/// Where the bytes of a staged item come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemSource {
    /// A file on the local filesystem, read by the executor at transfer time
    FilePath(String),
    /// Content held in memory (clipboard text, data URLs, typed text)
    InlineContent(String),
}

impl ItemSource {
    /// Size known before the transfer starts; file sizes are reported by the executor
    pub fn known_len(&self) -> Option<u64> {
        match self {
            Self::FilePath(_) => None,
            Self::InlineContent(content) => Some(content.len() as u64),
        }
    }
}

impl std::fmt::Display for ItemSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FilePath(path) => f.write_str(path),
            Self::InlineContent(content) => write!(f, "<{} bytes inline>", content.len()),
        }
    }
}

/// A unit of content queued for transfer
///
/// `kind` and `source` are fixed at creation; only the remote naming can change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedItem {
    id: String,
    kind: ItemKind,
    source: ItemSource,
    pub remote_name: String,
    #[serde(default)]
    pub remote_name_prefix: String,
}

impl StagedItem {
    pub fn new(
        id: impl Into<String>,
        kind: ItemKind,
        source: ItemSource,
        remote_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            source,
            remote_name: remote_name.into(),
            remote_name_prefix: String::new(),
        }
    }

    /// Inline item with a fresh id
    pub fn inline(kind: ItemKind, content: impl Into<String>, remote_name: impl Into<String>) -> Self {
        Self::new(
            uuid::Uuid::new_v4().to_string(),
            kind,
            ItemSource::InlineContent(content.into()),
            remote_name,
        )
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    pub fn source(&self) -> &ItemSource {
        &self.source
    }

    /// Destination key in the bucket: prefix and remote name joined by `/`
    pub fn object_key(&self) -> String {
        let prefix = self.remote_name_prefix.trim_matches('/');
        let name = self.remote_name.trim_start_matches('/');
        if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", prefix, name)
        }
    }
}
