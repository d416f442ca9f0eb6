// SPDX-License-Identifier: AGPL-3.0
// R2 Uploader Core - File previews
//
// Read-only previews of local files before they are staged. Images come back
// as data URLs, text files as their first lines.

use crate::item::ItemKind;
use crate::normalizer::{classify_kind, extension_of};
use crate::types::AppError;
use base64::Engine;

/// Files larger than this are never read for a preview
pub const MAX_PREVIEW_BYTES: u64 = 10 * 1024 * 1024;

/// Text previews stop after this many lines
pub const PREVIEW_LINES: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilePreview {
    /// `data:<mime>;base64,<payload>`
    Image(String),
    Text(String),
}

/// Build a preview for the file at `path`.
///
/// Only files the normalizer classifies as image or text can be previewed.
pub async fn preview_file(path: &str) -> Result<FilePreview, AppError> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| AppError::FileIo(format!("Cannot read metadata of {}: {}", path, e)))?;

    if metadata.len() > MAX_PREVIEW_BYTES {
        return Err(AppError::Preview(format!(
            "{} is larger than the 10 MB limit",
            path
        )));
    }

    match classify_kind(path) {
        ItemKind::Image => {
            let data = tokio::fs::read(path)
                .await
                .map_err(|e| AppError::FileIo(format!("Cannot read image {}: {}", path, e)))?;
            let mime = extension_of(path)
                .map(|ext| mime_guess::from_ext(&ext).first_or_octet_stream())
                .unwrap_or(mime_guess::mime::APPLICATION_OCTET_STREAM);
            let encoded = base64::engine::general_purpose::STANDARD.encode(data);
            Ok(FilePreview::Image(format!("data:{};base64,{}", mime, encoded)))
        }
        ItemKind::Text => {
            let content = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| AppError::FileIo(format!("Cannot read {}: {}", path, e)))?;
            let head: Vec<&str> = content.lines().take(PREVIEW_LINES).collect();
            Ok(FilePreview::Text(head.join("\n")))
        }
        ItemKind::File => {
            tracing::debug!("No preview for {}", path);
            Err(AppError::Preview(format!("Unsupported file type: {}", path)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path_in(dir: &tempfile::TempDir, name: &str) -> String {
        dir.path().join(name).to_string_lossy().to_string()
    }

    #[tokio::test]
    async fn test_text_preview_keeps_first_hundred_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = path_in(&dir, "log.csv");
        let rows: Vec<String> = (1..=150).map(|i| format!("row,{}", i)).collect();
        std::fs::write(&path, rows.join("\n")).unwrap();

        let FilePreview::Text(text) = preview_file(&path).await.unwrap() else {
            panic!("expected a text preview");
        };
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), PREVIEW_LINES);
        assert_eq!(lines[0], "row,1");
        assert_eq!(lines[99], "row,100");
    }

    #[tokio::test]
    async fn test_short_text_is_returned_whole() {
        let dir = tempfile::tempdir().unwrap();
        let path = path_in(&dir, "notes.md");
        std::fs::write(&path, "# Title\nbody").unwrap();

        assert_eq!(
            preview_file(&path).await.unwrap(),
            FilePreview::Text("# Title\nbody".into())
        );
    }

    #[tokio::test]
    async fn test_image_preview_is_data_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = path_in(&dir, "dot.PNG");
        std::fs::write(&path, [0x89, b'P', b'N', b'G']).unwrap();

        assert_eq!(
            preview_file(&path).await.unwrap(),
            FilePreview::Image("data:image/png;base64,iVBORw==".into())
        );
    }

    #[tokio::test]
    async fn test_files_over_limit_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = path_in(&dir, "huge.txt");
        let file = std::fs::File::create(&path).unwrap();
        file.set_len(MAX_PREVIEW_BYTES + 1).unwrap();

        let result = preview_file(&path).await;
        assert!(matches!(result, Err(AppError::Preview(_))));
    }

    #[tokio::test]
    async fn test_limit_is_inclusive() {
        let dir = tempfile::tempdir().unwrap();
        let path = path_in(&dir, "edge.txt");
        let file = std::fs::File::create(&path).unwrap();
        file.set_len(MAX_PREVIEW_BYTES).unwrap();

        assert!(preview_file(&path).await.is_ok());
    }

    #[tokio::test]
    async fn test_other_types_are_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = path_in(&dir, "archive.zip");
        std::fs::write(&path, b"PK").unwrap();

        assert!(matches!(preview_file(&path).await, Err(AppError::Preview(_))));
        assert!(matches!(
            preview_file(&path_in(&dir, "missing.txt")).await,
            Err(AppError::FileIo(_))
        ));
    }
}
