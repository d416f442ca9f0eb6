// SPDX-License-Identifier: AGPL-3.0
// R2 Uploader Core - Item normalization
//
// Turns dropped paths, clipboard payloads and typed text into staged items.
// Each source in a batch is resolved independently; one bad path never
// stops its siblings.

use crate::item::{ItemKind, ItemSource, StagedItem};
use crate::types::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use futures::future::BoxFuture;
use std::path::{Path, MAIN_SEPARATOR};
use std::sync::Arc;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "gif", "bmp", "tiff"];
const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "markdown", "json", "csv"];

/// One concrete file found under a user-selected path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    pub id: String,
    pub absolute_path: String,
    /// Path relative to the parent of the selected path, platform separators
    pub relative_path: String,
    pub is_directory: bool,
}

/// Expands a selected path into the files it stands for
#[async_trait]
pub trait PathResolver: Send + Sync {
    async fn resolve(&self, path: &str) -> Result<Vec<ResolvedPath>, AppError>;
}

/// Resolver backed by the local filesystem; directories expand recursively
#[derive(Debug, Default, Clone, Copy)]
pub struct FsPathResolver;

impl FsPathResolver {
    fn walk(path: String, base: &str) -> BoxFuture<'_, Result<Vec<ResolvedPath>, AppError>> {
        Box::pin(async move {
            let metadata = tokio::fs::metadata(&path).await.map_err(|e| {
                AppError::FileIo(format!("Cannot read metadata of {}: {}", path, e))
            })?;

            let mut out = Vec::new();
            if metadata.is_dir() {
                let mut entries = tokio::fs::read_dir(&path).await.map_err(|e| {
                    AppError::FileIo(format!("Cannot read directory {}: {}", path, e))
                })?;

                while let Some(entry) = entries.next_entry().await? {
                    let child = entry.path().to_string_lossy().to_string();
                    out.extend(Self::walk(child, base).await?);
                }
            } else {
                let relative_path = path
                    .strip_prefix(base)
                    .map(str::to_string)
                    .unwrap_or_else(|| path.clone());

                out.push(ResolvedPath {
                    id: uuid::Uuid::new_v4().to_string(),
                    absolute_path: path,
                    relative_path,
                    is_directory: false,
                });
            }

            Ok(out)
        })
    }
}

#[async_trait]
impl PathResolver for FsPathResolver {
    async fn resolve(&self, path: &str) -> Result<Vec<ResolvedPath>, AppError> {
        let base = Path::new(path)
            .parent()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_default();

        Self::walk(path.to_string(), &base).await
    }
}

/// Access to the system clipboard
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClipboardReader: Send + Sync {
    async fn has_text(&self) -> Result<bool, AppError>;
    async fn read_text(&self) -> Result<String, AppError>;
    async fn has_image(&self) -> Result<bool, AppError>;
    /// Image payload as base64
    async fn read_image_base64(&self) -> Result<String, AppError>;
    async fn has_files(&self) -> Result<bool, AppError>;
    async fn read_files(&self) -> Result<Vec<String>, AppError>;
}

/// Image formats recognised in clipboard payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Webp,
}

impl ImageFormat {
    /// Checked in order; the first match wins
    const SIGNATURES: [(&'static str, ImageFormat); 4] = [
        ("iVBORw0KGgo", ImageFormat::Png),
        ("/9j/", ImageFormat::Jpeg),
        ("R0lGODlh", ImageFormat::Gif),
        ("UklGR", ImageFormat::Webp),
    ];

    /// Detect the format from the base64 encoding of the leading bytes
    pub fn detect(base64: &str) -> Option<Self> {
        Self::SIGNATURES
            .iter()
            .find(|(signature, _)| base64.starts_with(signature))
            .map(|(_, format)| *format)
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Gif => "gif",
            Self::Webp => "webp",
        }
    }
}

/// Lowercased text after the last `.` of the file name.
///
/// A dotfile such as `.png` counts as having extension `png`.
pub(crate) fn extension_of(path: &str) -> Option<String> {
    let name = Path::new(path).file_name()?.to_string_lossy().into_owned();
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() {
        None
    } else {
        Some(ext.to_lowercase())
    }
}

/// Classify a file by extension, ignoring case
pub fn classify_kind(path: &str) -> ItemKind {
    let Some(ext) = extension_of(path) else {
        return ItemKind::File;
    };

    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        ItemKind::Image
    } else if TEXT_EXTENSIONS.contains(&ext.as_str()) {
        ItemKind::Text
    } else {
        ItemKind::File
    }
}

/// Remote name for a relative path: one leading separator dropped, `/` everywhere
pub fn remote_name_from_relative(relative_path: &str, separator: char) -> String {
    let trimmed = relative_path
        .strip_prefix(separator)
        .unwrap_or(relative_path);
    if separator == '/' {
        trimmed.to_string()
    } else {
        trimmed.replace(separator, "/")
    }
}

/// `YYYY-MM-DD_HH-MM-SS` stem used for clipboard file names
pub fn timestamp_stem(now: DateTime<Local>) -> String {
    now.format("%Y-%m-%d_%H-%M-%S").to_string()
}

/// Text typed or pasted by the user, uploaded under `remote_name`
pub fn text_item(content: impl Into<String>, remote_name: impl Into<String>) -> StagedItem {
    StagedItem::inline(ItemKind::Text, content, remote_name)
}

/// Clipboard text, named after the current time
pub fn clipboard_text_item(text: impl Into<String>, now: DateTime<Local>) -> StagedItem {
    text_item(text, format!("{}.txt", timestamp_stem(now)))
}

/// Clipboard image; unrecognised payloads are kept as-is and named `.png`
pub fn clipboard_image_item(base64: &str, now: DateTime<Local>) -> StagedItem {
    let stem = timestamp_stem(now);
    let (content, extension) = match ImageFormat::detect(base64) {
        Some(format) => (
            format!("data:{};base64,{}", format.mime_type(), base64),
            format.extension(),
        ),
        None => (base64.to_string(), ImageFormat::Png.extension()),
    };
    StagedItem::inline(ItemKind::Image, content, format!("{}.{}", stem, extension))
}

/// Staged item for one resolved file
pub fn file_item(resolved: ResolvedPath, separator: char) -> StagedItem {
    let remote_name = remote_name_from_relative(&resolved.relative_path, separator);
    StagedItem::new(
        resolved.id,
        classify_kind(&resolved.absolute_path),
        ItemSource::FilePath(resolved.absolute_path),
        remote_name,
    )
}

/// A source that could not be turned into items
#[derive(Debug, Clone, PartialEq)]
pub struct IngestFailure {
    /// The path, or "clipboard"
    pub source: String,
    pub error: AppError,
}

/// Outcome of one ingestion batch; partial success is normal
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    pub staged: Vec<StagedItem>,
    pub failures: Vec<IngestFailure>,
}

impl IngestReport {
    pub fn merge(&mut self, other: IngestReport) {
        self.staged.extend(other.staged);
        self.failures.extend(other.failures);
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Turns raw sources into staged items
#[derive(Clone)]
pub struct Normalizer {
    resolver: Arc<dyn PathResolver>,
    separator: char,
}

impl Normalizer {
    pub fn new(resolver: Arc<dyn PathResolver>) -> Self {
        Self {
            resolver,
            separator: MAIN_SEPARATOR,
        }
    }

    /// Use a separator other than the platform's when building remote names
    pub fn with_separator(mut self, separator: char) -> Self {
        self.separator = separator;
        self
    }

    /// Resolve every path concurrently and collect items and failures
    pub async fn normalize_paths(&self, paths: &[String]) -> IngestReport {
        let resolutions = paths.iter().map(|path| async move {
            (path.clone(), self.resolver.resolve(path).await)
        });

        let mut report = IngestReport::default();
        for (path, result) in futures::future::join_all(resolutions).await {
            match result {
                Ok(resolved) => report.staged.extend(
                    resolved
                        .into_iter()
                        .filter(|r| !r.is_directory)
                        .map(|r| file_item(r, self.separator)),
                ),
                Err(error) => {
                    tracing::warn!("Failed to resolve {}: {}", path, error);
                    report.failures.push(IngestFailure {
                        source: path,
                        error,
                    });
                }
            }
        }
        report
    }

    /// Pick up whatever the clipboard holds: text, then an image, then files.
    ///
    /// Clipboard errors are folded into a single diagnostic.
    pub async fn normalize_clipboard(&self, clipboard: &dyn ClipboardReader) -> IngestReport {
        let now = Local::now();
        let mut report = IngestReport::default();
        let mut errors = Vec::new();

        match read_if(clipboard.has_text(), || clipboard.read_text()).await {
            Ok(Some(text)) => report.staged.push(clipboard_text_item(text, now)),
            Ok(None) => {}
            Err(e) => errors.push(e.to_string()),
        }

        match read_if(clipboard.has_image(), || clipboard.read_image_base64()).await {
            Ok(Some(image)) => report.staged.push(clipboard_image_item(&image, now)),
            Ok(None) => {}
            Err(e) => errors.push(e.to_string()),
        }

        match read_if(clipboard.has_files(), || clipboard.read_files()).await {
            Ok(Some(paths)) => report.merge(self.normalize_paths(&paths).await),
            Ok(None) => {}
            Err(e) => errors.push(e.to_string()),
        }

        if !errors.is_empty() {
            tracing::warn!("Clipboard read failed: {}", errors.join("; "));
            report.failures.push(IngestFailure {
                source: "clipboard".to_string(),
                error: AppError::Clipboard(errors.join("; ")),
            });
        }
        report
    }
}

async fn read_if<T, C, R, F>(check: C, read: F) -> Result<Option<T>, AppError>
where
    C: std::future::Future<Output = Result<bool, AppError>>,
    R: std::future::Future<Output = Result<T, AppError>>,
    F: FnOnce() -> R,
{
    if check.await? {
        Ok(Some(read().await?))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashMap;

    fn at_noon() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, 12, 5, 7).unwrap()
    }

    /// Resolver answering from a fixed table
    struct TableResolver(HashMap<String, Result<Vec<ResolvedPath>, AppError>>);

    #[async_trait]
    impl PathResolver for TableResolver {
        async fn resolve(&self, path: &str) -> Result<Vec<ResolvedPath>, AppError> {
            self.0
                .get(path)
                .cloned()
                .unwrap_or_else(|| Err(AppError::FileIo(format!("no such path {}", path))))
        }
    }

    fn resolved(id: &str, absolute: &str, relative: &str) -> ResolvedPath {
        ResolvedPath {
            id: id.to_string(),
            absolute_path: absolute.to_string(),
            relative_path: relative.to_string(),
            is_directory: false,
        }
    }

    #[test]
    fn test_classify_kind() {
        assert_eq!(classify_kind("photo.JPG"), ItemKind::Image);
        assert_eq!(classify_kind("/a/b/notes.md"), ItemKind::Text);
        assert_eq!(classify_kind("archive.zip"), ItemKind::File);
        assert_eq!(classify_kind("Makefile"), ItemKind::File);
        assert_eq!(classify_kind("scan.TiFf"), ItemKind::Image);
        assert_eq!(classify_kind("backup.tar.gz"), ItemKind::File);
        assert_eq!(classify_kind("trailing."), ItemKind::File);
    }

    #[test]
    fn test_dotfile_name_is_its_extension() {
        assert_eq!(classify_kind(".png"), ItemKind::Image);
        assert_eq!(classify_kind("/home/me/.notes.MD"), ItemKind::Text);
        assert_eq!(classify_kind("/home/me/.bashrc"), ItemKind::File);
    }

    #[test]
    fn test_remote_name_from_relative() {
        assert_eq!(remote_name_from_relative("\\docs\\readme.txt", '\\'), "docs/readme.txt");
        assert_eq!(remote_name_from_relative("/docs/readme.txt", '/'), "docs/readme.txt");
        assert_eq!(remote_name_from_relative("//twice", '/'), "/twice");
        assert_eq!(remote_name_from_relative("plain.txt", '/'), "plain.txt");
    }

    #[test]
    fn test_clipboard_image_signatures() {
        let png = clipboard_image_item("iVBORw0KGgoAAAANSUhEUg", at_noon());
        assert_eq!(png.remote_name, "2024-03-09_12-05-07.png");
        assert_eq!(png.kind(), ItemKind::Image);
        assert!(matches!(
            png.source(),
            ItemSource::InlineContent(c) if c.starts_with("data:image/png;base64,iVBOR")
        ));

        let jpeg = clipboard_image_item("/9j/4AAQSkZJRg", at_noon());
        assert!(jpeg.remote_name.ends_with(".jpg"));

        let gif = clipboard_image_item("R0lGODlhAQABAA", at_noon());
        assert!(gif.remote_name.ends_with(".gif"));

        let webp = clipboard_image_item("UklGRiQAAABXRUJQ", at_noon());
        assert!(webp.remote_name.ends_with(".webp"));

        let unknown = clipboard_image_item("Qk02AAAAAAAAADYAAAA", at_noon());
        assert!(unknown.remote_name.ends_with(".png"));
        assert_eq!(
            unknown.source(),
            &ItemSource::InlineContent("Qk02AAAAAAAAADYAAAA".to_string())
        );
    }

    #[test]
    fn test_clipboard_text_item() {
        let item = clipboard_text_item("hello", at_noon());
        assert_eq!(item.kind(), ItemKind::Text);
        assert_eq!(item.remote_name, "2024-03-09_12-05-07.txt");
        assert_eq!(item.source(), &ItemSource::InlineContent("hello".into()));
    }

    #[test]
    fn test_text_item_keeps_caller_name() {
        let item = text_item("# Title", "drafts/post.md");
        assert_eq!(item.kind(), ItemKind::Text);
        assert_eq!(item.remote_name, "drafts/post.md");
        assert!(item.remote_name_prefix.is_empty());
    }

    #[tokio::test]
    async fn test_failed_path_does_not_block_siblings() {
        let mut table = HashMap::new();
        table.insert(
            "C:\\photos".to_string(),
            Ok(vec![
                resolved("1", "C:\\photos\\a.png", "\\photos\\a.png"),
                resolved("2", "C:\\photos\\b.csv", "\\photos\\b.csv"),
            ]),
        );
        table.insert(
            "C:\\locked".to_string(),
            Err(AppError::FileIo("permission denied".into())),
        );
        table.insert(
            "C:\\c.bin".to_string(),
            Ok(vec![resolved("3", "C:\\c.bin", "\\c.bin")]),
        );

        let normalizer = Normalizer::new(Arc::new(TableResolver(table))).with_separator('\\');
        let paths = ["C:\\photos", "C:\\locked", "C:\\c.bin"].map(String::from);
        let report = normalizer.normalize_paths(&paths).await;

        let names: Vec<_> = report.staged.iter().map(|i| i.remote_name.as_str()).collect();
        assert_eq!(names, ["photos/a.png", "photos/b.csv", "c.bin"]);
        assert_eq!(report.staged[0].kind(), ItemKind::Image);
        assert_eq!(report.staged[1].kind(), ItemKind::Text);
        assert_eq!(report.staged[2].id(), "3");

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].source, "C:\\locked");
    }

    #[tokio::test]
    async fn test_fs_resolver_expands_directories() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("album");
        std::fs::create_dir_all(root.join("nested")).unwrap();
        std::fs::write(root.join("cover.png"), b"png").unwrap();
        std::fs::write(root.join("nested").join("notes.md"), b"# hi").unwrap();

        let normalizer = Normalizer::new(Arc::new(FsPathResolver));
        let report = normalizer
            .normalize_paths(&[root.to_string_lossy().to_string()])
            .await;

        assert!(report.is_clean());
        let mut names: Vec<_> = report.staged.iter().map(|i| i.remote_name.clone()).collect();
        names.sort();
        assert_eq!(names, ["album/cover.png", "album/nested/notes.md"]);
    }

    #[tokio::test]
    async fn test_fs_resolver_missing_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone.txt").to_string_lossy().to_string();
        let result = FsPathResolver.resolve(&missing).await;
        assert!(matches!(result, Err(AppError::FileIo(_))));
    }

    #[tokio::test]
    async fn test_clipboard_text_and_image() {
        let mut clipboard = MockClipboardReader::new();
        clipboard.expect_has_text().returning(|| Ok(true));
        clipboard
            .expect_read_text()
            .returning(|| Ok("copied".to_string()));
        clipboard.expect_has_image().returning(|| Ok(true));
        clipboard
            .expect_read_image_base64()
            .returning(|| Ok("/9j/4AAQ".to_string()));
        clipboard.expect_has_files().returning(|| Ok(false));

        let normalizer = Normalizer::new(Arc::new(FsPathResolver));
        let report = normalizer.normalize_clipboard(&clipboard).await;

        assert!(report.is_clean());
        assert_eq!(report.staged.len(), 2);
        assert_eq!(report.staged[0].kind(), ItemKind::Text);
        assert!(report.staged[0].remote_name.ends_with(".txt"));
        assert!(report.staged[1].remote_name.ends_with(".jpg"));
    }

    #[tokio::test]
    async fn test_clipboard_errors_become_one_diagnostic() {
        let mut clipboard = MockClipboardReader::new();
        clipboard
            .expect_has_text()
            .returning(|| Err(AppError::Clipboard("busy".into())));
        clipboard.expect_has_image().returning(|| Ok(false));
        clipboard.expect_has_files().returning(|| Ok(true));
        clipboard
            .expect_read_files()
            .returning(|| Err(AppError::Clipboard("denied".into())));

        let normalizer = Normalizer::new(Arc::new(FsPathResolver));
        let report = normalizer.normalize_clipboard(&clipboard).await;

        assert!(report.staged.is_empty());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].source, "clipboard");
        assert!(matches!(&report.failures[0].error, AppError::Clipboard(m) if m.contains("busy") && m.contains("denied")));
    }
}
