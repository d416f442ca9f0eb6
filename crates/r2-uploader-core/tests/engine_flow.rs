// SPDX-License-Identifier: AGPL-3.0
// End-to-end runs of the engine bridge against scripted executors

use r2_uploader_core::{
    AppError, BucketConfig, BucketKind, BucketProvider, EngineBridge, EngineEvent, FsPathResolver,
    Normalizer, StatusCategory, TransferExecutor, TransferHistory, TransferNotifier,
    TransferRequest, TransferStatus,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

fn bucket() -> BucketConfig {
    BucketConfig {
        id: 1,
        kind: BucketKind::R2,
        bucket_name: "media".into(),
        account_id: "acc".into(),
        access_key: "ak".into(),
        secret_key: "sk".into(),
        custom_domain: "https://cdn.example.com".into(),
        s3_api: None,
    }
}

struct NoBucket;

impl BucketProvider for NoBucket {
    fn active_bucket(&self) -> Option<BucketConfig> {
        None
    }
}

/// Reports two progress samples and then success for every request
struct InstantExecutor;

impl TransferExecutor for InstantExecutor {
    fn start(&self, request: TransferRequest, notifier: TransferNotifier) -> Result<(), AppError> {
        tokio::spawn(async move {
            notifier.progress(&request.item_id, 50, 100).await;
            notifier.progress(&request.item_id, 100, 100).await;
            notifier.success(&request.item_id).await;
        });
        Ok(())
    }

    fn cancel(&self, _item_id: &str) {}
}

/// Reports a little progress, then stalls until cancelled. The abort races a
/// last progress sample in before the acknowledgement.
struct StallingExecutor {
    notifier: std::sync::Mutex<Option<TransferNotifier>>,
}

impl TransferExecutor for StallingExecutor {
    fn start(&self, request: TransferRequest, notifier: TransferNotifier) -> Result<(), AppError> {
        *self.notifier.lock().unwrap() = Some(notifier.clone());
        tokio::spawn(async move {
            notifier.progress(&request.item_id, 10, 100).await;
        });
        Ok(())
    }

    fn cancel(&self, item_id: &str) {
        let notifier = self.notifier.lock().unwrap().clone().unwrap();
        let id = item_id.to_string();
        tokio::spawn(async move {
            notifier.progress(&id, 90, 100).await;
            notifier.cancelled(&id).await;
        });
    }
}

fn spawn_bridge(
    dir: &tempfile::TempDir,
    buckets: Arc<dyn BucketProvider>,
    executor: Arc<dyn TransferExecutor>,
) -> EngineBridge {
    let history = Arc::new(TransferHistory::open(dir.path().join("history.json")).unwrap());
    EngineBridge::spawn(
        history,
        buckets,
        executor,
        Normalizer::new(Arc::new(FsPathResolver)),
        None,
    )
}

async fn wait_for_settled(events: &mut broadcast::Receiver<EngineEvent>, count: usize) {
    let mut settled = 0;
    tokio::time::timeout(Duration::from_secs(5), async {
        while settled < count {
            if let Ok(EngineEvent::ItemSettled(_)) = events.recv().await {
                settled += 1;
            }
        }
    })
    .await
    .expect("items did not settle in time");
}

#[tokio::test]
async fn test_ingest_upload_and_record() {
    let dir = tempfile::tempdir().unwrap();
    let files = dir.path().join("upload");
    std::fs::create_dir_all(&files).unwrap();
    std::fs::write(files.join("photo.JPG"), b"jpeg").unwrap();
    std::fs::write(files.join("notes.md"), b"# notes").unwrap();

    let bridge = spawn_bridge(&dir, Arc::new(bucket()), Arc::new(InstantExecutor));
    let mut events = bridge.subscribe();

    let missing = dir.path().join("missing.bin").to_string_lossy().to_string();
    let report = bridge
        .ingest_paths(vec![files.to_string_lossy().to_string(), missing.clone()])
        .await
        .unwrap();
    assert_eq!(report.staged.len(), 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].source, missing);

    bridge.add_text("hello", "greeting.txt").await.unwrap();
    assert_eq!(bridge.items().await.unwrap().len(), 3);

    assert_eq!(bridge.start_transfers().await.unwrap(), 3);
    wait_for_settled(&mut events, 3).await;

    assert!(bridge.items().await.unwrap().is_empty());
    assert!(bridge.progress().await.unwrap().is_empty());

    let page = bridge.history_page(0, 10);
    assert_eq!(page.len(), 3);
    assert!(page.iter().all(|e| e.status == TransferStatus::Success));
    assert!(page
        .iter()
        .any(|e| e.remote_url == "https://cdn.example.com/upload/photo.JPG"));
    assert_eq!(bridge.history_by_category(StatusCategory::Completed).len(), 3);

    bridge.shutdown().await;

    let reopened = TransferHistory::open(dir.path().join("history.json")).unwrap();
    assert_eq!(reopened.count(), 3);
}

#[tokio::test]
async fn test_cancel_during_upload_ignores_late_progress() {
    let dir = tempfile::tempdir().unwrap();
    let executor = Arc::new(StallingExecutor {
        notifier: std::sync::Mutex::new(None),
    });
    let bridge = spawn_bridge(&dir, Arc::new(bucket()), executor);
    let mut events = bridge.subscribe();

    let item = bridge.add_text("draft", "draft.txt").await.unwrap();
    bridge.start_transfers().await.unwrap();

    // Wait until the first progress sample has been applied
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(EngineEvent::StatusChanged {
                status: TransferStatus::Uploading(p),
                ..
            }) = events.recv().await
            {
                if p.bytes_transferred == 10 {
                    break;
                }
            }
        }
    })
    .await
    .unwrap();

    let entry = bridge.cancel(item.id()).await.unwrap();
    assert_eq!(entry.status, TransferStatus::Cancelled);

    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(bridge.items().await.unwrap().is_empty());
    let history = bridge.history_page(0, 10);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, TransferStatus::Cancelled);

    bridge.shutdown().await;
}

#[tokio::test]
async fn test_no_bucket_blocks_uploads() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = spawn_bridge(&dir, Arc::new(NoBucket), Arc::new(InstantExecutor));

    bridge.add_text("hello", "hello.txt").await.unwrap();
    assert_eq!(
        bridge.start_transfers().await,
        Err(AppError::NoBucketConfigured)
    );

    let items = bridge.items().await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].status, TransferStatus::Waiting);

    bridge.shutdown().await;
}

#[tokio::test]
async fn test_clipboard_without_reader_reports_failure() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = spawn_bridge(&dir, Arc::new(bucket()), Arc::new(InstantExecutor));

    let report = bridge.ingest_clipboard().await.unwrap();
    assert!(report.staged.is_empty());
    assert_eq!(report.failures[0].source, "clipboard");

    bridge.shutdown().await;
}
