use std::sync::Arc;
use std::time::Duration;

use imock_reload::{spawn_watcher, ReloadController, ReloadStatus, WatchConfig};
use imock_store::Store;
use serde_json::json;
use tokio::sync::mpsc;

fn seeded() -> Arc<Store> {
    Arc::new(Store::from_dataset(json!({"users": [{"id": "1"}]}).as_object().cloned().unwrap_or_default()))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn writing_the_file_reloads_the_store() {
    let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
    let path = dir.path().join("db.json");
    tokio::fs::write(&path, br#"{"users": [{"id": "1"}]}"#).await.unwrap_or_else(|e| panic!("{e}"));

    let store = seeded();
    let mut epochs = store.subscribe_epoch();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let ctl = Arc::new(ReloadController::new(store.clone()).with_observer(tx));
    let cfg = WatchConfig { debounce: Duration::from_millis(50), ..WatchConfig::new(&path) };
    let handle = spawn_watcher(cfg, ctl).unwrap_or_else(|e| panic!("{e}"));

    // unrelated siblings are ignored
    tokio::fs::write(dir.path().join("notes.txt"), b"hi").await.unwrap_or_else(|e| panic!("{e}"));
    tokio::fs::write(&path, br#"{"posts": [{"id": "a"}, {"id": "b"}]}"#).await.unwrap_or_else(|e| panic!("{e}"));

    tokio::time::timeout(Duration::from_secs(5), epochs.wait_for(|e| *e >= 2))
        .await
        .unwrap_or_else(|_| panic!("no reload within 5s"))
        .unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(store.resources(), vec!["posts".to_string()]);
    assert_eq!(store.snapshot("posts").len(), 2);

    // a reload may race a half-written file first; the observer must eventually see the good one
    let seen = tokio::time::timeout(Duration::from_secs(1), async {
        while let Some(status) = rx.recv().await {
            if let ReloadStatus::Reloaded { resources, records, .. } = status {
                return Some((resources, records));
            }
        }
        None
    })
    .await
    .ok()
    .flatten();
    assert_eq!(seen, Some((1, 2)));
    handle.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn broken_write_keeps_previous_data() {
    let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
    let path = dir.path().join("db.json");
    tokio::fs::write(&path, br#"{"users": [{"id": "1"}]}"#).await.unwrap_or_else(|e| panic!("{e}"));

    let store = seeded();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let ctl = Arc::new(ReloadController::new(store.clone()).with_observer(tx));
    let handle = spawn_watcher(WatchConfig { debounce: Duration::from_millis(50), ..WatchConfig::new(&path) }, ctl)
        .unwrap_or_else(|e| panic!("{e}"));

    tokio::fs::write(&path, b"{\"users\": [").await.unwrap_or_else(|e| panic!("{e}"));
    let status = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.ok().flatten();
    assert!(matches!(status, Some(ReloadStatus::Failed { .. })), "{status:?}");
    assert_eq!(store.epoch(), 1);
    assert_eq!(store.snapshot("users").len(), 1);
    handle.stop().await;
}
