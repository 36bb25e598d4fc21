//! imock reload: replace the store contents from a fresh copy of the dataset file.
//!
//! [`ReloadController`] owns the parse-then-ingest step. A failed parse leaves the store
//! untouched. [`spawn_watcher`] drives the controller from filesystem events.

#![forbid(unsafe_code)]

use std::fmt;
use std::path::Path;

use imock_store::{Ingested, SharedStore};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{info, warn};

mod watch;

pub use watch::{is_relevant, is_tracked, spawn_watcher, WatchConfig, WatchHandle, DEFAULT_DEBOUNCE, DEFAULT_MAX_WAIT};

#[derive(Debug, thiserror::Error)]
pub enum ReloadError {
    #[error("read dataset: {0}")]
    Read(#[from] std::io::Error),
    #[error("parse dataset: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("dataset root must be a JSON object, got {0}")]
    NotAnObject(&'static str),
    #[error("watch dataset: {0}")]
    Watch(#[from] notify::Error),
}

impl ReloadError {
    fn outcome(&self) -> &'static str {
        match self {
            Self::Read(_) => "read_error",
            Self::Parse(_) | Self::NotAnObject(_) => "parse_error",
            Self::Watch(_) => "watch_error",
        }
    }
}

/// Outcome reported to the observer after each reload attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadStatus {
    Reloaded { resources: usize, records: usize, epoch: u64 },
    Failed { reason: String },
    WatchError { reason: String },
}

impl fmt::Display for ReloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reloaded { resources, records, epoch } => {
                write!(f, "reloaded {} resources ({} records), epoch {}", resources, records, epoch)
            }
            Self::Failed { reason } => write!(f, "reload failed: {}", reason),
            Self::WatchError { reason } => write!(f, "watch error: {}", reason),
        }
    }
}

pub struct ReloadController {
    store: SharedStore,
    observer: Option<mpsc::UnboundedSender<ReloadStatus>>,
}

impl ReloadController {
    pub fn new(store: SharedStore) -> Self { Self { store, observer: None } }

    /// Report every reload outcome on `tx`. A dropped receiver is ignored.
    pub fn with_observer(mut self, tx: mpsc::UnboundedSender<ReloadStatus>) -> Self {
        self.observer = Some(tx);
        self
    }

    pub fn store(&self) -> &SharedStore { &self.store }

    /// Parse `bytes` as a dataset and swap it into the store. Returns the new epoch.
    pub fn reload(&self, bytes: &[u8]) -> Result<u64, ReloadError> {
        let result = parse_dataset(bytes).map(|raw| self.store.ingest(raw));
        self.finish(result)
    }

    /// Read `path` and reload from its contents.
    pub async fn reload_file(&self, path: &Path) -> Result<u64, ReloadError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => self.reload(&bytes),
            Err(e) => self.finish(Err(ReloadError::Read(e))),
        }
    }

    pub(crate) fn notify(&self, status: ReloadStatus) {
        if let Some(tx) = &self.observer {
            let _ = tx.send(status);
        }
    }

    fn finish(&self, result: Result<Ingested, ReloadError>) -> Result<u64, ReloadError> {
        match result {
            Ok(Ingested { epoch, resources, records }) => {
                metrics::counter!("reload_total", 1u64, "outcome" => "ok");
                info!(resources, records, epoch, "reload: dataset replaced");
                self.notify(ReloadStatus::Reloaded { resources, records, epoch });
                Ok(epoch)
            }
            Err(e) => {
                metrics::counter!("reload_total", 1u64, "outcome" => e.outcome());
                warn!(error = %e, "reload: keeping previous data");
                self.notify(ReloadStatus::Failed { reason: e.to_string() });
                Err(e)
            }
        }
    }
}

/// Decode a dataset file; the root must be an object.
pub fn parse_dataset(bytes: &[u8]) -> Result<serde_json::Map<String, Value>, ReloadError> {
    match serde_json::from_slice::<Value>(bytes)? {
        Value::Object(map) => Ok(map),
        other => Err(ReloadError::NotAnObject(imock_core::value_kind(&other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imock_store::Store;
    use serde_json::json;
    use std::sync::Arc;

    fn store(v: Value) -> SharedStore { Arc::new(Store::from_dataset(v.as_object().cloned().unwrap_or_default())) }

    #[test]
    fn reload_replaces_store_and_reports() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ctl = ReloadController::new(store(json!({"users": [{"id": "1"}]}))).with_observer(tx);
        let epoch = ctl.reload(br#"{"posts": [{"id": "a"}, {"id": "b"}], "me": {"id": "x"}}"#).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(epoch, 2);
        assert_eq!(ctl.store().resources(), vec!["me".to_string(), "posts".to_string()]);
        assert_eq!(rx.try_recv().ok(), Some(ReloadStatus::Reloaded { resources: 2, records: 3, epoch: 2 }));
    }

    #[test]
    fn bad_input_keeps_previous_data() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ctl = ReloadController::new(store(json!({"users": [{"id": "1"}]}))).with_observer(tx);
        assert!(matches!(ctl.reload(b"{not json"), Err(ReloadError::Parse(_))));
        assert!(matches!(ctl.reload(b"[1, 2]"), Err(ReloadError::NotAnObject("array"))));
        assert_eq!(ctl.store().epoch(), 1);
        assert_eq!(ctl.store().snapshot("users").len(), 1);
        assert!(matches!(rx.try_recv(), Ok(ReloadStatus::Failed { .. })));
        assert!(matches!(rx.try_recv(), Ok(ReloadStatus::Failed { .. })));
    }

    #[test]
    fn missing_or_dropped_observer_is_fine() {
        let ctl = ReloadController::new(store(json!({})));
        assert!(ctl.reload(b"{}").is_ok());

        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let ctl = ReloadController::new(store(json!({}))).with_observer(tx);
        assert_eq!(ctl.reload(br#"{"a": []}"#).ok(), Some(2));
    }

    // Writers racing a reload must not leak into the reported counts.
    #[test]
    fn reported_counts_match_the_reloaded_dataset() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ctl = ReloadController::new(store(json!({"a": []}))).with_observer(tx);
        let writer = {
            let store = ctl.store().clone();
            std::thread::spawn(move || {
                for _ in 0..5000 {
                    store.with_lock("a", |c| c.push(serde_json::Map::new()));
                }
            })
        };
        for _ in 0..500 {
            assert!(ctl.reload(br#"{"a": []}"#).is_ok());
        }
        writer.join().unwrap_or_else(|_| panic!("writer panicked"));

        let mut seen = 0;
        while let Ok(status) = rx.try_recv() {
            assert!(matches!(status, ReloadStatus::Reloaded { resources: 1, records: 0, .. }), "{status:?}");
            seen += 1;
        }
        assert_eq!(seen, 500);
    }

    #[tokio::test]
    async fn unreadable_file_is_a_failed_reload() {
        let ctl = ReloadController::new(store(json!({"users": []})));
        let err = ctl.reload_file(Path::new("/definitely/not/here.json")).await;
        assert!(matches!(err, Err(ReloadError::Read(_))));
        assert!(ctl.store().contains("users"));
    }

    #[test]
    fn status_display() {
        let s = ReloadStatus::Reloaded { resources: 2, records: 5, epoch: 3 };
        assert_eq!(s.to_string(), "reloaded 2 resources (5 records), epoch 3");
        assert_eq!(ReloadStatus::Failed { reason: "x".into() }.to_string(), "reload failed: x");
    }
}
