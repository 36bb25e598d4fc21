use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{ReloadController, ReloadError, ReloadStatus};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub path: PathBuf,
    /// Quiet period after the first relevant event; zero reloads on every event.
    pub debounce: Duration,
    /// Upper bound from the first relevant event to the reload, however busy the file is.
    pub max_wait: Duration,
}

impl WatchConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), debounce: DEFAULT_DEBOUNCE, max_wait: DEFAULT_MAX_WAIT }
    }

    /// Apply `IMOCK_RELOAD_DEBOUNCE_MS` when set and numeric.
    pub fn from_env(path: impl Into<PathBuf>) -> Self {
        let mut cfg = Self::new(path);
        if let Some(ms) = std::env::var("IMOCK_RELOAD_DEBOUNCE_MS").ok().and_then(|s| s.trim().parse::<u64>().ok()) {
            cfg.debounce = Duration::from_millis(ms);
        }
        cfg
    }
}

/// Stops the watcher task when dropped or on [`WatchHandle::stop`].
pub struct WatchHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    _watcher: RecommendedWatcher,
}

impl WatchHandle {
    pub async fn stop(mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// True when `path` names the watched file (compared by base name).
pub fn is_tracked(path: &Path, file_name: &std::ffi::OsStr) -> bool { path.file_name() == Some(file_name) }

/// Writes, creations and renames into place count; metadata-only changes do not.
pub fn is_relevant(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_)
            | EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Name(_) | ModifyKind::Any | ModifyKind::Other)
    )
}

/// Watch the directory holding `config.path` and reload on changes to that file.
/// Must be called inside a tokio runtime.
pub fn spawn_watcher(config: WatchConfig, controller: Arc<ReloadController>) -> Result<WatchHandle, ReloadError> {
    let path = std::path::absolute(&config.path)?;
    let file_name: OsString = match path.file_name() {
        Some(n) => n.to_os_string(),
        None => {
            return Err(ReloadError::Read(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("not a file path: {}", path.display()),
            )))
        }
    };
    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let (tx, rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher = notify::recommended_watcher(move |res| {
        let _ = tx.send(res);
    })?;
    watcher.watch(&dir, RecursiveMode::NonRecursive)?;
    info!(path = %path.display(), debounce_ms = config.debounce.as_millis() as u64, "watch: started");

    let (stop_tx, stop_rx) = oneshot::channel();
    let window = Window { debounce: config.debounce, max_wait: config.max_wait };
    let task = tokio::spawn(watch_loop(rx, stop_rx, path, file_name, window, controller));
    Ok(WatchHandle { stop_tx: Some(stop_tx), task: Some(task), _watcher: watcher })
}

#[derive(Debug, Clone, Copy)]
struct Window {
    debounce: Duration,
    max_wait: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settled {
    Quiet,
    Closed,
    Stopped,
}

type EventRx = mpsc::UnboundedReceiver<notify::Result<Event>>;

fn report_backend_error(controller: &ReloadController, e: notify::Error) {
    warn!(error = %e, "watch: backend error");
    controller.notify(ReloadStatus::WatchError { reason: e.to_string() });
}

async fn watch_loop(
    mut rx: EventRx,
    mut stop_rx: oneshot::Receiver<()>,
    path: PathBuf,
    file_name: OsString,
    window: Window,
    controller: Arc<ReloadController>,
) {
    loop {
        let event = tokio::select! {
            _ = &mut stop_rx => break,
            ev = rx.recv() => match ev {
                Some(ev) => ev,
                None => break,
            },
        };
        match event {
            Err(e) => report_backend_error(&controller, e),
            Ok(ev) => {
                if !is_relevant(&ev.kind) || !ev.paths.iter().any(|p| is_tracked(p, &file_name)) {
                    continue;
                }
                debug!(kind = ?ev.kind, "watch: change detected");
                match settle(&mut rx, &mut stop_rx, window, &controller).await {
                    Settled::Stopped => break,
                    Settled::Closed => {
                        let _ = controller.reload_file(&path).await;
                        break;
                    }
                    Settled::Quiet => {
                        let _ = controller.reload_file(&path).await;
                    }
                }
            }
        }
    }
    debug!(path = %path.display(), "watch: stopped");
}

/// Absorb follow-up events until `debounce` passes without one or `max_wait` has
/// elapsed since the call. Backend errors are still reported.
async fn settle(rx: &mut EventRx, stop_rx: &mut oneshot::Receiver<()>, window: Window, controller: &ReloadController) -> Settled {
    if window.debounce.is_zero() {
        return Settled::Quiet;
    }
    let deadline = Instant::now() + window.max_wait.max(window.debounce);
    loop {
        let quiet_at = (Instant::now() + window.debounce).min(deadline);
        tokio::select! {
            _ = &mut *stop_rx => return Settled::Stopped,
            _ = tokio::time::sleep_until(quiet_at) => return Settled::Quiet,
            ev = rx.recv() => match ev {
                None => return Settled::Closed,
                Some(Err(e)) => report_backend_error(controller, e),
                Some(Ok(_)) => {}
            },
        }
    }
}
