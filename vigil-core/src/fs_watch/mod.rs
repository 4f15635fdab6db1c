//! Live filesystem notifications for the watched roots.
//!
//! A thin wrapper around `notify`: one recursive watcher per root feeds a
//! bounded channel, a flush loop coalesces bursts per path inside a debounce
//! window, and the survivors are forwarded to the event pipeline as
//! [`RawEvent`]s. On start every regular file already under a root is
//! emitted as a creation so pre-existing files get a baseline.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use notify::event::{EventKind, ModifyKind, RenameMode};
use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{Mutex, mpsc};
use tokio::task::{JoinHandle, spawn_blocking};
use tokio::time::{Duration, timeout};
use tracing::{debug, info, warn};

use crate::config::WatchConfig;
use crate::error::{FimError, Result};
use crate::scan::{enumerate_files, enumerate_roots};
use crate::types::{RawEvent, RawEventKind};

/// Configuration knobs for watch processing.
#[derive(Clone, Debug)]
pub struct FsWatchConfig {
    /// Quiet period before pending notifications are flushed.
    pub debounce_window: Duration,
    /// Flush early once this many distinct paths are pending.
    pub max_batch_events: usize,
}

impl Default for FsWatchConfig {
    fn default() -> Self {
        WatchConfig::default().into()
    }
}

impl From<WatchConfig> for FsWatchConfig {
    fn from(cfg: WatchConfig) -> Self {
        Self {
            debounce_window: Duration::from_millis(cfg.debounce_window_ms.max(1)),
            max_batch_events: cfg.max_batch_events.max(1),
        }
    }
}

/// Observer hook for surfacing watcher errors.
pub trait FsWatchObserver: Send + Sync {
    /// A root could not be subscribed or its watcher reported an error.
    fn on_error(&self, root: &Path, error: &str);
}

/// Default observer: every error becomes a `warn!` line.
pub struct LoggingFsWatchObserver;

impl FsWatchObserver for LoggingFsWatchObserver {
    fn on_error(&self, root: &Path, error: &str) {
        warn!(root = %root.display(), error = %error, "filesystem watch error");
    }
}

impl fmt::Debug for LoggingFsWatchObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LoggingFsWatchObserver")
    }
}

/// What [`FsWatchService::start`] managed to set up.
#[derive(Debug, Clone, Default)]
pub struct WatchReport {
    /// Roots with a live subscription.
    pub subscribed: Vec<PathBuf>,
    /// Roots the OS refused, with the reason.
    pub failed: Vec<(PathBuf, String)>,
    /// Files found by the startup enumeration.
    pub enumerated: usize,
}

/// One notify watcher per root, debounced into the raw event queue.
pub struct FsWatchService<O: FsWatchObserver = LoggingFsWatchObserver> {
    config: FsWatchConfig,
    observer: Arc<O>,
    active: Mutex<Option<ActiveWatch>>,
}

impl<O: FsWatchObserver + 'static> fmt::Debug for FsWatchService<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("FsWatchService");
        debug
            .field("config", &self.config)
            .field("observer_type", &std::any::type_name::<O>());

        match self.active.try_lock() {
            Ok(guard) => {
                let watchers = guard.as_ref().map(|active| active.watchers.len());
                debug.field("active_watchers", &watchers);
            }
            Err(_) => {
                debug.field("active_watchers", &"<locked>");
            }
        }

        debug.finish()
    }
}

impl FsWatchService<LoggingFsWatchObserver> {
    /// Service whose errors go to the log.
    pub fn with_logging(config: FsWatchConfig) -> Self {
        Self::new(config, Arc::new(LoggingFsWatchObserver))
    }
}

impl<O: FsWatchObserver + 'static> FsWatchService<O> {
    /// Service reporting errors to `observer`.
    pub fn new(config: FsWatchConfig, observer: Arc<O>) -> Self {
        Self {
            config,
            observer,
            active: Mutex::new(None),
        }
    }

    /// Subscribe to every root, then enumerate the files already present.
    ///
    /// A root that cannot be subscribed is reported to the observer and
    /// listed in [`WatchReport::failed`]; the others keep working.
    pub async fn start(
        &self,
        roots: Vec<PathBuf>,
        sink: mpsc::Sender<RawEvent>,
    ) -> Result<WatchReport> {
        let mut active = self.active.lock().await;
        if active.is_some() {
            return Err(FimError::Internal("filesystem watch already running".into()));
        }

        let roots = resolve_roots(roots);
        let capacity = self.config.max_batch_events.max(64) * 4;
        let (tx, rx) = mpsc::channel::<WatchMessage>(capacity);

        let flush_task = spawn_watch_loop(
            roots.clone(),
            Arc::clone(&self.observer),
            sink.clone(),
            rx,
            self.config.clone(),
        );

        let watcher_roots = roots.clone();
        let (watchers, failed) = spawn_blocking(move || init_watchers(watcher_roots, tx))
            .await
            .map_err(|e| {
                flush_task.abort();
                FimError::Internal(format!("watcher initialization panicked: {e}"))
            })?;

        for (root, message) in &failed {
            let err = FimError::WatchSubscription {
                path: root.clone(),
                message: message.clone(),
            };
            self.observer.on_error(root, &err.to_string());
        }
        let subscribed: Vec<PathBuf> = watchers.iter().map(|(root, _)| root.clone()).collect();

        // Subscribing first means anything written during the walk is seen
        // at least once; duplicates classify as unchanged.
        let walk_roots = roots.clone();
        let existing = spawn_blocking(move || enumerate_roots(&walk_roots))
            .await
            .map_err(|e| FimError::Internal(format!("startup enumeration panicked: {e}")))?;
        let enumerated = existing.len();
        for path in existing {
            if sink.send(RawEvent::created(path)).await.is_err() {
                warn!("event pipeline closed during startup enumeration");
                break;
            }
        }

        info!(
            subscribed = subscribed.len(),
            failed = failed.len(),
            enumerated,
            "filesystem watch started"
        );

        *active = Some(ActiveWatch {
            watchers: watchers.into_iter().map(|(_, watcher)| watcher).collect(),
            flush_task,
        });

        Ok(WatchReport {
            subscribed,
            failed,
            enumerated,
        })
    }

    /// Drop every subscription. Notifications still pending in the debounce
    /// window are discarded.
    pub async fn stop(&self) {
        if let Some(active) = self.active.lock().await.take() {
            active.shutdown();
            info!("filesystem watch stopped");
        }
    }

    /// True between `start` and `stop`.
    pub async fn is_running(&self) -> bool {
        self.active.lock().await.is_some()
    }
}

struct ActiveWatch {
    watchers: Vec<RecommendedWatcher>,
    flush_task: JoinHandle<()>,
}

impl ActiveWatch {
    fn shutdown(self) {
        self.flush_task.abort();
        // Dropping `watchers` stops notify streams.
    }
}

enum WatchMessage {
    Event(Event),
    Error { root: PathBuf, message: String },
}

impl fmt::Debug for WatchMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchMessage::Event(event) => f
                .debug_struct("WatchMessage::Event")
                .field("kind", &event.kind)
                .field("path_count", &event.paths.len())
                .finish(),
            WatchMessage::Error { root, message } => f
                .debug_struct("WatchMessage::Error")
                .field("root", root)
                .field("message", message)
                .finish(),
        }
    }
}

/// Translated notification.
#[derive(Debug, Clone, PartialEq, Eq)]
enum WatchAction {
    Emit(RawEventKind, PathBuf),
    /// The OS dropped or merged events; walk the whole root again.
    Rescan(PathBuf),
}

fn spawn_watch_loop<O: FsWatchObserver + 'static>(
    roots: Vec<PathBuf>,
    observer: Arc<O>,
    sink: mpsc::Sender<RawEvent>,
    mut rx: mpsc::Receiver<WatchMessage>,
    config: FsWatchConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut pending = Pending::default();

        loop {
            let msg = if pending.is_empty() {
                rx.recv().await
            } else {
                match timeout(config.debounce_window, rx.recv()).await {
                    Ok(msg) => msg,
                    Err(_) => {
                        if flush_pending(&mut pending, &sink).await.is_err() {
                            break;
                        }
                        continue;
                    }
                }
            };

            let Some(msg) = msg else {
                let _ = flush_pending(&mut pending, &sink).await;
                break;
            };

            let actions = match msg {
                WatchMessage::Event(event) => convert_event(&roots, &event),
                WatchMessage::Error { root, message } => {
                    observer.on_error(&root, &message);
                    vec![WatchAction::Rescan(root)]
                }
            };

            let mut closed = false;
            for action in actions {
                match action {
                    WatchAction::Emit(kind, path) => {
                        pending.record(kind, path);
                        if pending.len() >= config.max_batch_events
                            && flush_pending(&mut pending, &sink).await.is_err()
                        {
                            closed = true;
                            break;
                        }
                    }
                    WatchAction::Rescan(root) => {
                        if flush_pending(&mut pending, &sink).await.is_err()
                            || rescan_root(root, &sink).await.is_err()
                        {
                            closed = true;
                            break;
                        }
                    }
                }
            }
            if closed {
                debug!("event pipeline closed; watch loop exiting");
                break;
            }
        }
    })
}

/// Latest notification per path within the current debounce window.
#[derive(Debug, Default)]
struct Pending {
    order: Vec<PathBuf>,
    kinds: HashMap<PathBuf, RawEventKind>,
}

impl Pending {
    fn record(&mut self, kind: RawEventKind, path: PathBuf) {
        match self.kinds.get_mut(&path) {
            Some(existing) => *existing = coalesce(*existing, kind),
            None => {
                self.order.push(path.clone());
                self.kinds.insert(path, kind);
            }
        }
    }

    fn len(&self) -> usize {
        self.order.len()
    }

    fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn drain(&mut self) -> Vec<(RawEventKind, PathBuf)> {
        let mut kinds = std::mem::take(&mut self.kinds);
        std::mem::take(&mut self.order)
            .into_iter()
            .filter_map(|path| kinds.remove(&path).map(|kind| (kind, path)))
            .collect()
    }
}

fn coalesce(previous: RawEventKind, next: RawEventKind) -> RawEventKind {
    match (previous, next) {
        // Replaced in place (editor save, atomic rename over the file).
        (RawEventKind::Removed, RawEventKind::Created) => RawEventKind::Modified,
        (_, next) => next,
    }
}

struct SinkClosed;

async fn flush_pending(
    pending: &mut Pending,
    sink: &mpsc::Sender<RawEvent>,
) -> std::result::Result<(), SinkClosed> {
    for (kind, path) in pending.drain() {
        if kind == RawEventKind::Created && is_directory(&path).await {
            // A directory moved or copied in arrives as one notification.
            let files = spawn_blocking(move || enumerate_files(&path))
                .await
                .unwrap_or_default();
            for file in files {
                send(sink, RawEvent::created(file)).await?;
            }
            continue;
        }
        send(sink, RawEvent::new(kind, path)).await?;
    }
    Ok(())
}

async fn rescan_root(
    root: PathBuf,
    sink: &mpsc::Sender<RawEvent>,
) -> std::result::Result<(), SinkClosed> {
    info!(root = %root.display(), "rescanning root after dropped notifications");
    let files = spawn_blocking(move || enumerate_files(&root))
        .await
        .unwrap_or_default();
    for file in files {
        send(sink, RawEvent::reconcile(file)).await?;
    }
    Ok(())
}

async fn send(
    sink: &mpsc::Sender<RawEvent>,
    event: RawEvent,
) -> std::result::Result<(), SinkClosed> {
    sink.send(event).await.map_err(|_| SinkClosed)
}

async fn is_directory(path: &Path) -> bool {
    tokio::fs::symlink_metadata(path)
        .await
        .map(|meta| meta.is_dir())
        .unwrap_or(false)
}

fn convert_event(roots: &[PathBuf], event: &Event) -> Vec<WatchAction> {
    if matches!(event.kind, EventKind::Access(_)) {
        return Vec::new();
    }

    if matches!(event.kind, EventKind::Other) || event.need_rescan() {
        let root = event
            .paths
            .first()
            .and_then(|path| locate_root(path, roots))
            .cloned();
        return match root {
            Some(root) => vec![WatchAction::Rescan(root)],
            None => roots.iter().cloned().map(WatchAction::Rescan).collect(),
        };
    }

    let emit = |kind: RawEventKind, path: &PathBuf| {
        let root = locate_root(path, roots)?;
        sanitize_path(root, path).map(|clean| WatchAction::Emit(kind, clean))
    };

    match event.kind {
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut actions = Vec::with_capacity(2);
            if let Some(old) = event.paths.first() {
                actions.extend(emit(RawEventKind::Removed, old));
            }
            if let Some(new) = event.paths.get(1) {
                actions.extend(emit(RawEventKind::Created, new));
            }
            actions
        }
        _ => {
            let kind = classify_event(&event.kind);
            event
                .paths
                .iter()
                .filter_map(|path| emit(kind, path))
                .collect()
        }
    }
}

fn classify_event(kind: &EventKind) -> RawEventKind {
    match kind {
        EventKind::Create(_) => RawEventKind::Created,
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => RawEventKind::Removed,
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => RawEventKind::Created,
        EventKind::Remove(_) => RawEventKind::Removed,
        _ => RawEventKind::Modified,
    }
}

fn locate_root<'a>(path: &Path, roots: &'a [PathBuf]) -> Option<&'a PathBuf> {
    // Nested roots: the deepest match wins.
    roots
        .iter()
        .filter(|root| path.starts_with(root))
        .max_by_key(|root| root.components().count())
}

fn sanitize_path(root: &Path, path: &Path) -> Option<PathBuf> {
    let rel = path.strip_prefix(root).ok()?;
    let mut clean = PathBuf::new();
    for component in rel.components() {
        match component {
            Component::Normal(seg) => clean.push(seg),
            Component::CurDir => {}
            Component::ParentDir => {
                if !clean.pop() {
                    return None;
                }
            }
            _ => return None,
        }
    }

    let mut normalized = root.to_path_buf();
    normalized.push(clean);
    Some(normalized)
}

fn resolve_roots(roots: Vec<PathBuf>) -> Vec<PathBuf> {
    let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    roots
        .into_iter()
        .map(|path| if path.is_absolute() { path } else { cwd.join(path) })
        .collect()
}

type Subscriptions = (Vec<(PathBuf, RecommendedWatcher)>, Vec<(PathBuf, String)>);

fn init_watchers(roots: Vec<PathBuf>, tx: mpsc::Sender<WatchMessage>) -> Subscriptions {
    let mut watchers = Vec::with_capacity(roots.len());
    let mut failed = Vec::new();

    for root in roots {
        match subscribe(&root, tx.clone()) {
            Ok(watcher) => watchers.push((root, watcher)),
            Err(message) => failed.push((root, message)),
        }
    }

    (watchers, failed)
}

fn subscribe(
    root: &Path,
    tx: mpsc::Sender<WatchMessage>,
) -> std::result::Result<RecommendedWatcher, String> {
    let callback_root = root.to_path_buf();
    let mut watcher = RecommendedWatcher::new(
        move |res: std::result::Result<Event, notify::Error>| {
            let msg = match res {
                Ok(event) => WatchMessage::Event(event),
                Err(err) => WatchMessage::Error {
                    root: callback_root.clone(),
                    message: err.to_string(),
                },
            };
            if let Err(err) = tx.blocking_send(msg) {
                warn!(
                    "fs_watch channel send failed for {}: {}",
                    callback_root.display(),
                    err
                );
            }
        },
        NotifyConfig::default(),
    )
    .map_err(|err| format!("failed to create watcher: {err}"))?;

    watcher
        .watch(root, RecursiveMode::Recursive)
        .map_err(|err| format!("failed to watch: {err}"))?;

    Ok(watcher)
}
