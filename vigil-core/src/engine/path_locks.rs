//! Per-path serialization of evaluations.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per path that currently has an evaluation running or
/// waiting. Entries are dropped as soon as nobody holds or awaits them.
#[derive(Default)]
pub struct PathLocks {
    inner: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl fmt::Debug for PathLocks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathLocks")
            .field("active_paths", &self.inner.len())
            .finish()
    }
}

impl PathLocks {
    /// No paths locked.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other evaluation of `path` is running.
    pub async fn lock(&self, path: &Path) -> PathGuard<'_> {
        let mutex = Arc::clone(self.inner.entry(path.to_path_buf()).or_default().value());
        let guard = mutex.lock_owned().await;
        PathGuard {
            locks: self,
            path: path.to_path_buf(),
            guard: Some(guard),
        }
    }

    /// Number of paths with a live lock entry.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// True when no path is locked or awaited.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Held for the duration of one evaluation; releases the path on drop.
pub struct PathGuard<'a> {
    locks: &'a PathLocks,
    path: PathBuf,
    guard: Option<OwnedMutexGuard<()>>,
}

impl fmt::Debug for PathGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathGuard").field("path", &self.path).finish()
    }
}

impl Drop for PathGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Waiters hold their own clone of the Arc, so a count of one means the
        // map is the last owner.
        self.locks
            .inner
            .remove_if(&self.path, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
