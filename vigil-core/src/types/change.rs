use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

/// Semantic change recorded in the event log and reported to the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// A regular file appeared.
    Added,
    /// A tracked file's content changed.
    Modified,
    /// A tracked file went away.
    Removed,
}

impl ChangeKind {
    /// Lowercase wire and storage label.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Added => "added",
            ChangeKind::Modified => "modified",
            ChangeKind::Removed => "removed",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "added" => Ok(ChangeKind::Added),
            "modified" => Ok(ChangeKind::Modified),
            "removed" => Ok(ChangeKind::Removed),
            other => Err(format!("unknown change kind '{other}'")),
        }
    }
}

/// Unclassified occurrence produced by the watcher or the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum RawEventKind {
    Created,
    Modified,
    Removed,
    /// Emitted by periodic sweeps; classified exactly like `Modified`.
    Reconcile,
}

impl RawEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RawEventKind::Created => "created",
            RawEventKind::Modified => "modified",
            RawEventKind::Removed => "removed",
            RawEventKind::Reconcile => "reconcile",
        }
    }
}

impl fmt::Display for RawEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something happened at `path`; the engine decides what.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    /// What the source saw.
    pub kind: RawEventKind,
    /// Absolute path the event refers to.
    pub path: PathBuf,
    /// When the source saw it.
    pub observed_at: DateTime<Utc>,
}

impl RawEvent {
    /// Event observed now.
    pub fn new(kind: RawEventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
            observed_at: Utc::now(),
        }
    }

    /// Shorthand for [`RawEventKind::Created`].
    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self::new(RawEventKind::Created, path)
    }

    /// Shorthand for [`RawEventKind::Modified`].
    pub fn modified(path: impl Into<PathBuf>) -> Self {
        Self::new(RawEventKind::Modified, path)
    }

    /// Shorthand for [`RawEventKind::Removed`].
    pub fn removed(path: impl Into<PathBuf>) -> Self {
        Self::new(RawEventKind::Removed, path)
    }

    /// Shorthand for [`RawEventKind::Reconcile`].
    pub fn reconcile(path: impl Into<PathBuf>) -> Self {
        Self::new(RawEventKind::Reconcile, path)
    }
}

/// A classified change about to be appended to the event log.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
    pub occurred_at: DateTime<Utc>,
}

impl ChangeEvent {
    /// Event stamped with the current time.
    pub fn now(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
            occurred_at: Utc::now(),
        }
    }
}

/// A change as read back from the event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEventRecord {
    /// Monotonic row id; later changes have larger ids.
    pub id: i64,
    /// Rendered lossily when serialized, so non-UTF-8 names still print.
    #[serde(serialize_with = "serialize_path_lossy")]
    pub path: PathBuf,
    /// What changed.
    pub kind: ChangeKind,
    /// When the change was classified.
    pub occurred_at: DateTime<Utc>,
}

fn serialize_path_lossy<S: Serializer>(path: &Path, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&path.to_string_lossy())
}
