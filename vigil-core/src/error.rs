//! Error type shared by every core module.

use std::path::PathBuf;

use thiserror::Error;

/// Every failure the core can report.
#[derive(Error, Debug)]
pub enum FimError {
    /// Filesystem or socket failure outside of hashing.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Hashing or stat-ing an existing file failed. The path is skipped for
    /// this round and its baseline is left untouched.
    #[error("File unreadable: {}: {source}", path.display())]
    FileUnreadable {
        /// File that could not be read.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// The local database rejected a read or write.
    #[error("Storage failure: {0}")]
    Storage(String),

    /// The collector could not be reached or refused the payload.
    #[error("Alert delivery failed: {0}")]
    Delivery(String),

    /// The OS refused to watch a root.
    #[error("Watch subscription failed for {}: {message}", path.display())]
    #[allow(missing_docs)]
    WatchSubscription { path: PathBuf, message: String },

    /// No configured, stored or registered identity.
    #[error("No agent identity available; refusing to start monitoring")]
    MissingIdentity,

    /// Bug or broken invariant inside the agent.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FimError {
    /// Only a missing identity stops the agent. Everything else is scoped to
    /// the single path or event that produced it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FimError::MissingIdentity)
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, FimError>;
