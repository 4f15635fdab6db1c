//! Streaming content digests.
//!
//! Files are read sequentially in fixed-size chunks so memory use stays flat
//! regardless of file size. The handle is scoped to [`ContentHasher::hash`]
//! and closes on every exit path.

use std::io::ErrorKind;
use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::error::{FimError, Result};

/// Default read size per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// What [`ContentHasher::hash`] found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashOutcome {
    /// Lowercase hex SHA-256 of the file content.
    Digest(String),
    /// The path did not exist when the hash was attempted.
    NotFound,
}

/// Chunked SHA-256 over file content.
#[derive(Debug, Clone, Copy)]
pub struct ContentHasher {
    chunk_size: usize,
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl ContentHasher {
    /// Chunk size in bytes; zero is treated as one.
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    /// Digest of the current content of `path`.
    pub async fn hash(&self, path: &Path) -> Result<HashOutcome> {
        let mut file = match File::open(path).await {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Ok(HashOutcome::NotFound);
            }
            Err(source) => {
                return Err(FimError::FileUnreadable {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; self.chunk_size];
        loop {
            let read = match file.read(&mut buf).await {
                Ok(read) => read,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(source) => {
                    return Err(FimError::FileUnreadable {
                        path: path.to_path_buf(),
                        source,
                    });
                }
            };
            if read == 0 {
                break;
            }
            hasher.update(&buf[..read]);
        }

        Ok(HashOutcome::Digest(hex::encode(hasher.finalize())))
    }
}

/// Hash with the default chunk size.
pub async fn hash_file(path: &Path) -> Result<HashOutcome> {
    ContentHasher::default().hash(path).await
}
