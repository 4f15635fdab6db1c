use std::ffi::OsString;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Last trusted state of one tracked file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineRecord {
    /// Absolute path; the unique key of the baseline table.
    pub path: PathBuf,
    /// `None` when the file was never hashed successfully.
    pub digest: Option<String>,
    /// Byte length at the last observation.
    pub size: u64,
    /// Filesystem modification time at the last observation, when the
    /// platform reports one.
    pub modified_at: Option<DateTime<Utc>>,
}

impl BaselineRecord {
    /// Storage key for this record's path.
    pub fn key(&self) -> Vec<u8> {
        path_key(&self.path)
    }
}

/// Storage key for a path: the raw OS bytes, so two paths share a key only
/// when they are the same path.
#[cfg(unix)]
pub fn path_key(path: &Path) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;

    path.as_os_str().as_bytes().to_vec()
}

/// Inverse of [`path_key`].
#[cfg(unix)]
pub fn path_from_key(key: Vec<u8>) -> PathBuf {
    use std::os::unix::ffi::OsStringExt;

    PathBuf::from(OsString::from_vec(key))
}

/// Storage key for a path: UTF-16 code units, little endian.
#[cfg(windows)]
pub fn path_key(path: &Path) -> Vec<u8> {
    use std::os::windows::ffi::OsStrExt;

    path.as_os_str()
        .encode_wide()
        .flat_map(u16::to_le_bytes)
        .collect()
}

/// Inverse of [`path_key`].
#[cfg(windows)]
pub fn path_from_key(key: Vec<u8>) -> PathBuf {
    use std::os::windows::ffi::OsStringExt;

    let wide: Vec<u16> = key
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    PathBuf::from(OsString::from_wide(&wide))
}

/// Storage key for a path. Only UTF-8 paths exist on these targets.
#[cfg(not(any(unix, windows)))]
pub fn path_key(path: &Path) -> Vec<u8> {
    path.to_string_lossy().into_owned().into_bytes()
}

/// Inverse of [`path_key`].
#[cfg(not(any(unix, windows)))]
pub fn path_from_key(key: Vec<u8>) -> PathBuf {
    PathBuf::from(OsString::from(String::from_utf8_lossy(&key).into_owned()))
}
