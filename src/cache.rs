//! # Cache Module
//!
//! File-backed cache shared by the transcript analytics and the usage API
//! client. Each key is one JSON file under the cache directory:
//!
//! ```json
//! {"data": <any JSON>, "expires_at": "2025-10-18T10:00:05Z", "source_mtime": 1760781600123456789}
//! ```
//!
//! An entry is served only while it is unexpired and, when it was written
//! with a source mtime, only while the tracked file still has that mtime.
//! Writes go through a temp file and an atomic rename, so separate
//! invocations sharing the directory never observe a half-written entry.

use chrono::{DateTime, TimeDelta, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::utils;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// On-disk representation of one cached value
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    data: Value,
    expires_at: DateTime<Utc>,
    /// Nanoseconds since the epoch; 0 means the entry is not tied to a file.
    #[serde(default)]
    source_mtime: i64,
}

/// Handle on a cache directory. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Cache rooted at the process-wide cache directory
    pub fn from_env() -> Self {
        Self::new(utils::cache_dir())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Read a cached value.
    ///
    /// Returns `None` when the entry is missing, unparseable or expired, when
    /// `source` is given but cannot be stat'ed, or when the entry recorded a
    /// source mtime that no longer matches `source`. A `None` (or empty)
    /// `source` skips the freshness check.
    pub fn get(&self, key: &str, source: Option<&Path>) -> Option<Value> {
        let raw = fs::read(self.entry_path(key)).ok()?;
        let entry: CacheEntry = serde_json::from_slice(&raw).ok()?;

        if Utc::now() >= entry.expires_at {
            tracing::debug!(key, "cache entry expired");
            return None;
        }

        if let Some(src) = source.filter(|p| !p.as_os_str().is_empty()) {
            let current = mtime_nanos(source_mtime(src)?);
            if entry.source_mtime != 0 && entry.source_mtime != current {
                tracing::debug!(key, source = %src.display(), "cache entry stale");
                return None;
            }
        }

        Some(entry.data)
    }

    /// Store `data` under `key` for `ttl`, optionally tied to a source file's
    /// mtime. Overwrites any previous entry.
    pub fn set(
        &self,
        key: &str,
        data: Value,
        ttl: Duration,
        source_mtime: Option<SystemTime>,
    ) -> Result<(), CacheError> {
        let now = Utc::now();
        let ttl = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::zero());
        let entry = CacheEntry {
            data,
            expires_at: now.checked_add_signed(ttl).unwrap_or(now),
            source_mtime: source_mtime.map(mtime_nanos).unwrap_or(0),
        };
        let encoded = serde_json::to_vec(&entry)?;
        utils::write_private_file(&self.entry_path(key), &encoded)?;
        Ok(())
    }

    /// Typed wrapper over [`CacheStore::get`]; a payload that does not decode
    /// as `T` counts as a miss.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str, source: Option<&Path>) -> Option<T> {
        serde_json::from_value(self.get(key, source)?).ok()
    }

    pub fn set_as<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
        source_mtime: Option<SystemTime>,
    ) -> Result<(), CacheError> {
        self.set(key, serde_json::to_value(value)?, ttl, source_mtime)
    }
}

/// Last-modified time of `path`, if it can be stat'ed
pub fn source_mtime(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn mtime_nanos(t: SystemTime) -> i64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
