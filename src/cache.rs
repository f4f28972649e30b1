//! File-backed JSON cache.
//!
//! One file per key under a root directory chosen at open time, with values
//! persisted as pretty-printed JSON. The cache is best effort: misses and IO
//! failures degrade to `None` or `false` with a log line instead of erroring
//! out, so data providers can layer it under an in-memory copy.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Best-effort key/value store over JSON files.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    /// Opens the cache, creating the directory if needed. Returns `None`
    /// when the directory cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> Option<Self> {
        let root = root.into();
        if let Err(err) = fs::create_dir_all(&root) {
            tracing::warn!("cache directory {} unavailable: {err}", root.display());
            return None;
        }
        tracing::debug!("cache opened at {}", root.display());
        Some(Self { root })
    }

    /// Serializes `value` under `key`. Returns `false` when the write failed.
    pub fn put<T: Serialize>(&self, key: &str, value: &T) -> bool {
        let payload = match serde_json::to_vec_pretty(value) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!("cache entry {key} not serializable: {err}");
                return false;
            }
        };
        match fs::write(self.path_for(key), payload) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!("cache write for {key} failed: {err}");
                false
            }
        }
    }

    /// Reads the value stored under `key`. A missing entry is a silent
    /// `None`; an unreadable or unparsable one logs a warning first.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match fs::read(self.path_for(key)) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return None,
            Err(err) => {
                tracing::warn!("cache read for {key} failed: {err}");
                return None;
            }
        };
        match serde_json::from_slice(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!("cache entry {key} is corrupt: {err}");
                None
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.path_for(key).exists()
    }

    /// Removes the entry under `key`. Returns whether one was removed.
    pub fn delete(&self, key: &str) -> bool {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => true,
            Err(err) if err.kind() == ErrorKind::NotFound => false,
            Err(err) => {
                tracing::warn!("cache delete for {key} failed: {err}");
                false
            }
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Keys map to file names; anything outside `[A-Za-z0-9._-]` flattens
    /// to an underscore.
    fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.root.join(format!("{safe}.json"))
    }
}
