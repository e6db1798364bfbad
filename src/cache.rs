//! Persistent search cache with TTL eviction.
//!
//! The cache maps a key to a single [`SearchResult`] (streaming search,
//! key `query:link`) or to a list of them (bulk search, key `query_limit`).
//! It is a best-effort optimization: nothing here ever returns an error to
//! the pipeline.
//!
//! # On-disk format
//!
//! ```json
//! {
//!   "Movie X:https://pan.example.cn/s/abc123": {
//!     "timestampCreated": "2026-10-19T07:00:00Z",
//!     "payload": { "title": "Movie X", ... }
//!   }
//! }
//! ```
//!
//! # Lifecycle
//!
//! - [`SearchCache::load`] reads the snapshot, falls back to an empty cache on
//!   any error, drops expired entries, and writes the result back.
//! - [`SearchCache::set`] flushes the whole map synchronously.
//! - [`SearchCache::get`] never evicts; expired entries simply read as absent.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, error, warn};

use crate::error::CacheError;
use crate::models::SearchResult;

/// What a cache entry holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CachePayload {
    List(Vec<SearchResult>),
    Single(SearchResult),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    #[serde(skip)]
    pub key: String,
    pub timestamp_created: DateTime<Utc>,
    pub payload: CachePayload,
}

/// Key for one link found by the streaming search.
pub fn stream_key(query: &str, link: &str) -> String {
    format!("{}:{}", query, link)
}

/// Key for the result list of one bulk search.
pub fn bulk_key(query: &str, limit: usize) -> String {
    format!("{}_{}", query, limit)
}

pub struct SearchCache {
    path: PathBuf,
    /// `None` when `expire_days` is too large to represent; nothing expires.
    ttl: Option<Duration>,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl SearchCache {
    /// Load the snapshot at `path`, purging entries older than `expire_days`.
    pub fn load(path: impl Into<PathBuf>, expire_days: i64) -> Self {
        let path = path.into();
        let ttl = Duration::try_days(expire_days);

        let mut entries = match read_snapshot(&path) {
            Ok(Some(entries)) => entries,
            Ok(None) => HashMap::new(),
            Err(e) => {
                warn!(path = %path.display(), err = %e, "cache snapshot unreadable, starting empty");
                HashMap::new()
            }
        };

        let before = entries.len();
        if let Some(cutoff) = expiry_cutoff(ttl) {
            entries.retain(|_, entry| entry.timestamp_created > cutoff);
        }
        for (key, entry) in entries.iter_mut() {
            entry.key = key.clone();
        }
        if before != entries.len() {
            debug!(purged = before - entries.len(), "expired cache entries dropped");
        }

        let cache = Self {
            path,
            ttl,
            entries: Mutex::new(entries),
        };
        cache.flush(&cache.lock());
        cache
    }

    /// Returns the entry for `key` if present and not expired.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let entries = self.lock();
        let entry = entries.get(key)?;
        if expiry_cutoff(self.ttl).is_some_and(|cutoff| entry.timestamp_created <= cutoff) {
            return None;
        }
        Some(entry.clone())
    }

    /// Convenience for single-result entries.
    pub fn get_result(&self, key: &str) -> Option<SearchResult> {
        match self.get(key)?.payload {
            CachePayload::Single(result) => Some(result),
            CachePayload::List(_) => None,
        }
    }

    /// Convenience for list entries.
    pub fn get_results(&self, key: &str) -> Option<Vec<SearchResult>> {
        match self.get(key)?.payload {
            CachePayload::List(results) => Some(results),
            CachePayload::Single(_) => None,
        }
    }

    /// Insert or overwrite `key` and flush the snapshot.
    pub fn set(&self, key: &str, payload: CachePayload) {
        let mut entries = self.lock();
        entries.insert(
            key.to_string(),
            CacheEntry {
                key: key.to_string(),
                timestamp_created: Utc::now(),
                payload,
            },
        );
        self.flush(&entries);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Called with the lock held so concurrent writers never interleave.
    fn flush(&self, entries: &HashMap<String, CacheEntry>) {
        if let Err(e) = write_snapshot(&self.path, entries) {
            error!(path = %self.path.display(), err = %e, "failed to save cache");
        }
    }
}

/// Entries created at or before this instant are expired.
fn expiry_cutoff(ttl: Option<Duration>) -> Option<DateTime<Utc>> {
    Utc::now().checked_sub_signed(ttl?)
}

fn read_snapshot(path: &Path) -> Result<Option<HashMap<String, CacheEntry>>, CacheError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&content)?))
}

fn write_snapshot(path: &Path, entries: &HashMap<String, CacheEntry>) -> Result<(), CacheError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(entries)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// `harvest cache prune`: loading drops expired entries and rewrites the
/// snapshot.
pub fn run_cache_prune(config: &crate::config::CacheConfig) {
    let cache = SearchCache::load(config.file(), config.expire_days);
    println!(
        "{} live entries in {}",
        cache.len(),
        cache.path().display()
    );
}
