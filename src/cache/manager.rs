//! Registry of cache entries and the cached provider call
//!
//! A single `CacheManager` is built at startup and shared by reference with
//! every operation that caches upstream calls. It guarantees at most one
//! [`CacheEntry`] per key for its lifetime and closes every disk handle on
//! shutdown.

use std::collections::{BTreeSet, HashMap};
use std::fmt::Display;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error, info, warn};

use super::disk::{default_cache_dir, persisted_keys, DiskLayer};
use super::entry::{CacheEntry, EntryOptions};
use super::layer::CacheLayer;
use super::request::{CachePolicy, Request};

/// Owns every cache entry created during the process
#[derive(Debug)]
pub struct CacheManager {
    /// Directory shared by the disk layer of every entry
    cache_dir: PathBuf,
    entries: RwLock<HashMap<String, Arc<CacheEntry>>>,
}

impl CacheManager {
    /// Creates a manager over the XDG-compliant cache directory
    ///
    /// Returns `None` if the cache directory cannot be determined.
    pub fn new() -> Option<Self> {
        default_cache_dir().map(Self::with_dir)
    }

    /// Creates a manager with a custom cache directory
    pub fn with_dir(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<CacheEntry>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<CacheEntry>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the entry for `key`, registering it with `options` if new
    ///
    /// Options passed for an already registered key are ignored.
    pub fn get_or_create(&self, key: &str, options: EntryOptions) -> Arc<CacheEntry> {
        if let Some(entry) = self.read().get(key) {
            return Arc::clone(entry);
        }

        let mut entries = self.write();
        let entry = entries.entry(key.to_string()).or_insert_with(|| {
            debug!(key, "registering cache entry");
            Arc::new(CacheEntry::new(key, self.cache_dir.clone(), options))
        });
        Arc::clone(entry)
    }

    /// Returns the registered entry for `key` without creating one
    pub fn entry(&self, key: &str) -> Option<Arc<CacheEntry>> {
        self.read().get(key).cloned()
    }

    /// Registered keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Keys of unexpired records in the disk store, including ones written by
    /// earlier processes
    pub fn persisted_keys(&self) -> Vec<String> {
        persisted_keys(&self.cache_dir)
    }

    /// Deletes the value stored under `key` and unregisters the entry
    ///
    /// Records left on disk by earlier processes are deleted too. Returns
    /// `false` when `key` was neither registered nor persisted.
    pub fn remove(&self, key: &str) -> bool {
        let removed = self.write().remove(key);
        match removed {
            Some(entry) => {
                entry.delete();
                true
            }
            None if self.persisted_keys().iter().any(|k| k == key) => {
                self.delete_persisted(key);
                true
            }
            None => false,
        }
    }

    /// Deletes every registered value and persisted record, and empties the
    /// registry
    ///
    /// Returns the number of distinct keys that were removed.
    pub fn clear_all(&self) -> usize {
        let drained: Vec<Arc<CacheEntry>> = self.write().drain().map(|(_, entry)| entry).collect();
        let mut cleared: BTreeSet<String> = BTreeSet::new();
        for entry in &drained {
            entry.delete();
            cleared.insert(entry.key().to_string());
        }
        for key in self.persisted_keys() {
            self.delete_persisted(&key);
            cleared.insert(key);
        }
        info!(count = cleared.len(), "cleared cache");
        cleared.len()
    }

    fn delete_persisted(&self, key: &str) {
        let store = DiskLayer::new(self.cache_dir.clone(), Duration::ZERO);
        if let Err(e) = store.delete(key) {
            warn!(key, error = %e, "failed to delete cache record");
        }
    }

    /// Closes the disk handle of every entry
    ///
    /// Failures are logged and do not stop the remaining closes.
    pub fn close_all(&self) {
        let entries: Vec<Arc<CacheEntry>> = self.read().values().cloned().collect();
        for entry in entries {
            if let Err(e) = entry.close() {
                warn!(key = entry.key(), error = %e, "failed to close cache entry");
            }
        }
    }

    /// Runs `provider` through the cache
    ///
    /// On a hit the provider is not invoked. On a miss its result is stored and
    /// returned. A provider error is logged and yields `None`, leaving the cache
    /// untouched, so callers treat it as "no data".
    pub async fn cached_call<T, E, F, Fut>(
        &self,
        request: &Request,
        policy: CachePolicy,
        provider: F,
    ) -> Option<T>
    where
        T: Serialize + DeserializeOwned,
        E: Display,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let key = policy.resolve_key(request);
        let mut options = EntryOptions::with_memory_ttl(policy.ttl);
        options.disk_ttl = policy.ttl2;
        let entry = self.get_or_create(&key, options);

        if let Some(cached) = entry.get::<T>() {
            debug!(key = %key, "cache hit");
            return Some(cached);
        }

        info!(key = %key, provider = request.name(), "cache miss, calling provider");
        match provider().await {
            Ok(value) => Some(entry.set(value)),
            Err(e) => {
                error!(key = %key, error = %e, "provider call failed");
                None
            }
        }
    }
}
