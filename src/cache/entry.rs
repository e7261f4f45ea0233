//! A single cached computation backed by a memory layer and a disk layer

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::disk::DiskLayer;
use super::layer::CacheLayer;
use super::memory::{MemoryLayer, DEFAULT_CAPACITY};

/// Settings applied when an entry is first registered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryOptions {
    /// How long a value stays in memory
    pub memory_ttl: Duration,
    /// How long a value stays on disk; `None` means twice `memory_ttl`
    pub disk_ttl: Option<Duration>,
    /// Maximum number of keys the memory layer holds
    pub capacity: usize,
}

impl Default for EntryOptions {
    fn default() -> Self {
        Self {
            memory_ttl: Duration::from_secs(600),
            disk_ttl: None,
            capacity: DEFAULT_CAPACITY,
        }
    }
}

impl EntryOptions {
    pub fn with_memory_ttl(memory_ttl: Duration) -> Self {
        Self {
            memory_ttl,
            ..Self::default()
        }
    }

    pub fn disk_ttl(mut self, disk_ttl: Duration) -> Self {
        self.disk_ttl = Some(disk_ttl);
        self
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// The disk TTL after applying the default
    pub fn resolved_disk_ttl(&self) -> Duration {
        self.disk_ttl.unwrap_or_else(|| self.memory_ttl.saturating_mul(2))
    }
}

/// One cache key with its two storage tiers
///
/// Reads try memory first and fall back to disk. A disk hit is not copied back
/// into memory. Writes always go to both tiers.
#[derive(Debug)]
pub struct CacheEntry {
    key: String,
    memory_ttl: Duration,
    disk_ttl: Duration,
    memory: Arc<dyn CacheLayer>,
    disk: Arc<dyn CacheLayer>,
}

impl CacheEntry {
    /// Builds an entry with a fresh memory layer and a disk layer over `cache_dir`
    pub fn new(key: impl Into<String>, cache_dir: PathBuf, options: EntryOptions) -> Self {
        let disk_ttl = options.resolved_disk_ttl();
        let memory = Arc::new(MemoryLayer::new(options.capacity, options.memory_ttl));
        let disk = Arc::new(DiskLayer::new(cache_dir, disk_ttl));
        Self {
            key: key.into(),
            memory_ttl: options.memory_ttl,
            disk_ttl,
            memory,
            disk,
        }
    }

    /// Builds an entry over caller-supplied layers
    ///
    /// The TTLs recorded here are informational; each layer enforces its own.
    pub fn with_layers(
        key: impl Into<String>,
        memory_ttl: Duration,
        disk_ttl: Duration,
        memory: Arc<dyn CacheLayer>,
        disk: Arc<dyn CacheLayer>,
    ) -> Self {
        Self {
            key: key.into(),
            memory_ttl,
            disk_ttl,
            memory,
            disk,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn memory_ttl(&self) -> Duration {
        self.memory_ttl
    }

    pub fn disk_ttl(&self) -> Duration {
        self.disk_ttl
    }

    pub fn memory(&self) -> &dyn CacheLayer {
        self.memory.as_ref()
    }

    pub fn disk(&self) -> &dyn CacheLayer {
        self.disk.as_ref()
    }

    /// Returns the raw stored value, memory first, then disk
    pub fn get_value(&self) -> Option<Value> {
        if let Some(value) = self.memory.get(&self.key) {
            return Some(value);
        }
        let value = self.disk.get(&self.key)?;
        debug!(key = %self.key, "cache disk hit");
        Some(value)
    }

    /// Returns the stored value decoded as `T`
    ///
    /// A value that no longer decodes as `T` counts as a miss.
    pub fn get<T: DeserializeOwned>(&self) -> Option<T> {
        let value = self.get_value()?;
        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                debug!(key = %self.key, error = %e, "cached value has an unexpected shape");
                None
            }
        }
    }

    /// Stores `value` in both tiers and hands it back
    ///
    /// Storage failures are logged and otherwise ignored.
    pub fn set<T: Serialize>(&self, value: T) -> T {
        match serde_json::to_value(&value) {
            Ok(json) => self.set_value(&json),
            Err(e) => warn!(key = %self.key, error = %e, "value is not cacheable"),
        }
        value
    }

    /// Stores an already-encoded value in both tiers
    pub fn set_value(&self, value: &Value) {
        if let Err(e) = self.memory.set(&self.key, value) {
            warn!(key = %self.key, error = %e, "memory cache write failed");
        }
        if let Err(e) = self.disk.set(&self.key, value) {
            warn!(key = %self.key, error = %e, "disk cache write failed");
        }
    }

    /// Removes the value from both tiers
    pub fn delete(&self) {
        if let Err(e) = self.memory.delete(&self.key) {
            warn!(key = %self.key, error = %e, "memory cache delete failed");
        }
        if let Err(e) = self.disk.delete(&self.key) {
            warn!(key = %self.key, error = %e, "disk cache delete failed");
        }
    }

    /// Releases the disk handle
    pub fn close(&self) -> Result<(), super::CacheError> {
        self.disk.close()
    }
}
