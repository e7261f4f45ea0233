//! Two-tier expiring cache for upstream data calls
//!
//! Each cache key gets a [`CacheEntry`] holding a bounded in-memory layer with a
//! short TTL and a persistent on-disk layer with a longer one. Entries live in
//! a [`CacheManager`] built once at startup; [`CacheManager::cached_call`]
//! wraps any fallible provider future so that upstream failures degrade to an
//! absent result instead of an error.

mod disk;
mod entry;
mod layer;
mod manager;
mod memory;
mod request;

pub use disk::{default_cache_dir, persisted_keys, CachedData, DiskLayer, CACHE_DIR_NAME};
pub use entry::{CacheEntry, EntryOptions};
pub use layer::{CacheError, CacheLayer};
pub use manager::CacheManager;
pub use memory::{MemoryLayer, DEFAULT_CAPACITY};
pub use request::{CachePolicy, Request};
