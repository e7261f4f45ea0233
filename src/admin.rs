//! Administrative cache operations
//!
//! Human-readable reports over a [`CacheManager`]: what is cached, and
//! removing one key or everything.

use crate::cache::CacheManager;

/// Keys listed by [`cache_status`] before the rest are summarized
pub const STATUS_KEY_LIMIT: usize = 20;

/// Reports registered entries and persisted records
pub fn cache_status(cache: &CacheManager) -> String {
    let keys = cache.keys();
    let persisted = cache.persisted_keys().len();

    if keys.is_empty() {
        return format!("Cache is empty (persisted records: {})", persisted);
    }

    let mut lines = Vec::with_capacity(keys.len().min(STATUS_KEY_LIMIT) + 3);
    lines.push(format!("Cache entries: {}", keys.len()));
    lines.extend(keys.iter().take(STATUS_KEY_LIMIT).map(|k| format!("  - {}", k)));
    if keys.len() > STATUS_KEY_LIMIT {
        lines.push(format!("  ... and {} more", keys.len() - STATUS_KEY_LIMIT));
    }
    lines.push(format!("Persisted records: {}", persisted));
    lines.join("\n")
}

/// Removes `key`, or everything when `key` is `None` or empty
pub fn cache_clear(cache: &CacheManager, key: Option<&str>) -> String {
    match key.map(str::trim).filter(|k| !k.is_empty()) {
        None => format!("Cleared {} cache entries", cache.clear_all()),
        Some(key) if cache.remove(key) => format!("Cleared cache entry: {}", key),
        Some(key) => format!("Cache entry not found: {}", key),
    }
}
