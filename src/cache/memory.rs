//! Bounded, time-expiring in-memory layer backed by `moka`

use std::fmt;
use std::time::Duration;

use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use serde_json::Value;

use super::layer::{CacheError, CacheLayer};

/// Default number of keys a memory layer holds before evicting
pub const DEFAULT_CAPACITY: usize = 100;

/// In-process store with a fixed TTL and capacity
///
/// Values expire `ttl` after they were last set. When the layer is full the
/// least recently used value is evicted. A zero TTL stores nothing.
pub struct MemoryLayer {
    ttl: Duration,
    capacity: usize,
    entries: Cache<String, Value>,
}

impl MemoryLayer {
    /// Creates an empty layer. A capacity of zero is treated as one.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = capacity.max(1);
        let entries = Cache::builder()
            .max_capacity(capacity as u64)
            .time_to_live(ttl.max(Duration::from_nanos(1)))
            .eviction_policy(EvictionPolicy::lru())
            .build();
        Self {
            ttl,
            capacity,
            entries,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of live values, after pending evictions are applied
    pub fn len(&self) -> usize {
        self.entries.run_pending_tasks();
        self.entries.entry_count() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for MemoryLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryLayer")
            .field("ttl", &self.ttl)
            .field("capacity", &self.capacity)
            .field("entries", &self.entries.entry_count())
            .finish()
    }
}

impl CacheLayer for MemoryLayer {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries.get(key)
    }

    fn set(&self, key: &str, value: &Value) -> Result<(), CacheError> {
        if self.ttl.is_zero() {
            self.entries.invalidate(key);
            return Ok(());
        }
        self.entries.insert(key.to_string(), value.clone());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.invalidate(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread;

    #[test]
    fn test_set_then_get_returns_value() {
        let layer = MemoryLayer::new(10, Duration::from_secs(60));
        layer.set("k", &json!({"a": 1})).unwrap();

        assert_eq!(layer.get("k"), Some(json!({"a": 1})));
        assert_eq!(layer.len(), 1);
    }

    #[test]
    fn test_missing_key_returns_none() {
        let layer = MemoryLayer::new(10, Duration::from_secs(60));
        assert!(layer.get("nope").is_none());
        assert!(layer.is_empty());
    }

    #[test]
    fn test_zero_ttl_is_immediately_stale() {
        let layer = MemoryLayer::new(10, Duration::ZERO);
        layer.set("k", &json!(1)).unwrap();

        assert!(layer.get("k").is_none());
        assert!(layer.is_empty());
    }

    #[test]
    fn test_value_expires_after_ttl() {
        let layer = MemoryLayer::new(10, Duration::from_millis(30));
        layer.set("k", &json!("v")).unwrap();
        assert!(layer.get("k").is_some());

        thread::sleep(Duration::from_millis(60));

        assert!(layer.get("k").is_none());
    }

    #[test]
    fn test_set_resets_expiry() {
        let layer = MemoryLayer::new(10, Duration::from_millis(300));
        layer.set("k", &json!(1)).unwrap();
        thread::sleep(Duration::from_millis(200));
        layer.set("k", &json!(2)).unwrap();
        thread::sleep(Duration::from_millis(200));

        assert_eq!(layer.get("k"), Some(json!(2)));
    }

    #[test]
    fn test_capacity_is_enforced() {
        let layer = MemoryLayer::new(2, Duration::from_secs(60));
        layer.set("a", &json!(1)).unwrap();
        layer.set("b", &json!(2)).unwrap();
        layer.set("c", &json!(3)).unwrap();

        assert_eq!(layer.len(), 2);
        assert_eq!(layer.get("c"), Some(json!(3)), "newest value is admitted");
    }

    #[test]
    fn test_overwrite_does_not_evict() {
        let layer = MemoryLayer::new(2, Duration::from_secs(60));
        layer.set("a", &json!(1)).unwrap();
        layer.set("b", &json!(2)).unwrap();
        layer.set("a", &json!(10)).unwrap();

        assert_eq!(layer.get("a"), Some(json!(10)));
        assert_eq!(layer.get("b"), Some(json!(2)));
        assert_eq!(layer.len(), 2);
    }

    #[test]
    fn test_delete_is_noop_when_absent() {
        let layer = MemoryLayer::new(2, Duration::from_secs(60));
        layer.delete("ghost").unwrap();
        layer.set("k", &json!(null)).unwrap();
        layer.delete("k").unwrap();

        assert!(layer.get("k").is_none());
    }

    #[test]
    fn test_zero_capacity_still_holds_one_value() {
        let layer = MemoryLayer::new(0, Duration::from_secs(60));
        assert_eq!(layer.capacity(), 1);
        layer.set("a", &json!(1)).unwrap();
        layer.set("b", &json!(2)).unwrap();

        assert_eq!(layer.len(), 1);
        assert_eq!(layer.get("b"), Some(json!(2)));
    }
}
