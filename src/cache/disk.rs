//! Persistent cache layer storing records as JSON files
//!
//! Every record carries its own expiry timestamp, so values survive process
//! restarts until their TTL elapses. Expired records read as a miss and are
//! replaced by the next write to the same key.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use super::layer::{CacheError, CacheLayer};

/// Directory name used under the platform cache root
pub const CACHE_DIR_NAME: &str = "marketdesk";

/// Distinguishes temp files written concurrently by this process
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Wrapper struct for cached data stored on disk
#[derive(Debug, Serialize, Deserialize)]
struct DiskRecord<T> {
    /// The full cache key; file names only carry its digest
    key: String,
    /// The cached data
    data: T,
    /// When the data was cached
    cached_at: DateTime<Utc>,
    /// When the record expires
    expires_at: DateTime<Utc>,
}

/// The parts of a record needed to list keys without loading data
#[derive(Debug, Deserialize)]
struct RecordHeader {
    key: String,
    expires_at: DateTime<Utc>,
}

/// Result of reading a record, including metadata about its freshness
#[derive(Debug)]
pub struct CachedData {
    /// The cached data
    pub data: Value,
    /// When the data was originally cached
    pub cached_at: DateTime<Utc>,
    /// Whether the record has expired
    pub is_expired: bool,
}

/// Returns the XDG-compliant cache directory (`~/.cache/marketdesk/` on Linux)
///
/// Returns `None` if the directory cannot be determined (e.g., no home directory).
pub fn default_cache_dir() -> Option<PathBuf> {
    let project_dirs = ProjectDirs::from("", "", CACHE_DIR_NAME)?;
    Some(project_dirs.cache_dir().to_path_buf())
}

/// Lists the keys of all unexpired records in `cache_dir`, sorted
///
/// A missing directory or unreadable files are skipped rather than reported.
pub fn persisted_keys(cache_dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(cache_dir) else {
        return Vec::new();
    };

    let now = Utc::now();
    let mut keys: Vec<String> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .filter_map(|path| fs::read_to_string(path).ok())
        .filter_map(|content| serde_json::from_str::<RecordHeader>(&content).ok())
        .filter(|header| header.expires_at >= now)
        .map(|header| header.key)
        .collect();
    keys.sort();
    keys
}

/// File-backed store shared by every entry that points at the same directory
///
/// The directory is created on first write and the handle is released by
/// [`CacheLayer::close`]; later use reopens it.
#[derive(Debug)]
pub struct DiskLayer {
    /// Directory where cache files are stored
    cache_dir: PathBuf,
    ttl: Duration,
    open: AtomicBool,
}

impl DiskLayer {
    /// Creates a layer over `cache_dir` whose records expire after `ttl`
    pub fn new(cache_dir: PathBuf, ttl: Duration) -> Self {
        Self {
            cache_dir,
            ttl,
            open: AtomicBool::new(false),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Whether the directory has been opened since creation or the last close
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Returns the path to the record file for the given key
    fn cache_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", file_stem(key)))
    }

    /// Ensures the cache directory exists
    fn ensure_open(&self) -> std::io::Result<()> {
        if !self.is_open() {
            fs::create_dir_all(&self.cache_dir)?;
            self.open.store(true, Ordering::Release);
        }
        Ok(())
    }

    /// Writes `data` under `key`, replacing any previous record atomically
    pub fn write(&self, key: &str, data: &Value) -> Result<(), CacheError> {
        self.ensure_open()?;

        let now = Utc::now();
        let expires_at = ChronoDuration::from_std(self.ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let record = DiskRecord {
            key: key.to_string(),
            data,
            cached_at: now,
            expires_at,
        };
        let json = serde_json::to_vec(&record)?;

        match self.replace_file(key, &json) {
            Err(e) if e.kind() == ErrorKind::NotFound => {
                // Directory removed behind our back
                self.open.store(false, Ordering::Release);
                self.ensure_open()?;
                self.replace_file(key, &json)?;
            }
            result => result?,
        }
        Ok(())
    }

    fn replace_file(&self, key: &str, contents: &[u8]) -> std::io::Result<()> {
        let temp_path = self.cache_dir.join(format!(
            ".{}.{}.{}.tmp",
            file_stem(key),
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        fs::write(&temp_path, contents)?;
        fs::rename(&temp_path, self.cache_path(key)).inspect_err(|_| {
            let _ = fs::remove_file(&temp_path);
        })
    }

    /// Reads the record for `key`, expired or not
    ///
    /// Returns `None` if the record doesn't exist, cannot be parsed, or belongs
    /// to a different key.
    pub fn read(&self, key: &str) -> Option<CachedData> {
        let content = fs::read_to_string(self.cache_path(key)).ok()?;
        let record: DiskRecord<Value> = serde_json::from_str(&content).ok()?;
        if record.key != key {
            return None;
        }

        Some(CachedData {
            data: record.data,
            cached_at: record.cached_at,
            is_expired: Utc::now() > record.expires_at,
        })
    }
}

impl CacheLayer for DiskLayer {
    fn get(&self, key: &str) -> Option<Value> {
        // Expired records stay until the next write replaces them
        self.read(key)
            .filter(|cached| !cached.is_expired)
            .map(|cached| cached.data)
    }

    fn set(&self, key: &str, value: &Value) -> Result<(), CacheError> {
        self.write(key, value)
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        match fs::remove_file(self.cache_path(key)) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    fn close(&self) -> Result<(), CacheError> {
        if !self.open.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        // Make completed renames durable before the process goes away
        #[cfg(unix)]
        fs::File::open(&self.cache_dir)?.sync_all()?;
        Ok(())
    }
}

/// Hex SHA-256 of the key, safe to use as a file name on every platform
fn file_stem(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread;
    use std::time::Duration as StdDuration;
    use tempfile::TempDir;

    fn create_test_layer(ttl: StdDuration) -> (DiskLayer, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let layer = DiskLayer::new(temp_dir.path().to_path_buf(), ttl);
        (layer, temp_dir)
    }

    #[test]
    fn test_write_creates_file_in_cache_directory() {
        let (layer, temp_dir) = create_test_layer(StdDuration::from_secs(60));

        layer
            .write("stock_prices-[]-{}", &json!({"close": 10.5}))
            .expect("Write should succeed");

        let expected_path = temp_dir
            .path()
            .join(format!("{}.json", file_stem("stock_prices-[]-{}")));
        assert!(expected_path.exists(), "Cache file should exist");

        let content = fs::read_to_string(&expected_path).expect("Should read file");
        assert!(content.contains("\"key\":\"stock_prices-[]-{}\""));
        assert!(content.contains("10.5"));
    }

    #[test]
    fn test_file_stem_is_stable_hex() {
        let stem = file_stem("okx_candles-[]-{\"bar\":\"1H\"}");
        assert_eq!(stem.len(), 64);
        assert!(stem.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(stem, file_stem("okx_candles-[]-{\"bar\":\"1H\"}"));
        assert_ne!(stem, file_stem("okx_candles-[]-{\"bar\":\"1D\"}"));
    }

    #[test]
    fn test_read_returns_none_for_missing_key() {
        let (layer, _temp_dir) = create_test_layer(StdDuration::from_secs(60));

        assert!(layer.read("nonexistent_key").is_none());
        assert!(layer.get("nonexistent_key").is_none());
    }

    #[test]
    fn test_fresh_record_is_returned() {
        let (layer, _temp_dir) = create_test_layer(StdDuration::from_secs(60));

        layer.set("fresh_key", &json!([1, 2, 3])).unwrap();

        let cached = layer.read("fresh_key").expect("Should read fresh record");
        assert!(!cached.is_expired);
        assert_eq!(layer.get("fresh_key"), Some(json!([1, 2, 3])));
    }

    #[test]
    fn test_expired_record_is_a_miss_until_rewritten() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let stale = DiskLayer::new(temp_dir.path().to_path_buf(), StdDuration::ZERO);
        let fresh = DiskLayer::new(temp_dir.path().to_path_buf(), StdDuration::from_secs(60));

        stale.set("expired_key", &json!("stale")).unwrap();
        thread::sleep(StdDuration::from_millis(10));

        let cached = stale.read("expired_key").expect("Record still on disk");
        assert!(cached.is_expired);
        assert_eq!(cached.data, json!("stale"));
        assert!(stale.get("expired_key").is_none());

        // A read of the expired record never removes a newer write
        fresh.set("expired_key", &json!("fresh")).unwrap();
        assert!(stale.get("expired_key").is_some());
        assert_eq!(fresh.get("expired_key"), Some(json!("fresh")));
    }

    #[test]
    fn test_null_value_round_trips() {
        let (layer, _temp_dir) = create_test_layer(StdDuration::from_secs(60));

        layer.set("none_key", &Value::Null).unwrap();

        assert_eq!(layer.get("none_key"), Some(Value::Null));
    }

    #[test]
    fn test_overwrite_existing_record() {
        let (layer, _temp_dir) = create_test_layer(StdDuration::from_secs(60));

        layer.set("overwrite_key", &json!(1)).unwrap();
        layer.set("overwrite_key", &json!(2)).unwrap();

        assert_eq!(layer.get("overwrite_key"), Some(json!(2)));
    }

    #[test]
    fn test_delete_removes_record_and_tolerates_absence() {
        let (layer, _temp_dir) = create_test_layer(StdDuration::from_secs(60));

        layer.set("delete_key", &json!("v")).unwrap();
        layer.delete("delete_key").unwrap();
        layer.delete("delete_key").unwrap();

        assert!(layer.get("delete_key").is_none());
    }

    #[test]
    fn test_write_creates_directory_if_missing() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let nested_path = temp_dir.path().join("nested").join("cache").join("dir");
        let layer = DiskLayer::new(nested_path.clone(), StdDuration::from_secs(60));

        assert!(!layer.is_open());
        layer.set("nested_key", &json!(1)).expect("Write should succeed");

        assert!(layer.is_open());
        assert!(nested_path.exists(), "Nested directory should be created");
    }

    #[test]
    fn test_write_recovers_when_directory_removed() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let dir = temp_dir.path().join("cache");
        let layer = DiskLayer::new(dir.clone(), StdDuration::from_secs(60));

        layer.set("a", &json!(1)).unwrap();
        fs::remove_dir_all(&dir).unwrap();
        layer.set("b", &json!(2)).unwrap();

        assert_eq!(layer.get("b"), Some(json!(2)));
    }

    #[test]
    fn test_close_then_reopen_on_use() {
        let (layer, _temp_dir) = create_test_layer(StdDuration::from_secs(60));

        layer.set("k", &json!("v")).unwrap();
        layer.close().expect("Close should succeed");
        assert!(!layer.is_open());
        layer.close().expect("Second close is a no-op");

        assert_eq!(layer.get("k"), Some(json!("v")));
        layer.set("k2", &json!("v2")).unwrap();
        assert!(layer.is_open());
    }

    #[test]
    fn test_cached_at_timestamp_is_recorded() {
        let (layer, _temp_dir) = create_test_layer(StdDuration::from_secs(60));

        let before = Utc::now();
        layer.set("timestamp_key", &json!(999)).unwrap();
        let after = Utc::now();

        let cached = layer.read("timestamp_key").expect("Should read record");
        assert!(cached.cached_at >= before);
        assert!(cached.cached_at <= after);
    }

    #[test]
    fn test_persisted_keys_lists_live_records_only() {
        let temp_dir = TempDir::new().unwrap();
        let live = DiskLayer::new(temp_dir.path().to_path_buf(), StdDuration::from_secs(60));
        let dead = DiskLayer::new(temp_dir.path().to_path_buf(), StdDuration::ZERO);

        live.set("b-key", &json!(1)).unwrap();
        live.set("a-key", &json!(2)).unwrap();
        dead.set("gone", &json!(3)).unwrap();
        thread::sleep(StdDuration::from_millis(10));

        assert_eq!(persisted_keys(temp_dir.path()), vec!["a-key", "b-key"]);
    }

    #[test]
    fn test_persisted_keys_of_missing_directory_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        assert!(persisted_keys(&temp_dir.path().join("absent")).is_empty());
    }

    #[test]
    fn test_default_cache_dir_is_xdg_compliant() {
        if let Some(dir) = default_cache_dir() {
            assert!(dir.to_string_lossy().contains(CACHE_DIR_NAME));
        }
        // Passes when no home directory exists (e.g., in CI)
    }
}
