//! Storage layer abstraction shared by the in-memory and on-disk stores

use serde_json::Value;
use thiserror::Error;

/// Errors raised by a cache layer
#[derive(Debug, Error)]
pub enum CacheError {
    /// Filesystem access failed
    #[error("Cache I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// A value could not be converted to or from JSON
    #[error("Cache serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One tier of a cache entry.
///
/// Each layer owns its own expiry policy, fixed when the layer is built, so a
/// `set` always resets the clock for that key. Implementations must be safe to
/// share between concurrent requests.
pub trait CacheLayer: Send + Sync + std::fmt::Debug {
    /// Returns the live value for `key`, or `None` when absent or expired
    fn get(&self, key: &str) -> Option<Value>;

    /// Stores `value` under `key`, replacing any previous value
    fn set(&self, key: &str, value: &Value) -> Result<(), CacheError>;

    /// Removes `key`; absent keys are not an error
    fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Releases any handle the layer holds. The layer reopens on next use.
    fn close(&self) -> Result<(), CacheError> {
        Ok(())
    }
}
