//! Log output setup
//!
//! Logs go to stderr so stdout carries only operation results.

use std::io;

use tracing_subscriber::EnvFilter;

/// Builds the filter: `RUST_LOG` when set and valid, otherwise `default_level`
pub fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new(crate::config::DEFAULT_LOG_LEVEL))
}

/// Installs the global subscriber
///
/// Returns `false` if a subscriber was already installed.
pub fn init(default_level: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(filter(default_level))
        .with_writer(io::stderr)
        .with_target(false)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_harmless() {
        init("warn");
        assert!(!init("info"));
    }

    #[test]
    fn test_invalid_level_falls_back() {
        let filter = filter("not a [valid filter");
        assert!(!filter.to_string().is_empty());
    }
}
