//! Runtime configuration
//!
//! Values come from defaults, then environment variables, then command-line
//! flags, each layer overriding the previous one.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::data::okx::OKX_BASE_URL;

pub const ENV_CACHE_DIR: &str = "MARKETDESK_CACHE_DIR";
pub const ENV_OKX_BASE_URL: &str = "OKX_BASE_URL";
pub const ENV_TIMEOUT_SECS: &str = "MARKETDESK_TIMEOUT_SECS";

/// Default timeout for upstream HTTP requests
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Default log filter when neither `RUST_LOG` nor a flag sets one
pub const DEFAULT_LOG_LEVEL: &str = "warn";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {name}: '{value}' ({reason})")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Cache directory; `None` selects the platform cache directory
    pub cache_dir: Option<PathBuf>,
    pub okx_base_url: String,
    pub request_timeout: Duration,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: None,
            okx_base_url: OKX_BASE_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl Config {
    /// Reads configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds configuration from an arbitrary variable lookup
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(dir) = var(ENV_CACHE_DIR) {
            config.cache_dir = Some(PathBuf::from(dir));
        }
        if let Some(url) = var(ENV_OKX_BASE_URL) {
            config.okx_base_url = parse_base_url(ENV_OKX_BASE_URL, &url)?;
        }
        if let Some(secs) = var(ENV_TIMEOUT_SECS) {
            config.request_timeout = parse_timeout(ENV_TIMEOUT_SECS, &secs)?;
        }
        Ok(config)
    }

    /// Applies command-line overrides on top of this configuration
    pub fn with_overrides(
        mut self,
        cache_dir: Option<PathBuf>,
        okx_base_url: Option<&str>,
        log_level: Option<&str>,
    ) -> Result<Self, ConfigError> {
        if let Some(dir) = cache_dir {
            self.cache_dir = Some(dir);
        }
        if let Some(url) = okx_base_url {
            self.okx_base_url = parse_base_url("--okx-base-url", url)?;
        }
        if let Some(level) = log_level {
            self.log_level = level.to_string();
        }
        Ok(self)
    }
}

fn parse_base_url(name: &'static str, value: &str) -> Result<String, ConfigError> {
    let trimmed = value.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Ok(trimmed.to_string())
    } else {
        Err(ConfigError::InvalidValue {
            name,
            value: value.to_string(),
            reason: "expected an http or https URL",
        })
    }
}

fn parse_timeout(name: &'static str, value: &str) -> Result<Duration, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::InvalidValue {
            name,
            value: value.to_string(),
            reason: "expected a positive number of seconds",
        }),
    }
}
