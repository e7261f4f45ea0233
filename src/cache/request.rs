//! Request fingerprints and cache policies for provider calls

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

/// Identity and arguments of one provider call
///
/// Two requests with the same name and equal arguments produce the same
/// [`cache_key`](Request::cache_key). Named arguments are ordered by name, so
/// the order in which they are added does not matter.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    name: String,
    args: Vec<Value>,
    kwargs: BTreeMap<String, Value>,
}

impl Request {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            kwargs: BTreeMap::new(),
        }
    }

    /// Appends a positional argument
    pub fn arg(mut self, value: impl Serialize) -> Self {
        self.args.push(to_value(value));
        self
    }

    /// Sets a named argument, replacing an earlier value under the same name
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Serialize) -> Self {
        self.kwargs.insert(name.into(), to_value(value));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Deterministic key: `name-[args]-{kwargs}` in compact JSON
    pub fn cache_key(&self) -> String {
        let args = Value::Array(self.args.clone());
        let kwargs: serde_json::Map<String, Value> = self
            .kwargs
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        format!("{}-{}-{}", self.name, args, Value::Object(kwargs))
    }
}

/// Arguments that fail to serialize are keyed as `null`
fn to_value(value: impl Serialize) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// How a provider call is cached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    /// Explicit key; derived from the request when `None`
    pub key: Option<String>,
    /// Memory TTL
    pub ttl: Duration,
    /// Disk TTL; twice `ttl` when `None`
    pub ttl2: Option<Duration>,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            key: None,
            ttl: Duration::from_secs(86400),
            ttl2: None,
        }
    }
}

impl CachePolicy {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            ..Self::default()
        }
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn ttl2(mut self, ttl2: Duration) -> Self {
        self.ttl2 = Some(ttl2);
        self
    }

    /// The key to use for `request`
    pub fn resolve_key(&self, request: &Request) -> String {
        match &self.key {
            Some(key) if !key.is_empty() => key.clone(),
            _ => request.cache_key(),
        }
    }
}
