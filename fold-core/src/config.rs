//! # Fold Configuration
//!
//! A minimal string key/value store with typed snapshots. Applications
//! layer configuration however they like and hand the result to the client.
//!
//! ## Setting and reading values
//! ```rust
//! use fold_core::{ClientOptions, FetchPolicy, FoldConfig};
//!
//! let mut config = FoldConfig::new();
//! config.set("endpoint.url", "https://api.example.org/graphql");
//! config.set("cache.policy", "cache-and-network");
//! config.set("request.timeout_ms", "1500");
//!
//! let options = ClientOptions::from_snapshot(&config.snapshot()).unwrap();
//! assert_eq!(options.default_policy, FetchPolicy::CacheAndNetwork);
//! ```
//!
//! ## Environment overrides
//! ```bash
//! export FOLD__ENDPOINT__URL=https://api.example.org/graphql
//! export FOLD__AUTH__REFRESH_RETRY=false
//! ```
//! `load_env_config(&mut config, "FOLD__")` maps these to `endpoint.url`
//! and `auth.refresh_retry`.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::CacheLimits;
use crate::policy::FetchPolicy;

pub const ENDPOINT_URL: &str = "endpoint.url";
pub const CACHE_POLICY: &str = "cache.policy";
pub const CACHE_TTL_MS: &str = "cache.ttl_ms";
pub const CACHE_MAX_ENTRIES: &str = "cache.max_entries";
pub const AUTH_REFRESH_RETRY: &str = "auth.refresh_retry";
pub const AUTH_REFRESH_SKEW_MS: &str = "auth.refresh_skew_ms";
pub const REQUEST_TIMEOUT_MS: &str = "request.timeout_ms";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for `{key}`: {reason}")]
    Invalid { key: String, reason: String },

    #[error("Missing {0}")]
    Missing(String),
}

impl ConfigError {
    fn invalid(key: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Default)]
pub struct FoldConfig {
    values: HashMap<String, String>,
}

impl FoldConfig {
    /// Create an empty config store.
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    /// Set a configuration key to a string value.
    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.values.insert(key.into(), value.into());
    }

    /// Get a configuration value by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn snapshot(&self) -> FoldConfigSnapshot {
        FoldConfigSnapshot::new(self.values.clone())
    }
}

/// Copy every `PREFIX…` environment variable into `config`.
///
/// `FOLD__REQUEST__TIMEOUT_MS` with prefix `FOLD__` becomes
/// `request.timeout_ms`.
pub fn load_env_config(config: &mut FoldConfig, prefix: &str) {
    load_vars(config, prefix, std::env::vars());
}

fn load_vars(config: &mut FoldConfig, prefix: &str, vars: impl Iterator<Item = (String, String)>) {
    for (key, value) in vars {
        if let Some(stripped) = key.strip_prefix(prefix) {
            let normalized = stripped.to_lowercase().replace("__", ".");
            config.set(normalized, value);
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FoldConfigSnapshot {
    map: HashMap<String, String>,
}

impl FoldConfigSnapshot {
    pub(crate) fn new(map: HashMap<String, String>) -> Self {
        Self { map }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(|s| s.as_str())
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    pub fn get_usize(&self, key: &str) -> Option<usize> {
        self.get(key).and_then(|v| v.trim().parse::<usize>().ok())
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.trim().parse::<u64>().ok())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.trim().parse::<bool>().ok())
    }

    /// Like `get_u64`, but a present, unparsable value is an error.
    pub fn try_u64(&self, key: &str) -> Result<Option<u64>, ConfigError> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map(Some)
                .map_err(|e| ConfigError::invalid(key, e.to_string())),
        }
    }

    /// Like `get_bool`, but a present, unparsable value is an error.
    pub fn try_bool(&self, key: &str) -> Result<Option<bool>, ConfigError> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw
                .trim()
                .parse::<bool>()
                .map(Some)
                .map_err(|e| ConfigError::invalid(key, e.to_string())),
        }
    }
}

/// Executor-facing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    /// Remote data service endpoint.
    pub endpoint: Option<String>,
    /// Policy used when a query does not pick one.
    pub default_policy: FetchPolicy,
    /// Refresh the session and retry once on an auth-expired response.
    pub refresh_retry: bool,
    /// Per-request timeout; `None` waits indefinitely.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub cache_ttl: Option<Duration>,
    pub cache_max_entries: Option<usize>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            endpoint: None,
            default_policy: FetchPolicy::CacheFirst,
            refresh_retry: true,
            request_timeout: Some(Duration::from_secs(30)),
            cache_ttl: None,
            cache_max_entries: None,
        }
    }
}

impl ClientOptions {
    /// Read options from a config snapshot; missing keys keep their defaults.
    pub fn from_snapshot(snapshot: &FoldConfigSnapshot) -> Result<Self, ConfigError> {
        let mut options = Self::default();

        if let Some(url) = snapshot.get_string(ENDPOINT_URL) {
            options.endpoint = Some(url);
        }
        if let Some(raw) = snapshot.get(CACHE_POLICY) {
            options.default_policy = raw
                .parse()
                .map_err(|reason: String| ConfigError::invalid(CACHE_POLICY, reason))?;
        }
        if let Some(retry) = snapshot.try_bool(AUTH_REFRESH_RETRY)? {
            options.refresh_retry = retry;
        }
        if let Some(ms) = snapshot.try_u64(REQUEST_TIMEOUT_MS)? {
            // 0 disables the timeout
            options.request_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(ms) = snapshot.try_u64(CACHE_TTL_MS)? {
            options.cache_ttl = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(max) = snapshot.try_u64(CACHE_MAX_ENTRIES)? {
            options.cache_max_entries = (max > 0).then_some(max as usize);
        }

        Ok(options)
    }

    pub fn cache_limits(&self) -> CacheLimits {
        CacheLimits {
            ttl: self.cache_ttl,
            max_entries: self.cache_max_entries,
        }
    }
}
