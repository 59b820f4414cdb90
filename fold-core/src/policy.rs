use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How a query treats the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchPolicy {
    /// Serve a cached entry and stop; go to the network only on a miss.
    #[default]
    CacheFirst,
    /// Serve a cached entry if present, then refresh it from the network.
    CacheAndNetwork,
    /// Always go to the network; the result is still written back.
    NetworkOnly,
}

impl FetchPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchPolicy::CacheFirst => "cache-first",
            FetchPolicy::CacheAndNetwork => "cache-and-network",
            FetchPolicy::NetworkOnly => "network-only",
        }
    }

    pub fn reads_cache(&self) -> bool {
        !matches!(self, FetchPolicy::NetworkOnly)
    }
}

impl fmt::Display for FetchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FetchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "cache-first" => Ok(FetchPolicy::CacheFirst),
            "cache-and-network" => Ok(FetchPolicy::CacheAndNetwork),
            "network-only" => Ok(FetchPolicy::NetworkOnly),
            other => Err(format!("unknown fetch policy: {other}")),
        }
    }
}

/// Per-call options for a query.
///
/// Unset fields fall back to the client configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOptions {
    pub policy: Option<FetchPolicy>,
    pub timeout: Option<Duration>,
    /// Accept `data` that arrives alongside `errors`.
    pub allow_partial: bool,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn policy(mut self, policy: FetchPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn cache_first() -> Self {
        Self::new().policy(FetchPolicy::CacheFirst)
    }

    pub fn cache_and_network() -> Self {
        Self::new().policy(FetchPolicy::CacheAndNetwork)
    }

    pub fn network_only() -> Self {
        Self::new().policy(FetchPolicy::NetworkOnly)
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn allow_partial(mut self, allow: bool) -> Self {
        self.allow_partial = allow;
        self
    }
}

/// Per-call options for a mutation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MutationOptions {
    pub timeout: Option<Duration>,
    pub allow_partial: bool,
}

impl MutationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn allow_partial(mut self, allow: bool) -> Self {
        self.allow_partial = allow;
        self
    }
}
