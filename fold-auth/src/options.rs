// Session lifecycle options.

use std::time::Duration;

use fold_core::config::AUTH_REFRESH_SKEW_MS;
use fold_core::{ConfigError, FoldConfigSnapshot};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AuthOptions {
    /// Refresh before dispatch when the token expires within this window.
    /// Zero disables proactive refresh.
    #[serde(with = "humantime_serde")]
    pub refresh_skew: Duration,
    /// Ask the strategy to revoke the session on logout.
    pub revoke_on_logout: bool,
    /// Read `exp` from the credential token when a grant carries no expiry.
    pub inspect_token_expiry: bool,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            refresh_skew: Duration::from_secs(30),
            revoke_on_logout: true,
            inspect_token_expiry: true,
        }
    }
}

impl AuthOptions {
    pub fn builder() -> AuthOptionsBuilder {
        AuthOptionsBuilder::new()
    }

    pub fn from_snapshot(snapshot: &FoldConfigSnapshot) -> Result<Self, ConfigError> {
        let mut options = Self::default();
        if let Some(ms) = snapshot.try_u64(AUTH_REFRESH_SKEW_MS)? {
            options.refresh_skew = Duration::from_millis(ms);
        }
        Ok(options)
    }
}

#[derive(Debug, Default)]
pub struct AuthOptionsBuilder {
    options: AuthOptions,
}

impl AuthOptionsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refresh_skew(mut self, skew: Duration) -> Self {
        self.options.refresh_skew = skew;
        self
    }

    pub fn revoke_on_logout(mut self, revoke: bool) -> Self {
        self.options.revoke_on_logout = revoke;
        self
    }

    pub fn inspect_token_expiry(mut self, inspect: bool) -> Self {
        self.options.inspect_token_expiry = inspect;
        self
    }

    pub fn build(self) -> AuthOptions {
        self.options
    }
}
