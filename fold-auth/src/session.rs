// Authenticated session and its store.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use fold_core::{BranchId, TenantScope};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Login input handed to the auth strategy.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Credentials {
    pub strategy: Option<String>,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl Credentials {
    pub fn password(identifier: impl Into<String>, password: impl Into<String>) -> Self {
        let mut data = Map::new();
        data.insert("identifier".to_string(), Value::String(identifier.into()));
        data.insert("password".to_string(), Value::String(password.into()));
        Self {
            strategy: Some("local".to_string()),
            data,
        }
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.data.get(name).and_then(|v| v.as_str())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("strategy", &self.strategy)
            .field("fields", &self.data.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// What the auth service hands back on login or refresh.
///
/// A refresh grant may omit identity and tenant; the live session keeps them.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthGrant {
    pub user_id: Option<String>,
    pub display_name: Option<String>,
    pub credential_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub tenant: Option<TenantScope>,
    pub accessible_branches: Option<Vec<BranchId>>,
}

impl fmt::Debug for AuthGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthGrant")
            .field("user_id", &self.user_id)
            .field("expires_at", &self.expires_at)
            .field("tenant", &self.tenant)
            .finish_non_exhaustive()
    }
}

/// The one live authenticated identity.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: String,
    pub display_name: String,
    pub credential_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub tenant: TenantScope,
    /// Branches this identity may scope to; `None` means the service decides.
    pub accessible_branches: Option<Vec<BranchId>>,
}

impl Session {
    pub fn has_credential(&self) -> bool {
        !self.credential_token.trim().is_empty()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }

    pub fn may_access_branch(&self, branch: &BranchId) -> bool {
        match &self.accessible_branches {
            Some(branches) => branches.contains(branch),
            None => true,
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("display_name", &self.display_name)
            .field("expires_at", &self.expires_at)
            .field("tenant", &self.tenant)
            .finish_non_exhaustive()
    }
}

/// Holds zero or one live session.
///
/// Cloning yields another handle onto the same slot. Only the lifecycle
/// controller in this crate can write it.
#[derive(Clone, Default)]
pub struct SessionStore {
    slot: Arc<RwLock<Option<Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Session> {
        self.slot.read().clone()
    }

    pub fn is_active(&self) -> bool {
        self.slot.read().is_some()
    }

    /// Token currently attached to outgoing requests.
    pub fn credential_token(&self) -> Option<String> {
        self.slot.read().as_ref().map(|s| s.credential_token.clone())
    }

    pub(crate) fn replace(&self, session: Option<Session>) -> Option<Session> {
        std::mem::replace(&mut *self.slot.write(), session)
    }

    pub(crate) fn take(&self) -> Option<Session> {
        self.slot.write().take()
    }

    /// Apply `f` to the live session, if any, and return the updated copy.
    pub(crate) fn update<F>(&self, f: F) -> Option<Session>
    where
        F: FnOnce(&mut Session),
    {
        let mut slot = self.slot.write();
        let session = slot.as_mut()?;
        f(session);
        Some(session.clone())
    }
}
