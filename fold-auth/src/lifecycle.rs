//! Session lifecycle: login, refresh, tenant switch and logout.
//!
//! Every successful transition notifies the [`SessionEventHub`] before the
//! call returns. Refresh is single-flight: concurrent callers share one
//! exchange with the auth service, and a failed refresh ends the session.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use fold_core::{FoldError, FoldResult, TenantScope};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::events::{ListenerId, SessionEvent, SessionEventHub, SessionListener};
use crate::jwt::{default_inspector, TokenInspector};
use crate::options::AuthOptions;
use crate::session::{AuthGrant, Credentials, Session, SessionStore};
use crate::strategy::AuthStrategy;

type SharedRefresh = Shared<BoxFuture<'static, FoldResult<Session>>>;

struct LifecycleInner {
    store: SessionStore,
    strategy: Arc<dyn AuthStrategy>,
    events: Arc<SessionEventHub>,
    options: AuthOptions,
    inspector: Box<dyn TokenInspector>,
    refresh_slot: Mutex<Option<SharedRefresh>>,
}

/// Owns every write to the [`SessionStore`].
#[derive(Clone)]
pub struct SessionLifecycle {
    inner: Arc<LifecycleInner>,
}

impl SessionLifecycle {
    pub fn new(store: SessionStore, strategy: Arc<dyn AuthStrategy>, options: AuthOptions) -> Self {
        Self::with_inspector(store, strategy, options, default_inspector())
    }

    pub fn with_inspector(
        store: SessionStore,
        strategy: Arc<dyn AuthStrategy>,
        options: AuthOptions,
        inspector: Box<dyn TokenInspector>,
    ) -> Self {
        Self {
            inner: Arc::new(LifecycleInner {
                store,
                strategy,
                events: Arc::new(SessionEventHub::new()),
                options,
                inspector,
                refresh_slot: Mutex::new(None),
            }),
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.inner.store
    }

    pub fn events(&self) -> &Arc<SessionEventHub> {
        &self.inner.events
    }

    pub fn options(&self) -> &AuthOptions {
        &self.inner.options
    }

    pub fn current(&self) -> Option<Session> {
        self.inner.store.current()
    }

    /// Listen to every transition.
    pub fn subscribe(&self, listener: SessionListener) -> ListenerId {
        self.inner.events.on_any(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.inner.events.off(id)
    }

    pub async fn login(&self, credentials: &Credentials) -> FoldResult<Session> {
        let grant = self
            .inner
            .strategy
            .login(credentials)
            .await
            .map_err(FoldError::normalize)?;

        let session = self.inner.session_from_grant(grant)?;
        let previous = self.inner.store.replace(Some(session.clone()));
        info!(user = %session.user_id, tenant = %session.tenant, "session started");

        self.inner.events.emit(&SessionEvent::LoggedIn {
            session: session.clone(),
            previous,
        });
        Ok(session)
    }

    /// Refresh the live session, joining a refresh already in flight.
    pub async fn refresh(&self) -> FoldResult<Session> {
        self.shared_refresh().await
    }

    /// Recover from an auth-expired response observed with `stale_token`.
    ///
    /// If the session has already moved on to another token the current
    /// session is returned without contacting the auth service.
    pub async fn recover(&self, stale_token: &str) -> FoldResult<Session> {
        let session = self
            .inner
            .store
            .current()
            .ok_or_else(|| FoldError::auth("session ended"))?;

        if session.credential_token != stale_token {
            debug!("credential already replaced; skipping refresh");
            return Ok(session);
        }
        self.shared_refresh().await
    }

    /// The live session expires within the configured skew.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        let skew = self.inner.options.refresh_skew;
        if skew.is_zero() {
            return false;
        }
        let Some(expires_at) = self.inner.store.current().and_then(|s| s.expires_at) else {
            return false;
        };
        let skew = chrono::Duration::from_std(skew).unwrap_or(chrono::Duration::zero());
        expires_at - now <= skew
    }

    /// Refresh ahead of dispatch when the token is about to expire.
    ///
    /// Returns whether a refresh ran.
    pub async fn ensure_fresh(&self) -> FoldResult<bool> {
        if !self.needs_refresh(Utc::now()) {
            return Ok(false);
        }
        debug!("credential near expiry; refreshing before dispatch");
        self.shared_refresh().await.map(|_| true)
    }

    /// Move the live session to another organisation or branch.
    ///
    /// Within one organisation the branch must be accessible. Switching to
    /// another organisation drops the branch allow-list, which belonged to
    /// the previous tenant.
    pub fn switch_tenant(&self, scope: TenantScope) -> FoldResult<Session> {
        let current = self
            .inner
            .store
            .current()
            .ok_or_else(|| FoldError::unscoped("no active session"))?;

        if current.tenant == scope {
            return Ok(current);
        }

        let same_org = current.tenant.same_tenant(&scope);
        if same_org {
            if let Some(branch) = &scope.branch_id {
                if !current.may_access_branch(branch) {
                    return Err(FoldError::scope_mismatch(
                        scope.to_string(),
                        current.tenant.to_string(),
                    ));
                }
            }
        }

        let from = current.tenant.clone();
        let session = self
            .inner
            .store
            .update(|s| {
                s.tenant = scope.clone();
                if !same_org {
                    s.accessible_branches = None;
                }
            })
            .ok_or_else(|| FoldError::unscoped("no active session"))?;

        info!(%from, to = %scope, "tenant switched");
        self.inner.events.emit(&SessionEvent::TenantSwitched {
            session: session.clone(),
            from,
            to: scope,
        });
        Ok(session)
    }

    /// End the session, revoking it remotely when configured to.
    pub async fn logout(&self) {
        if self.inner.options.revoke_on_logout {
            if let Some(session) = self.inner.store.current() {
                if let Err(e) = self.inner.strategy.revoke(&session).await {
                    warn!("session revoke failed: {}", e);
                }
            }
        }
        self.inner.end_session("logout");
    }

    /// End the session locally after `rejected_token` was refused again.
    ///
    /// A session that already carries a different token is left alone.
    pub fn expire(&self, rejected_token: &str) {
        if self.inner.store.credential_token().as_deref() == Some(rejected_token) {
            self.inner.end_session("credential rejected");
        }
    }

    fn shared_refresh(&self) -> SharedRefresh {
        let mut slot = self.inner.refresh_slot.lock();
        if let Some(inflight) = slot.as_ref() {
            debug!("joining in-flight refresh");
            return inflight.clone();
        }

        let fut = do_refresh(self.inner.clone()).boxed().shared();
        *slot = Some(fut.clone());
        fut
    }
}

async fn do_refresh(inner: Arc<LifecycleInner>) -> FoldResult<Session> {
    let stale_token = inner.store.credential_token();
    let result = inner.refresh_once().await;
    *inner.refresh_slot.lock() = None;

    match result {
        Ok(Some(session)) => {
            info!(user = %session.user_id, "session refreshed");
            inner.events.emit(&SessionEvent::Refreshed {
                session: session.clone(),
            });
            Ok(session)
        }
        Ok(None) => inner
            .store
            .current()
            .ok_or_else(|| FoldError::auth("session ended during refresh")),
        Err(e) => {
            warn!("session refresh failed: {}", e);
            // Only end the session the refresh was attempted for.
            if stale_token.is_some() && inner.store.credential_token() == stale_token {
                inner.end_session("refresh failed");
            }
            Err(e)
        }
    }
}

impl LifecycleInner {
    /// `Ok(None)` when the session changed underneath the refresh.
    async fn refresh_once(&self) -> FoldResult<Option<Session>> {
        let session = self
            .store
            .current()
            .ok_or_else(|| FoldError::auth("no active session"))?;
        if session.refresh_token.is_none() {
            return Err(FoldError::auth("session has no refresh token"));
        }

        let grant = self
            .strategy
            .refresh(&session)
            .await
            .map_err(FoldError::normalize)?;
        if grant.credential_token.trim().is_empty() {
            return Err(FoldError::auth("refresh grant carries no credential token"));
        }
        let expires_at = grant
            .expires_at
            .or_else(|| self.inspect_expiry(&grant.credential_token));

        let mut applied = false;
        let updated = self.store.update(|s| {
            if s.credential_token != session.credential_token {
                return;
            }
            s.credential_token = grant.credential_token.clone();
            if let Some(refresh) = grant.refresh_token.clone() {
                s.refresh_token = Some(refresh);
            }
            s.expires_at = expires_at;
            if let Some(branches) = grant.accessible_branches.clone() {
                s.accessible_branches = Some(branches);
            }
            applied = true;
        });

        Ok(updated.filter(|_| applied))
    }

    fn session_from_grant(&self, grant: AuthGrant) -> FoldResult<Session> {
        if grant.credential_token.trim().is_empty() {
            return Err(FoldError::auth("login grant carries no credential token"));
        }
        let user_id = grant
            .user_id
            .ok_or_else(|| FoldError::auth("login grant carries no user id"))?;
        let tenant = grant
            .tenant
            .ok_or_else(|| FoldError::auth("login grant carries no tenant"))?;
        let expires_at = grant
            .expires_at
            .or_else(|| self.inspect_expiry(&grant.credential_token));

        Ok(Session {
            display_name: grant.display_name.unwrap_or_else(|| user_id.clone()),
            user_id,
            credential_token: grant.credential_token,
            refresh_token: grant.refresh_token,
            expires_at,
            tenant,
            accessible_branches: grant.accessible_branches,
        })
    }

    fn inspect_expiry(&self, token: &str) -> Option<DateTime<Utc>> {
        if !self.options.inspect_token_expiry {
            return None;
        }
        match self.inspector.expires_at(token) {
            Ok(exp) => exp,
            Err(e) => {
                debug!("credential expiry unreadable: {}", e);
                None
            }
        }
    }

    fn end_session(&self, reason: &str) {
        let previous = self.store.take();
        if previous.is_none() {
            return;
        }
        info!(reason, "session ended");
        self.events.emit(&SessionEvent::LoggedOut { previous });
    }
}
