// Authentication strategies.

use anyhow::Result;
use async_trait::async_trait;

use crate::session::{AuthGrant, Credentials, Session};

/// The remote credential exchange.
///
/// Errors are normalized by the lifecycle controller: a `FoldError` passes
/// through as-is, anything else becomes a network error.
#[async_trait]
pub trait AuthStrategy: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> Result<AuthGrant>;

    /// Exchange the session's refresh token for a new credential.
    async fn refresh(&self, session: &Session) -> Result<AuthGrant>;

    /// Best-effort revocation on logout.
    async fn revoke(&self, _session: &Session) -> Result<()> {
        Ok(())
    }
}
