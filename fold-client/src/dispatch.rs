//! Sending one scoped operation, with at most one refresh-and-retry.
//!
//! ```text
//! Sent --auth expired--> Refreshing --refreshed--> Retried
//!   |                        |                        |
//!   +-- other outcome        +-- refresh failed       +-- success, or any
//!       (final)                  (original error)         failure surfaced
//!                                                         as the original error
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use fold_auth::{SessionLifecycle, TenantScopeResolver};
use fold_core::{
    FoldError, FoldResult, OperationDescriptor, RemoteRequest, TenantScope, Transport, Variables,
};
use serde_json::Value;
use tracing::{debug, warn};

/// Everything needed to (re)send one operation.
#[derive(Debug, Clone)]
pub(crate) struct Call {
    pub descriptor: Arc<OperationDescriptor>,
    pub variables: Variables,
    /// Scope the request key was computed under.
    pub scope: TenantScope,
    /// Overrides the configured request timeout.
    pub timeout: Option<Duration>,
    pub allow_partial: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Sent,
    Refreshing,
    Retried,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Sent => "sent",
            Phase::Refreshing => "refreshing",
            Phase::Retried => "retried",
        })
    }
}

#[derive(Clone)]
pub(crate) struct Dispatcher {
    transport: Arc<dyn Transport>,
    resolver: TenantScopeResolver,
    lifecycle: SessionLifecycle,
    refresh_retry: bool,
    default_timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        resolver: TenantScopeResolver,
        lifecycle: SessionLifecycle,
        refresh_retry: bool,
        default_timeout: Option<Duration>,
    ) -> Self {
        Self {
            transport,
            resolver,
            lifecycle,
            refresh_retry,
            default_timeout,
        }
    }

    pub fn resolve_scope(&self) -> FoldResult<TenantScope> {
        self.resolver.resolve()
    }

    pub async fn dispatch(&self, call: &Call) -> FoldResult<Value> {
        let name = call.descriptor.name.as_str();
        let mut proactive = false;
        if self.refresh_retry {
            proactive = self.lifecycle.ensure_fresh().await.map_err(|e| {
                FoldError::auth_expired(format!("session refresh before {name} failed: {e}"))
            })?;
        }

        let mut phase = Phase::Sent;
        let mut attempt: u32 = 0;
        let mut original: Option<FoldError> = None;

        loop {
            attempt += 1;
            let (session, scope) = self.resolver.resolve_session()?;
            if scope != call.scope {
                return Err(FoldError::scope_mismatch(
                    call.scope.to_string(),
                    scope.to_string(),
                ));
            }

            let request = RemoteRequest {
                operation_name: call.descriptor.name.clone(),
                kind: call.descriptor.kind,
                document: call.descriptor.document.clone(),
                variables: scope.inject(call.variables.clone())?,
                credential: session.credential_token.clone(),
            };
            debug!(operation = name, attempt, %phase, scope = %scope, "dispatch");

            let err = match self.send(request, call).await {
                Ok(data) => return Ok(data),
                Err(e) if e.is_auth_expired() => e,
                Err(e) => match original {
                    Some(original) => {
                        warn!(operation = name, attempt, "retry after refresh failed: {}", e);
                        return Err(original);
                    }
                    None => return Err(e),
                },
            };

            match phase {
                Phase::Sent if self.refresh_retry && !proactive => {
                    phase = Phase::Refreshing;
                    debug!(operation = name, attempt, %phase, "credential expired");
                    if let Err(refresh_err) = self.lifecycle.recover(&session.credential_token).await {
                        warn!(operation = name, "refresh failed: {}", refresh_err);
                        return Err(err);
                    }
                    original = Some(err);
                    phase = Phase::Retried;
                }
                Phase::Sent if !self.refresh_retry => return Err(err),
                _ => {
                    warn!(operation = name, attempt, "credential rejected after refresh");
                    self.lifecycle.expire(&session.credential_token);
                    return Err(original.unwrap_or(err));
                }
            }
        }
    }

    async fn send(&self, request: RemoteRequest, call: &Call) -> FoldResult<Value> {
        let name = request.operation_name.clone();
        let response = match call.timeout.or(self.default_timeout) {
            Some(limit) => tokio::time::timeout(limit, self.transport.send(request))
                .await
                .map_err(|_| FoldError::timeout(format!("{name} timed out after {limit:?}")))??,
            None => self.transport.send(request).await?,
        };
        response.into_result(call.allow_partial)
    }
}
