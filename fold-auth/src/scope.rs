// Tenant scope resolution.

use std::sync::Arc;

use fold_core::{BranchSelection, FoldError, FoldResult, TenantScope};
use parking_lot::RwLock;

use crate::session::{Session, SessionStore};

/// Branch selection supplied by the current navigation context.
#[derive(Clone, Default)]
pub struct Navigation {
    selection: Arc<RwLock<Option<BranchSelection>>>,
}

impl Navigation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(&self, selection: BranchSelection) {
        *self.selection.write() = Some(selection);
    }

    pub fn clear(&self) {
        *self.selection.write() = None;
    }

    pub fn current(&self) -> Option<BranchSelection> {
        self.selection.read().clone()
    }
}

/// Derives the active organisation/branch.
///
/// Fails closed: it never falls back to a default tenant and never
/// re-parents a selection that names another organisation.
#[derive(Clone)]
pub struct TenantScopeResolver {
    sessions: SessionStore,
    navigation: Navigation,
}

impl TenantScopeResolver {
    pub fn new(sessions: SessionStore, navigation: Navigation) -> Self {
        Self {
            sessions,
            navigation,
        }
    }

    pub fn navigation(&self) -> &Navigation {
        &self.navigation
    }

    pub fn resolve(&self) -> FoldResult<TenantScope> {
        self.resolve_session().map(|(_, scope)| scope)
    }

    /// Resolve the scope together with the session it was derived from, so
    /// the credential and the scope of one dispatch come from the same read.
    pub fn resolve_session(&self) -> FoldResult<(Session, TenantScope)> {
        let session = self
            .sessions
            .current()
            .ok_or_else(|| FoldError::unscoped("no active session"))?;
        if !session.has_credential() {
            return Err(FoldError::unscoped("session has no credential token"));
        }

        let scope = scope_for(&session, self.navigation.current().as_ref())?;
        Ok((session, scope))
    }
}

fn scope_for(session: &Session, selection: Option<&BranchSelection>) -> FoldResult<TenantScope> {
    let Some(selection) = selection else {
        return Ok(session.tenant.clone());
    };

    if selection.organisation_id != session.tenant.organisation_id {
        return Err(FoldError::scope_mismatch(
            selection.to_string(),
            session.tenant.to_string(),
        ));
    }
    if !session.may_access_branch(&selection.branch_id) {
        return Err(FoldError::scope_mismatch(
            selection.to_string(),
            session.tenant.to_string(),
        ));
    }

    Ok(TenantScope::new(
        selection.organisation_id.clone(),
        Some(selection.branch_id.clone()),
    ))
}
