//! Core multi-tenant types for Fold.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{FoldError, FoldResult};
use crate::operation::Variables;

/// Organisation identifier (the tenant).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrganisationId(pub String);

/// Branch identifier, always relative to one organisation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BranchId(pub String);

impl OrganisationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl BranchId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrganisationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for OrganisationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for OrganisationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for BranchId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for BranchId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// The organisation/branch pair every request is scoped to.
///
/// Outside of tests this is only ever produced by the scope resolver from
/// the live session, never assembled by feature code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantScope {
    pub organisation_id: OrganisationId,
    pub branch_id: Option<BranchId>,
}

impl TenantScope {
    pub fn new(organisation_id: impl Into<OrganisationId>, branch_id: Option<BranchId>) -> Self {
        Self {
            organisation_id: organisation_id.into(),
            branch_id,
        }
    }

    pub fn organisation(organisation_id: impl Into<OrganisationId>) -> Self {
        Self::new(organisation_id, None)
    }

    pub fn with_branch(mut self, branch_id: impl Into<BranchId>) -> Self {
        self.branch_id = Some(branch_id.into());
        self
    }

    /// Same organisation, regardless of branch.
    pub fn same_tenant(&self, other: &TenantScope) -> bool {
        self.organisation_id == other.organisation_id
    }
}

impl fmt::Display for TenantScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.branch_id {
            Some(branch) => write!(f, "{}/{}", self.organisation_id, branch),
            None => write!(f, "{}", self.organisation_id),
        }
    }
}

/// Branch chosen by navigation (e.g. `/org/:org/branch/:branch`).
///
/// It carries its organisation so that cross-tenant selections can be
/// detected instead of silently re-parented.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchSelection {
    pub organisation_id: OrganisationId,
    pub branch_id: BranchId,
}

impl BranchSelection {
    pub fn new(organisation_id: impl Into<OrganisationId>, branch_id: impl Into<BranchId>) -> Self {
        Self {
            organisation_id: organisation_id.into(),
            branch_id: branch_id.into(),
        }
    }
}

impl fmt::Display for BranchSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.organisation_id, self.branch_id)
    }
}

/// Variable name the organisation is injected under.
pub const ORGANISATION_VARIABLE: &str = "organisationId";

/// Variable name the branch is injected under.
pub const BRANCH_VARIABLE: &str = "branchId";

impl TenantScope {
    /// Inject this scope into a variables object.
    ///
    /// Caller-supplied scope variables must agree with the scope; a
    /// disagreeing value is rejected, never overwritten.
    pub fn inject(&self, mut variables: Variables) -> FoldResult<Variables> {
        check_scope_variable(
            &variables,
            ORGANISATION_VARIABLE,
            Some(self.organisation_id.as_str()),
            self,
        )?;
        check_scope_variable(
            &variables,
            BRANCH_VARIABLE,
            self.branch_id.as_ref().map(BranchId::as_str),
            self,
        )?;

        variables.insert(
            ORGANISATION_VARIABLE.to_string(),
            Value::String(self.organisation_id.0.clone()),
        );
        let branch = match &self.branch_id {
            Some(branch) => Value::String(branch.0.clone()),
            None => Value::Null,
        };
        variables.insert(BRANCH_VARIABLE.to_string(), branch);
        Ok(variables)
    }
}

fn check_scope_variable(
    variables: &Variables,
    name: &str,
    expected: Option<&str>,
    scope: &TenantScope,
) -> FoldResult<()> {
    match (variables.get(name), expected) {
        (None, _) | (Some(Value::Null), _) => Ok(()),
        (Some(Value::String(given)), Some(expected)) if given == expected => Ok(()),
        (Some(given), _) => Err(FoldError::scope_mismatch(
            format!("{name}={given}"),
            scope.to_string(),
        )),
    }
}
