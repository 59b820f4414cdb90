//! Auth exchange over the same transport as data operations.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use fold_auth::{AuthGrant, AuthStrategy, Credentials, Session};
use fold_core::{FoldError, OperationDescriptor, RemoteRequest, Transport, Variables};
use serde_json::Value;

/// Runs login/refresh/revoke as unscoped operations against the service.
///
/// Each response is read as an [`AuthGrant`], either at the top of `data`
/// or under the field named by `with_field` (e.g. `"login"`).
pub struct OperationAuthStrategy {
    transport: Arc<dyn Transport>,
    login: OperationDescriptor,
    refresh: OperationDescriptor,
    revoke: Option<OperationDescriptor>,
    field: Option<String>,
}

impl OperationAuthStrategy {
    pub fn new(
        transport: Arc<dyn Transport>,
        login: OperationDescriptor,
        refresh: OperationDescriptor,
    ) -> Self {
        Self {
            transport,
            login,
            refresh,
            revoke: None,
            field: None,
        }
    }

    pub fn with_revoke(mut self, revoke: OperationDescriptor) -> Self {
        self.revoke = Some(revoke);
        self
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    async fn run(
        &self,
        descriptor: &OperationDescriptor,
        variables: Variables,
        credential: String,
    ) -> Result<Value, FoldError> {
        let request = RemoteRequest {
            operation_name: descriptor.name.clone(),
            kind: descriptor.kind,
            document: descriptor.document.clone(),
            variables,
            credential,
        };
        self.transport.send(request).await?.into_result(false)
    }

    fn grant_from(&self, data: Value) -> Result<AuthGrant, FoldError> {
        let grant = match &self.field {
            Some(field) => data.get(field).cloned().unwrap_or(Value::Null),
            None => data,
        };
        serde_json::from_value(grant).map_err(|e| FoldError::decode(format!("auth grant: {e}")))
    }
}

/// A rejected exchange is an authentication failure, not a data error.
fn rejected(err: FoldError) -> FoldError {
    match err {
        FoldError::Remote { .. } | FoldError::AuthExpired(_) => FoldError::auth(err.to_string()),
        other => other,
    }
}

#[async_trait]
impl AuthStrategy for OperationAuthStrategy {
    async fn login(&self, credentials: &Credentials) -> Result<AuthGrant> {
        let data = self
            .run(&self.login, credentials.data.clone(), String::new())
            .await
            .map_err(rejected)?;
        Ok(self.grant_from(data)?)
    }

    async fn refresh(&self, session: &Session) -> Result<AuthGrant> {
        let Some(refresh_token) = session.refresh_token.clone() else {
            fold_core::bail_fold!(auth, "session has no refresh token");
        };
        let mut variables = Variables::new();
        variables.insert("refreshToken".to_string(), Value::String(refresh_token));

        let data = self
            .run(&self.refresh, variables, session.credential_token.clone())
            .await
            .map_err(rejected)?;
        Ok(self.grant_from(data)?)
    }

    async fn revoke(&self, session: &Session) -> Result<()> {
        let Some(revoke) = &self.revoke else {
            return Ok(());
        };
        self.run(revoke, Variables::new(), session.credential_token.clone())
            .await?;
        Ok(())
    }
}
