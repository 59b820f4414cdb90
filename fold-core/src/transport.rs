//! Boundary with the remote data service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{FoldError, FoldResult, RemoteErrorItem};
use crate::operation::{OperationKind, Variables};

/// `extensions.code` the service uses for a rejected credential.
pub const UNAUTHENTICATED: &str = "UNAUTHENTICATED";

/// One outgoing operation, already scoped.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRequest {
    pub operation_name: String,
    #[serde(skip)]
    pub kind: OperationKind,
    #[serde(rename = "query")]
    pub document: String,
    pub variables: Variables,
    /// Bearer credential; sent as a header, never in the body.
    #[serde(skip)]
    pub credential: String,
}

/// `{data}` or `{errors: [...]}` (possibly both).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteResponse {
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<RemoteErrorItem>,
}

impl RemoteResponse {
    pub fn data(data: Value) -> Self {
        Self {
            data: Some(data),
            errors: Vec::new(),
        }
    }

    pub fn errors(errors: Vec<RemoteErrorItem>) -> Self {
        Self { data: None, errors }
    }

    /// Classify the response.
    ///
    /// An `UNAUTHENTICATED` error wins over everything else. Data that comes
    /// with errors is only accepted when `allow_partial` is set.
    pub fn into_result(self, allow_partial: bool) -> FoldResult<Value> {
        if self.errors.is_empty() {
            return Ok(self.data.unwrap_or(Value::Null));
        }

        if let Some(expired) = self.errors.iter().find(|e| e.code() == Some(UNAUTHENTICATED)) {
            return Err(FoldError::auth_expired(expired.message.clone()));
        }

        match self.data {
            Some(data) if allow_partial && !data.is_null() => Ok(data),
            _ => Err(FoldError::remote(self.errors)),
        }
    }
}

/// Sends operations to the remote service.
///
/// Implementations report a rejected credential (e.g. HTTP 401) as
/// `FoldError::AuthExpired` and transport failures as `FoldError::Network`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: RemoteRequest) -> FoldResult<RemoteResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_data_is_success() {
        let res = RemoteResponse::data(json!({ "funds": [] }));
        assert_eq!(res.into_result(false).unwrap(), json!({ "funds": [] }));
    }

    #[test]
    fn unauthenticated_code_is_auth_expired() {
        let res = RemoteResponse::errors(vec![
            RemoteErrorItem::new("boom"),
            RemoteErrorItem::new("jwt expired").with_code(UNAUTHENTICATED),
        ]);
        assert_eq!(
            res.into_result(true).unwrap_err(),
            FoldError::auth_expired("jwt expired")
        );
    }

    #[test]
    fn partial_data_needs_opt_in() {
        let res = RemoteResponse {
            data: Some(json!({ "funds": [{ "id": "f-1" }] })),
            errors: vec![RemoteErrorItem::new("balance unavailable")],
        };
        assert!(matches!(
            res.clone().into_result(false),
            Err(FoldError::Remote { .. })
        ));
        assert!(res.into_result(true).is_ok());
    }

    #[test]
    fn request_serializes_as_wire_body() {
        let mut variables = Variables::new();
        variables.insert("organisationId".into(), json!("org-1"));
        let req = RemoteRequest {
            operation_name: "GetFunds".into(),
            kind: OperationKind::Query,
            document: "query GetFunds { funds { id } }".into(),
            variables,
            credential: "secret".into(),
        };

        let body = serde_json::to_value(&req).unwrap();
        assert_eq!(body["operationName"], "GetFunds");
        assert_eq!(body["query"], "query GetFunds { funds { id } }");
        assert_eq!(body["variables"]["organisationId"], "org-1");
        assert!(body.get("credential").is_none());
    }
}
