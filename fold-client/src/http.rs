//! Default HTTP transport.

use async_trait::async_trait;
use fold_core::{FoldError, FoldResult, RemoteRequest, RemoteResponse, Transport};
use reqwest::StatusCode;
use tracing::debug;

/// POSTs `{operationName, query, variables}` as JSON with a bearer token.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), endpoint)
    }

    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn transport_error(e: reqwest::Error) -> FoldError {
    if e.is_timeout() {
        FoldError::timeout(e.to_string())
    } else {
        FoldError::network(e.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: RemoteRequest) -> FoldResult<RemoteResponse> {
        debug!(operation = %request.operation_name, endpoint = %self.endpoint, "POST");
        let mut builder = self.client.post(&self.endpoint).json(&request);
        if !request.credential.is_empty() {
            builder = builder.bearer_auth(&request.credential);
        }
        let response = builder
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(FoldError::auth_expired(format!(
                "{} rejected the credential",
                self.endpoint
            )));
        }
        if !status.is_success() {
            return Err(FoldError::network(format!(
                "{} responded with {}",
                self.endpoint, status
            )));
        }

        response
            .json::<RemoteResponse>()
            .await
            .map_err(|e| FoldError::decode(e.to_string()))
    }
}
