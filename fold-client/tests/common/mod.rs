#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use fold_client::fold_auth::{
    AuthGrant, AuthOptions, AuthStrategy, Credentials, OpaqueTokenInspector, Session,
};
use fold_client::FoldClient;
use fold_core::{
    BranchId, ClientOptions, FetchPolicy, FoldError, FoldResult, OperationDescriptor,
    RemoteErrorItem, RemoteRequest, RemoteResponse, TenantScope, Transport, Variables,
    UNAUTHENTICATED,
};

/// Remote service double.
///
/// Replies come from a per-operation queue first, then from a fixed
/// per-operation response. Any request carrying an expired credential is
/// rejected with `UNAUTHENTICATED`.
#[derive(Default)]
pub struct MockTransport {
    scripted: Mutex<HashMap<String, VecDeque<FoldResult<RemoteResponse>>>>,
    fixed: Mutex<HashMap<String, Value>>,
    expired: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
    delays: Mutex<HashMap<String, Duration>>,
    requests: Mutex<Vec<RemoteRequest>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, operation: &str, data: Value) {
        self.fixed.lock().insert(operation.to_string(), data);
    }

    pub fn script(&self, operation: &str, reply: FoldResult<RemoteResponse>) {
        self.scripted
            .lock()
            .entry(operation.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn expire_token(&self, token: &str) {
        self.expired.lock().insert(token.to_string());
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Delay replies to one operation only; overrides `set_delay`.
    pub fn delay_operation(&self, operation: &str, delay: Duration) {
        self.delays.lock().insert(operation.to_string(), delay);
    }

    pub fn calls(&self, operation: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.operation_name == operation)
            .count()
    }

    pub fn requests(&self) -> Vec<RemoteRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: RemoteRequest) -> FoldResult<RemoteResponse> {
        self.requests.lock().push(request.clone());

        let delay = self
            .delays
            .lock()
            .get(&request.operation_name)
            .copied()
            .or(*self.delay.lock());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.expired.lock().contains(&request.credential) {
            return Ok(RemoteResponse::errors(vec![
                RemoteErrorItem::new("jwt expired").with_code(UNAUTHENTICATED)
            ]));
        }

        let next = self
            .scripted
            .lock()
            .get_mut(&request.operation_name)
            .and_then(VecDeque::pop_front);
        if let Some(reply) = next {
            return reply;
        }

        match self.fixed.lock().get(&request.operation_name) {
            Some(data) => Ok(RemoteResponse::data(data.clone())),
            None => Err(FoldError::network(format!(
                "no reply for {}",
                request.operation_name
            ))),
        }
    }
}

/// Auth service double: login always grants `token-0` for `org-1/br-1`,
/// refreshes hand out the scripted grants in order.
#[derive(Default)]
pub struct ScriptedAuth {
    refreshes: Mutex<VecDeque<FoldResult<AuthGrant>>>,
    refresh_calls: AtomicUsize,
}

impl ScriptedAuth {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn refresh_to(&self, token: &str) {
        self.refreshes.lock().push_back(Ok(AuthGrant {
            credential_token: token.to_string(),
            ..Default::default()
        }));
    }

    pub fn refresh_fails(&self) {
        self.refreshes
            .lock()
            .push_back(Err(FoldError::auth("refresh token revoked")));
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthStrategy for ScriptedAuth {
    async fn login(&self, credentials: &Credentials) -> Result<AuthGrant> {
        let user = credentials.field("identifier").unwrap_or("ada").to_string();
        Ok(AuthGrant {
            user_id: Some(user.clone()),
            display_name: Some(user),
            credential_token: "token-0".to_string(),
            refresh_token: Some("refresh-0".to_string()),
            expires_at: None,
            tenant: Some(TenantScope::organisation("org-1").with_branch("br-1")),
            accessible_branches: Some(vec![BranchId::from("br-1"), BranchId::from("br-2")]),
        })
    }

    async fn refresh(&self, _session: &Session) -> Result<AuthGrant> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.refreshes.lock().pop_front();
        match next {
            Some(Ok(grant)) => Ok(grant),
            Some(Err(e)) => Err(e.into()),
            None => Err(anyhow::anyhow!("refresh script exhausted")),
        }
    }
}

pub fn create_test_options() -> ClientOptions {
    ClientOptions {
        endpoint: None,
        default_policy: FetchPolicy::CacheFirst,
        refresh_retry: true,
        request_timeout: Some(Duration::from_secs(5)),
        cache_ttl: None,
        cache_max_entries: None,
    }
}

pub fn create_client(
    transport: Arc<MockTransport>,
    auth: Arc<ScriptedAuth>,
    options: ClientOptions,
) -> FoldClient {
    FoldClient::builder()
        .options(options)
        .auth_options(AuthOptions::default())
        .shared_transport(transport)
        .shared_auth_strategy(auth)
        .token_inspector(Box::new(OpaqueTokenInspector))
        .build()
        .expect("client builds")
}

pub async fn logged_in_client(transport: Arc<MockTransport>, auth: Arc<ScriptedAuth>) -> FoldClient {
    let client = create_client(transport, auth, create_test_options());
    client
        .login(&Credentials::password("ada", "secret"))
        .await
        .expect("login succeeds");
    client
}

pub fn funds_query() -> OperationDescriptor {
    OperationDescriptor::query(
        "GetFunds",
        "query GetFunds($organisationId: ID!, $branchId: ID) { funds { id name } }",
    )
    .tag("funds", "Fund")
}

pub fn fund_query() -> OperationDescriptor {
    OperationDescriptor::query(
        "GetFund",
        "query GetFund($organisationId: ID!, $fundId: ID!) { fund(id: $fundId) { id name } }",
    )
    .require("fundId")
    .tag("fund", "Fund")
}

pub fn members_query() -> OperationDescriptor {
    OperationDescriptor::query(
        "GetMembers",
        "query GetMembers($organisationId: ID!, $branchId: ID) { members { id name } }",
    )
    .tag("members", "Member")
}

pub fn create_fund() -> OperationDescriptor {
    OperationDescriptor::mutation(
        "CreateFund",
        "mutation CreateFund($organisationId: ID!, $name: String!) { createFund(name: $name) { id } }",
    )
    .require("name")
    .writes("Fund")
}

pub fn funds_data() -> Value {
    json!({ "funds": [{ "id": "f-1", "name": "General" }] })
}

pub fn vars(value: Value) -> Variables {
    value.as_object().cloned().unwrap_or_default()
}
