//! `FoldClient`: one isolated set of session, cache and executors.

use std::sync::Arc;

use fold_auth::{
    AuthOptions, AuthStrategy, Credentials, ListenerId, Navigation, Session, SessionEvent,
    SessionEventHub, SessionLifecycle, SessionListener, SessionStore, TenantScopeResolver,
    TokenInspector,
};
use fold_core::{
    BranchSelection, CacheStore, ClientOptions, ConfigError, FoldConfig, FoldResult,
    MutationOptions, OperationDescriptor, QueryOptions, TenantScope, Transport, Variables,
};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::binding::{MutationBinding, QueryBinding};
use crate::dispatch::Dispatcher;
use crate::inflight::InflightRegistry;
use crate::mutation::{MutationExecutor, MutationState};
use crate::query::{QueryExecutor, QueryStream};

struct FoldClientInner {
    options: ClientOptions,
    lifecycle: SessionLifecycle,
    resolver: TenantScopeResolver,
    cache: Arc<CacheStore>,
    inflight: Arc<InflightRegistry>,
    queries: QueryExecutor,
    mutations: MutationExecutor,
    purge_listener: ListenerId,
}

impl Drop for FoldClientInner {
    fn drop(&mut self) {
        self.lifecycle.unsubscribe(self.purge_listener);
    }
}

/// Central container for the data-access layer.
///
/// Every builder call wires its own session store, cache and in-flight
/// registry; nothing is global. Cloning is cheap and shares the instance.
#[derive(Clone)]
pub struct FoldClient {
    inner: Arc<FoldClientInner>,
}

impl FoldClient {
    pub fn builder() -> FoldClientBuilder {
        FoldClientBuilder::new()
    }

    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    // ---- session ----

    pub async fn login(&self, credentials: &Credentials) -> FoldResult<Session> {
        self.inner.lifecycle.login(credentials).await
    }

    pub async fn refresh(&self) -> FoldResult<Session> {
        self.inner.lifecycle.refresh().await
    }

    pub async fn logout(&self) {
        self.inner.lifecycle.logout().await
    }

    pub fn switch_tenant(&self, scope: TenantScope) -> FoldResult<Session> {
        self.inner.lifecycle.switch_tenant(scope)
    }

    pub fn session(&self) -> Option<Session> {
        self.inner.lifecycle.current()
    }

    pub fn lifecycle(&self) -> &SessionLifecycle {
        &self.inner.lifecycle
    }

    pub fn events(&self) -> &Arc<SessionEventHub> {
        self.inner.lifecycle.events()
    }

    // ---- scope ----

    pub fn select_branch(&self, selection: BranchSelection) {
        self.inner.resolver.navigation().select(selection);
    }

    pub fn clear_branch_selection(&self) {
        self.inner.resolver.navigation().clear();
    }

    pub fn scope(&self) -> FoldResult<TenantScope> {
        self.inner.resolver.resolve()
    }

    // ---- operations ----

    pub fn queries(&self) -> &QueryExecutor {
        &self.inner.queries
    }

    pub fn mutations(&self) -> &MutationExecutor {
        &self.inner.mutations
    }

    pub fn query(
        &self,
        descriptor: &OperationDescriptor,
        variables: Variables,
        options: QueryOptions,
    ) -> QueryStream {
        self.inner.queries.execute(descriptor, variables, options)
    }

    pub async fn fetch<T: DeserializeOwned>(
        &self,
        descriptor: &OperationDescriptor,
        variables: Variables,
        options: QueryOptions,
    ) -> FoldResult<T> {
        self.inner.queries.fetch(descriptor, variables, options).await
    }

    pub async fn mutate(
        &self,
        descriptor: &OperationDescriptor,
        variables: Variables,
        options: MutationOptions,
    ) -> MutationState {
        self.inner.mutations.execute(descriptor, variables, options).await
    }

    pub async fn mutate_as<T: DeserializeOwned>(
        &self,
        descriptor: &OperationDescriptor,
        variables: Variables,
        options: MutationOptions,
    ) -> FoldResult<T> {
        self.inner
            .mutations
            .execute_as(descriptor, variables, options)
            .await
    }

    // ---- UI bindings ----

    /// Reactive query state that starts fetching immediately.
    ///
    /// Stays `Idle` without dispatching while a required variable is missing.
    pub fn use_query(
        &self,
        descriptor: &OperationDescriptor,
        variables: Variables,
        options: QueryOptions,
    ) -> QueryBinding {
        QueryBinding::new(self.inner.queries.clone(), descriptor, variables, options)
    }

    pub fn use_mutation(
        &self,
        descriptor: &OperationDescriptor,
        options: MutationOptions,
    ) -> MutationBinding {
        MutationBinding::new(self.inner.mutations.clone(), descriptor, options)
    }

    // ---- diagnostics ----

    pub fn cached_entries(&self) -> usize {
        self.inner.cache.len()
    }

    pub fn inflight_requests(&self) -> usize {
        self.inner.inflight.len()
    }
}

/// Keeps cache, in-flight calls and navigation consistent with the session.
fn purge_on_session_change(
    cache: Arc<CacheStore>,
    inflight: Arc<InflightRegistry>,
    navigation: Navigation,
) -> SessionListener {
    Arc::new(move |event: &SessionEvent| match event {
        SessionEvent::LoggedIn { .. } | SessionEvent::LoggedOut { .. } => {
            inflight.clear();
            cache.purge_all();
            navigation.clear();
        }
        SessionEvent::TenantSwitched { from, to, .. } => {
            inflight.clear();
            let removed = cache.purge_organisation(&from.organisation_id);
            navigation.clear();
            debug!(%from, %to, removed, "cache purged for tenant switch");
        }
        SessionEvent::Refreshed { .. } => {}
    })
}

pub struct FoldClientBuilder {
    options: ClientOptions,
    auth_options: AuthOptions,
    transport: Option<Arc<dyn Transport>>,
    strategy: Option<Arc<dyn AuthStrategy>>,
    inspector: Option<Box<dyn TokenInspector>>,
}

impl Default for FoldClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FoldClientBuilder {
    pub fn new() -> Self {
        Self {
            options: ClientOptions::default(),
            auth_options: AuthOptions::default(),
            transport: None,
            strategy: None,
            inspector: None,
        }
    }

    pub fn options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    pub fn auth_options(mut self, options: AuthOptions) -> Self {
        self.auth_options = options;
        self
    }

    /// Read client and auth options from a config store.
    pub fn config(mut self, config: &FoldConfig) -> Result<Self, ConfigError> {
        let snapshot = config.snapshot();
        self.options = ClientOptions::from_snapshot(&snapshot)?;
        self.auth_options = AuthOptions::from_snapshot(&snapshot)?;
        Ok(self)
    }

    pub fn transport<T: Transport + 'static>(self, transport: T) -> Self {
        self.shared_transport(Arc::new(transport))
    }

    pub fn shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn auth_strategy<S: AuthStrategy + 'static>(self, strategy: S) -> Self {
        self.shared_auth_strategy(Arc::new(strategy))
    }

    pub fn shared_auth_strategy(mut self, strategy: Arc<dyn AuthStrategy>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn token_inspector(mut self, inspector: Box<dyn TokenInspector>) -> Self {
        self.inspector = Some(inspector);
        self
    }

    pub fn build(self) -> Result<FoldClient, ConfigError> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => default_transport(&self.options)?,
        };
        let strategy = self
            .strategy
            .ok_or_else(|| ConfigError::Missing("auth strategy".to_string()))?;

        let store = SessionStore::new();
        let lifecycle = match self.inspector {
            Some(inspector) => {
                SessionLifecycle::with_inspector(store.clone(), strategy, self.auth_options, inspector)
            }
            None => SessionLifecycle::new(store.clone(), strategy, self.auth_options),
        };
        let navigation = Navigation::new();
        let resolver = TenantScopeResolver::new(store, navigation.clone());

        let cache = Arc::new(CacheStore::with_limits(self.options.cache_limits()));
        let inflight = Arc::new(InflightRegistry::new());
        let purge_listener = lifecycle.subscribe(purge_on_session_change(
            cache.clone(),
            inflight.clone(),
            navigation,
        ));

        let dispatcher = Dispatcher::new(
            transport,
            resolver.clone(),
            lifecycle.clone(),
            self.options.refresh_retry,
            self.options.request_timeout,
        );
        let queries = QueryExecutor::new(
            dispatcher.clone(),
            cache.clone(),
            inflight.clone(),
            self.options.default_policy,
        );
        let mutations = MutationExecutor::new(dispatcher, cache.clone(), inflight.clone());

        Ok(FoldClient {
            inner: Arc::new(FoldClientInner {
                options: self.options,
                lifecycle,
                resolver,
                cache,
                inflight,
                queries,
                mutations,
                purge_listener,
            }),
        })
    }
}

#[cfg(feature = "http")]
fn default_transport(options: &ClientOptions) -> Result<Arc<dyn Transport>, ConfigError> {
    let endpoint = options
        .endpoint
        .clone()
        .ok_or_else(|| ConfigError::Missing(fold_core::config::ENDPOINT_URL.to_string()))?;
    Ok(Arc::new(crate::http::HttpTransport::new(endpoint)))
}

#[cfg(not(feature = "http"))]
fn default_transport(_options: &ClientOptions) -> Result<Arc<dyn Transport>, ConfigError> {
    Err(ConfigError::Missing("transport".to_string()))
}
