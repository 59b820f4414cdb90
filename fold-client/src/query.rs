//! Read operations: scope, cache policy, dedup, retry.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use fold_core::{
    CacheStore, FetchPolicy, FoldError, FoldResult, OperationDescriptor, QueryOptions, RequestKey,
    RequestKeyer, RequestState, Variables,
};
use futures::{FutureExt, Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::dispatch::{Call, Dispatcher};
use crate::inflight::{InflightRegistry, SharedFetch, SubscriptionId};

pub type QueryState = RequestState<Arc<Value>>;

/// States emitted for one query call.
///
/// Dropping the stream stops its emissions and leaves the dedup group; the
/// network call keeps running for anyone else attached.
pub struct QueryStream {
    id: SubscriptionId,
    inner: Pin<Box<dyn Stream<Item = QueryState> + Send>>,
}

impl QueryStream {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Drive the stream to its last state.
    pub async fn last(self) -> QueryState {
        self.fold(QueryState::idle(), |_, state| async move { state })
            .await
    }

    /// Decode every emitted state into `T`.
    pub fn decode<T>(self) -> impl Stream<Item = RequestState<T>> + Send
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.map(decode_state::<T>)
    }
}

impl Stream for QueryStream {
    type Item = QueryState;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

pub(crate) fn decode_state<T: DeserializeOwned>(state: QueryState) -> RequestState<T> {
    let RequestState {
        status,
        data,
        error,
    } = state;
    match data.map(|value| serde_json::from_value::<T>((*value).clone())) {
        None => RequestState {
            status,
            data: None,
            error,
        },
        Some(Ok(data)) => RequestState {
            status,
            data: Some(data),
            error,
        },
        Some(Err(e)) => RequestState::error(FoldError::decode(e.to_string())),
    }
}

/// Leaves the dedup group when the owning stream is dropped.
struct ListenerGuard {
    registry: Arc<InflightRegistry>,
    key: RequestKey,
    id: SubscriptionId,
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        if self.registry.detach(&self.key, self.id) {
            debug!(key = %self.key, "subscription detached");
        }
    }
}

#[derive(Clone)]
pub struct QueryExecutor {
    dispatcher: Dispatcher,
    cache: Arc<CacheStore>,
    inflight: Arc<InflightRegistry>,
    keyer: RequestKeyer,
    default_policy: FetchPolicy,
}

impl QueryExecutor {
    pub(crate) fn new(
        dispatcher: Dispatcher,
        cache: Arc<CacheStore>,
        inflight: Arc<InflightRegistry>,
        default_policy: FetchPolicy,
    ) -> Self {
        Self {
            dispatcher,
            cache,
            inflight,
            keyer: RequestKeyer::new(),
            default_policy,
        }
    }

    pub fn default_policy(&self) -> FetchPolicy {
        self.default_policy
    }

    /// Run a query and observe its states.
    ///
    /// Emission sequences:
    /// - scope or variable failure: `Error`
    /// - cache-first hit: `Success`
    /// - cache-and-network hit: `Success` (cached), then `Success` or `Error`
    ///   (the latter still carrying the cached data)
    /// - otherwise: `Loading`, then `Success` or `Error`
    pub fn execute(
        &self,
        descriptor: &OperationDescriptor,
        variables: Variables,
        options: QueryOptions,
    ) -> QueryStream {
        let id = SubscriptionId::next();
        let this = self.clone();
        let descriptor = Arc::new(descriptor.clone());

        let inner = async_stream::stream! {
            if let Err(e) = descriptor.check_variables(&variables) {
                yield QueryState::error(e);
                return;
            }
            let scope = match this.dispatcher.resolve_scope() {
                Ok(scope) => scope,
                Err(e) => {
                    debug!(operation = %descriptor.name, "query not dispatched: {}", e);
                    yield QueryState::error(e);
                    return;
                }
            };

            let key = this.keyer.compute_key(&descriptor, &variables, &scope);
            let policy = options.policy.unwrap_or(this.default_policy);
            let cached = if policy.reads_cache() { this.cache.get(&key) } else { None };

            let mut shown = None;
            match (policy, cached) {
                (FetchPolicy::CacheFirst, Some(entry)) => {
                    debug!(key = %key, "cache hit");
                    yield QueryState::success(entry.data);
                    return;
                }
                (FetchPolicy::CacheAndNetwork, Some(entry)) => {
                    shown = Some(entry.data.clone());
                    yield QueryState::success(entry.data);
                }
                _ => yield QueryState::loading(),
            }

            let call = Call {
                descriptor: descriptor.clone(),
                variables,
                scope,
                timeout: options.timeout,
                allow_partial: options.allow_partial,
            };
            let fetch = this.attach(&key, id, call);
            let _guard = ListenerGuard {
                registry: this.inflight.clone(),
                key,
                id,
            };

            match fetch.await {
                Ok(data) => yield QueryState::success(data),
                Err(e) => yield QueryState::error(e).with_data(shown),
            }
        };

        QueryStream {
            id,
            inner: Box::pin(inner),
        }
    }

    /// Run a query and decode its final state into `T`.
    pub async fn fetch<T>(
        &self,
        descriptor: &OperationDescriptor,
        variables: Variables,
        options: QueryOptions,
    ) -> FoldResult<T>
    where
        T: DeserializeOwned,
    {
        let state = self.execute(descriptor, variables, options).last().await;
        let decoded: RequestState<T> = decode_state(state);
        match (decoded.error, decoded.data) {
            (Some(e), _) => Err(e),
            (None, Some(data)) => Ok(data),
            (None, None) => Err(FoldError::decode("query produced no data")),
        }
    }

    /// Cached data for a query under the current scope, without dispatch.
    pub fn peek(
        &self,
        descriptor: &OperationDescriptor,
        variables: &Variables,
    ) -> FoldResult<Option<Arc<Value>>> {
        let scope = self.dispatcher.resolve_scope()?;
        let key = self.keyer.compute_key(descriptor, variables, &scope);
        Ok(self.cache.get(&key).map(|entry| entry.data))
    }

    fn attach(&self, key: &RequestKey, id: SubscriptionId, call: Call) -> SharedFetch {
        let (fetch, joined) = self.inflight.attach_or_start(key, id, |generation| {
            let worker = self.clone();
            let key = key.clone();
            let task = tokio::spawn(async move { worker.fetch_and_store(call, key, generation).await });
            async move {
                task.await
                    .map_err(|e| FoldError::network(format!("query task failed: {e}")))?
            }
            .boxed()
            .shared()
        });
        if !joined {
            debug!(key = %key, "query dispatched");
        }
        fetch
    }

    async fn fetch_and_store(&self, call: Call, key: RequestKey, generation: u64) -> FoldResult<Arc<Value>> {
        let result = self.dispatcher.dispatch(&call).await.map(Arc::new);

        let current = self.inflight.complete_with(&key, generation, |written| {
            if let Ok(data) = &result {
                let tags = call.descriptor.derive_tags(data);
                if tags.is_disjoint(written) {
                    self.cache.put(key.clone(), data.clone(), tags, call.scope.clone());
                } else {
                    debug!(key = %key, "result predates a mutation; not cached");
                }
            }
        });
        if !current {
            debug!(key = %key, "result superseded; not cached");
        }
        result
    }
}
