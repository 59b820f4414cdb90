//! Write operations: one network call, then tag invalidation.

use std::sync::Arc;

use fold_core::{
    CacheStore, FoldError, FoldResult, MutationOptions, OperationDescriptor, RequestState,
    Variables,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};

use crate::dispatch::{Call, Dispatcher};
use crate::inflight::InflightRegistry;

pub type MutationState = RequestState<Arc<Value>>;

#[derive(Clone)]
pub struct MutationExecutor {
    dispatcher: Dispatcher,
    cache: Arc<CacheStore>,
    inflight: Arc<InflightRegistry>,
}

impl MutationExecutor {
    pub(crate) fn new(
        dispatcher: Dispatcher,
        cache: Arc<CacheStore>,
        inflight: Arc<InflightRegistry>,
    ) -> Self {
        Self {
            dispatcher,
            cache,
            inflight,
        }
    }

    /// Run a mutation once. Never deduplicated.
    ///
    /// On success every tag the descriptor writes, plus tags found in the
    /// response, is invalidated before this returns. Queries still in flight
    /// keep deduplicating but do not cache a result carrying those tags.
    /// Failures leave the cache untouched.
    pub async fn execute(
        &self,
        descriptor: &OperationDescriptor,
        variables: Variables,
        options: MutationOptions,
    ) -> MutationState {
        match self.run(descriptor, variables, options).await {
            Ok(data) => MutationState::success(data),
            Err(e) => MutationState::error(e),
        }
    }

    /// Run a mutation and decode its response into `T`.
    pub async fn execute_as<T>(
        &self,
        descriptor: &OperationDescriptor,
        variables: Variables,
        options: MutationOptions,
    ) -> FoldResult<T>
    where
        T: DeserializeOwned,
    {
        let data = self.run(descriptor, variables, options).await?;
        serde_json::from_value((*data).clone()).map_err(|e| FoldError::decode(e.to_string()))
    }

    async fn run(
        &self,
        descriptor: &OperationDescriptor,
        variables: Variables,
        options: MutationOptions,
    ) -> FoldResult<Arc<Value>> {
        descriptor.check_variables(&variables)?;
        let scope = self.dispatcher.resolve_scope()?;

        let call = Call {
            descriptor: Arc::new(descriptor.clone()),
            variables,
            scope,
            timeout: options.timeout,
            allow_partial: options.allow_partial,
        };
        let data = self.dispatcher.dispatch(&call).await?;

        let tags = descriptor.written_tags(&data);
        self.inflight.mark_written(&tags);
        let removed: usize = tags.iter().map(|tag| self.cache.invalidate_by_tag(tag)).sum();
        if removed > 0 {
            info!(operation = %descriptor.name, removed, "mutation invalidated cached queries");
        } else {
            debug!(operation = %descriptor.name, tags = tags.len(), "mutation invalidated nothing");
        }
        Ok(Arc::new(data))
    }
}
