use std::sync::Arc;

use fold_core::{FetchPolicy, FoldError, OperationDescriptor, QueryOptions, RequestStatus, Variables};
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::query::{QueryExecutor, QueryState};

/// `use_query`: state plus `refetch()`.
///
/// Dropping the binding stops its driver task, which drops the underlying
/// subscription.
pub struct QueryBinding {
    executor: QueryExecutor,
    descriptor: Arc<OperationDescriptor>,
    variables: Variables,
    options: QueryOptions,
    state: Arc<watch::Sender<QueryState>>,
    receiver: watch::Receiver<QueryState>,
    driver: Mutex<Option<JoinHandle<()>>>,
    skipped: bool,
}

impl QueryBinding {
    pub(crate) fn new(
        executor: QueryExecutor,
        descriptor: &OperationDescriptor,
        variables: Variables,
        options: QueryOptions,
    ) -> Self {
        let (tx, receiver) = watch::channel(QueryState::idle());
        let missing = descriptor.variables.missing(&variables);
        let binding = Self {
            executor,
            descriptor: Arc::new(descriptor.clone()),
            variables,
            options,
            state: Arc::new(tx),
            receiver,
            driver: Mutex::new(None),
            skipped: !missing.is_empty(),
        };

        if binding.skipped {
            debug!(operation = %descriptor.name, ?missing, "query skipped");
        } else {
            binding.start(binding.options);
        }
        binding
    }

    pub fn state(&self) -> QueryState {
        self.receiver.borrow().clone()
    }

    pub fn data(&self) -> Option<Arc<Value>> {
        self.receiver.borrow().data.clone()
    }

    pub fn loading(&self) -> bool {
        self.receiver.borrow().is_loading()
    }

    pub fn error(&self) -> Option<FoldError> {
        self.receiver.borrow().error.clone()
    }

    /// Not dispatched because a required variable is missing.
    pub fn is_skipped(&self) -> bool {
        self.skipped
    }

    pub fn subscribe(&self) -> watch::Receiver<QueryState> {
        self.receiver.clone()
    }

    /// Re-run the query from the network, bypassing the cache.
    pub fn refetch(&self) {
        if self.skipped {
            return;
        }
        self.start(self.options.policy(FetchPolicy::NetworkOnly));
    }

    /// Wait for the current run to finish.
    pub async fn settled(&self) -> QueryState {
        let mut rx = self.receiver.clone();
        loop {
            {
                let state = rx.borrow_and_update();
                if self.skipped || state.is_terminal() {
                    return state.clone();
                }
            }
            if rx.changed().await.is_err() {
                return rx.borrow().clone();
            }
        }
    }

    fn start(&self, options: QueryOptions) {
        if let Some(previous) = self.driver.lock().take() {
            previous.abort();
        }

        // Enter Loading synchronously so `settled` never sees the previous run.
        self.state.send_modify(|state| {
            let data = state.data.take();
            *state = QueryState::loading().with_data(data);
        });

        let mut stream = self
            .executor
            .execute(&self.descriptor, self.variables.clone(), options);
        let tx = self.state.clone();
        let task = tokio::spawn(async move {
            while let Some(next) = stream.next().await {
                tx.send_modify(|state| {
                    let previous = state.data.take();
                    *state = match next.status {
                        // Keep showing what we had while loading or failing.
                        RequestStatus::Loading | RequestStatus::Error if next.data.is_none() => {
                            next.with_data(previous)
                        }
                        _ => next,
                    };
                });
            }
        });

        *self.driver.lock() = Some(task);
    }
}

impl Drop for QueryBinding {
    fn drop(&mut self) {
        if let Some(task) = self.driver.lock().take() {
            task.abort();
        }
    }
}
