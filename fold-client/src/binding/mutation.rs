use std::sync::Arc;

use fold_core::{FoldError, MutationOptions, OperationDescriptor, Variables};
use serde_json::Value;
use tokio::sync::watch;

use crate::mutation::{MutationExecutor, MutationState};

/// `use_mutation`: `trigger(variables)` plus the state of the last run.
pub struct MutationBinding {
    executor: MutationExecutor,
    descriptor: Arc<OperationDescriptor>,
    options: MutationOptions,
    state: watch::Sender<MutationState>,
    receiver: watch::Receiver<MutationState>,
}

impl MutationBinding {
    pub(crate) fn new(
        executor: MutationExecutor,
        descriptor: &OperationDescriptor,
        options: MutationOptions,
    ) -> Self {
        let (state, receiver) = watch::channel(MutationState::idle());
        Self {
            executor,
            descriptor: Arc::new(descriptor.clone()),
            options,
            state,
            receiver,
        }
    }

    pub async fn trigger(&self, variables: Variables) -> MutationState {
        self.state.send_modify(|state| {
            let data = state.data.take();
            *state = MutationState::loading().with_data(data);
        });

        let outcome = self
            .executor
            .execute(&self.descriptor, variables, self.options)
            .await;
        self.state.send_replace(outcome.clone());
        outcome
    }

    pub fn state(&self) -> MutationState {
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

    pub fn subscribe(&self) -> watch::Receiver<MutationState> {
        self.receiver.clone()
    }
}
