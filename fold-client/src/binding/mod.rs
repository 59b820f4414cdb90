//! Reactive `{data, loading, error}` bindings for UI code.
//!
//! Each binding owns its state and publishes it through a `watch` channel,
//! so a view can either read the latest state or await changes.

mod mutation;
mod query;

pub use mutation::MutationBinding;
pub use query::QueryBinding;
