//! fold-client: the executors feature code talks to.
//!
//! ```rust,no_run
//! use fold_client::FoldClient;
//! use fold_core::{OperationDescriptor, QueryOptions, Variables};
//! # async fn demo(strategy: fold_client::OperationAuthStrategy) -> anyhow::Result<()> {
//! let client = FoldClient::builder()
//!     .options(fold_core::ClientOptions {
//!         endpoint: Some("https://api.example.org/graphql".into()),
//!         ..Default::default()
//!     })
//!     .auth_strategy(strategy)
//!     .build()?;
//!
//! let funds = OperationDescriptor::query("GetFunds", "query GetFunds($organisationId: ID!) { funds { id name } }")
//!     .tag("funds", "Fund");
//! let data: serde_json::Value = client.fetch(&funds, Variables::new(), QueryOptions::new()).await?;
//! # let _ = data;
//! # Ok(())
//! # }
//! ```

pub mod binding;
pub mod client;
mod dispatch;
#[cfg(feature = "http")]
pub mod http;
pub mod inflight;
pub mod mutation;
pub mod observability;
pub mod query;
pub mod strategy;

pub use binding::{MutationBinding, QueryBinding};
pub use client::{FoldClient, FoldClientBuilder};
pub use inflight::{InflightRegistry, SubscriptionId};
pub use mutation::{MutationExecutor, MutationState};
pub use query::{QueryExecutor, QueryState, QueryStream};
pub use strategy::OperationAuthStrategy;

#[cfg(feature = "http")]
pub use http::HttpTransport;

#[cfg(feature = "tracing-basic")]
pub use observability::init_tracing;

pub use fold_auth;
pub use fold_core;
