//! fold-core: tenant-scoped building blocks for the Fold data-access layer.
//!
//! Everything here is runtime-agnostic: scopes, operation descriptors,
//! request keys, the result cache, request state, configuration and the
//! transport contract. Sessions live in `fold-auth`; executors in
//! `fold-client`.

pub mod cache;
pub mod config;
pub mod errors;
pub mod key;
pub mod operation;
pub mod policy;
pub mod state;
pub mod tenant;
pub mod transport;

pub use cache::{CacheEntry, CacheLimits, CacheStore};
pub use config::{load_env_config, ClientOptions, ConfigError, FoldConfig, FoldConfigSnapshot};
pub use errors::{ErrorKind, FoldError, FoldResult, RemoteErrorItem};
pub use key::{RequestKey, RequestKeyer};
pub use operation::{to_variables, OperationDescriptor, OperationKind, TagRule, Variables, VariablesShape};
pub use policy::{FetchPolicy, MutationOptions, QueryOptions};
pub use state::{RequestState, RequestStatus};
pub use tenant::{BranchId, BranchSelection, OrganisationId, TenantScope, BRANCH_VARIABLE, ORGANISATION_VARIABLE};
pub use transport::{RemoteRequest, RemoteResponse, Transport, UNAUTHENTICATED};
