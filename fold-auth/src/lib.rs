//! fold-auth: the authenticated session behind every Fold request.
//!
//! [`SessionLifecycle`] is the only writer of the [`SessionStore`];
//! [`TenantScopeResolver`] turns the live session (plus navigation) into
//! the scope every request is sent under.

pub mod events;
pub mod jwt;
pub mod lifecycle;
pub mod options;
pub mod scope;
pub mod session;
pub mod strategy;

pub use events::{EventPat, ListenerId, SessionEvent, SessionEventHub, SessionEventKind, SessionListener};
pub use jwt::{default_inspector, OpaqueTokenInspector, TokenInspector};
pub use lifecycle::SessionLifecycle;
pub use options::{AuthOptions, AuthOptionsBuilder};
pub use scope::{Navigation, TenantScopeResolver};
pub use session::{AuthGrant, Credentials, Session, SessionStore};
pub use strategy::AuthStrategy;

#[cfg(any(feature = "jwt-aws-lc-rs", feature = "jwt-rust-crypto"))]
pub use jwt::JwtInspector;
