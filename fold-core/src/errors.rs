//! # Errors
//!
//! Fold surfaces a small, stable taxonomy to feature code:
//! - scope errors never reach the wire
//! - `AuthExpired` is the only error recovered internally (once)
//! - remote errors are surfaced verbatim
//!
//! Errors are `Clone` so one outcome can be handed to every caller attached
//! to the same in-flight request.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A convenience result type for Fold APIs.
pub type FoldResult<T> = Result<T, FoldError>;

/// Stable error classes with a name and a kebab-cased class name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UnscopedRequest,  // 401
    ScopeMismatch,    // 403
    AuthExpired,      // 401
    Network,          // 503
    Remote,           // 502
    InvalidVariables, // 400
    Decode,           // 422
    Auth,             // 401
}

impl ErrorKind {
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::UnscopedRequest => 401,
            ErrorKind::ScopeMismatch => 403,
            ErrorKind::AuthExpired => 401,
            ErrorKind::Network => 503,
            ErrorKind::Remote => 502,
            ErrorKind::InvalidVariables => 400,
            ErrorKind::Decode => 422,
            ErrorKind::Auth => 401,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::UnscopedRequest => "UnscopedRequestError",
            ErrorKind::ScopeMismatch => "ScopeMismatchError",
            ErrorKind::AuthExpired => "AuthExpiredError",
            ErrorKind::Network => "NetworkError",
            ErrorKind::Remote => "RemoteError",
            ErrorKind::InvalidVariables => "InvalidVariablesError",
            ErrorKind::Decode => "DecodeError",
            ErrorKind::Auth => "AuthError",
        }
    }

    pub fn class_name(&self) -> &'static str {
        match self {
            ErrorKind::UnscopedRequest => "unscoped-request",
            ErrorKind::ScopeMismatch => "scope-mismatch",
            ErrorKind::AuthExpired => "auth-expired",
            ErrorKind::Network => "network",
            ErrorKind::Remote => "remote",
            ErrorKind::InvalidVariables => "invalid-variables",
            ErrorKind::Decode => "decode",
            ErrorKind::Auth => "auth",
        }
    }
}

/// One structured error returned by the remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteErrorItem {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl RemoteErrorItem {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
            extensions: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.extensions = Some(serde_json::json!({ "code": code.into() }));
        self
    }

    /// `extensions.code`, if the service set one.
    pub fn code(&self) -> Option<&str> {
        self.extensions
            .as_ref()
            .and_then(|e| e.get("code"))
            .and_then(|c| c.as_str())
    }
}

fn remote_summary(errors: &[RemoteErrorItem]) -> String {
    match errors {
        [] => "no details".to_string(),
        [only] => only.message.clone(),
        [first, rest @ ..] => format!("{} (and {} more)", first.message, rest.len()),
    }
}

/// Typed error surfaced by every Fold operation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FoldError {
    #[error("Unscoped request: {0}")]
    UnscopedRequest(String),

    #[error("Scope mismatch: requested {requested}, active {active}")]
    ScopeMismatch { requested: String, active: String },

    #[error("Authentication expired: {0}")]
    AuthExpired(String),

    #[error("Network error: {message}")]
    Network { message: String, timed_out: bool },

    #[error("Remote error: {}", remote_summary(.errors))]
    Remote { errors: Vec<RemoteErrorItem> },

    #[error("Invalid variables: {0}")]
    InvalidVariables(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Authentication failed: {0}")]
    Auth(String),
}

impl FoldError {
    pub fn unscoped(msg: impl Into<String>) -> Self {
        Self::UnscopedRequest(msg.into())
    }

    pub fn scope_mismatch(requested: impl Into<String>, active: impl Into<String>) -> Self {
        Self::ScopeMismatch {
            requested: requested.into(),
            active: active.into(),
        }
    }

    pub fn auth_expired(msg: impl Into<String>) -> Self {
        Self::AuthExpired(msg.into())
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network {
            message: msg.into(),
            timed_out: false,
        }
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Network {
            message: msg.into(),
            timed_out: true,
        }
    }

    pub fn remote(errors: Vec<RemoteErrorItem>) -> Self {
        Self::Remote { errors }
    }

    pub fn invalid_variables(msg: impl Into<String>) -> Self {
        Self::InvalidVariables(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            FoldError::UnscopedRequest(_) => ErrorKind::UnscopedRequest,
            FoldError::ScopeMismatch { .. } => ErrorKind::ScopeMismatch,
            FoldError::AuthExpired(_) => ErrorKind::AuthExpired,
            FoldError::Network { .. } => ErrorKind::Network,
            FoldError::Remote { .. } => ErrorKind::Remote,
            FoldError::InvalidVariables(_) => ErrorKind::InvalidVariables,
            FoldError::Decode(_) => ErrorKind::Decode,
            FoldError::Auth(_) => ErrorKind::Auth,
        }
    }

    pub fn code(&self) -> u16 {
        self.kind().status_code()
    }

    pub fn name(&self) -> &'static str {
        self.kind().name()
    }

    pub fn class_name(&self) -> &'static str {
        self.kind().class_name()
    }

    pub fn is_auth_expired(&self) -> bool {
        matches!(self, FoldError::AuthExpired(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, FoldError::Network { timed_out: true, .. })
    }

    /// Errors that are raised locally and never attempted on the wire.
    pub fn is_scope_error(&self) -> bool {
        matches!(
            self,
            FoldError::UnscopedRequest(_) | FoldError::ScopeMismatch { .. }
        )
    }

    /// Turn any error into a FoldError:
    /// - if it's already a FoldError, keep it
    /// - otherwise wrap as Network
    pub fn normalize(err: anyhow::Error) -> FoldError {
        match err.downcast::<FoldError>() {
            Ok(fold) => fold,
            Err(other) => FoldError::network(other.to_string()),
        }
    }

    /// JSON payload for UI bindings and logs.
    pub fn to_json(&self) -> Value {
        use serde_json::json;

        let mut base = json!({
            "name": self.name(),
            "message": self.to_string(),
            "code": self.code(),
            "className": self.class_name(),
        });

        if let FoldError::Remote { errors } = self {
            base["errors"] = json!(errors);
        }
        base
    }
}

/// Convenience helper for "bail with FoldError" inside `anyhow` code.
#[macro_export]
macro_rules! bail_fold {
    ($ctor:ident, $msg:expr) => {
        return Err(anyhow::Error::new($crate::errors::FoldError::$ctor($msg)));
    };
    ($ctor:ident, $fmt:expr, $($arg:tt)*) => {
        return Err(anyhow::Error::new($crate::errors::FoldError::$ctor(format!($fmt, $($arg)*))));
    };
}
