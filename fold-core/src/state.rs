use serde::Serialize;

use crate::errors::FoldError;

/// Lifecycle of one request as seen by a UI binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Idle,
    Loading,
    Success,
    Error,
}

/// Reactive `{data, loading, error}` state owned by one binding.
///
/// `data` survives an `Error` transition when stale data was already shown.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestState<T> {
    pub status: RequestStatus,
    pub data: Option<T>,
    pub error: Option<FoldError>,
}

impl<T> Default for RequestState<T> {
    fn default() -> Self {
        Self::idle()
    }
}

impl<T> RequestState<T> {
    pub fn idle() -> Self {
        Self {
            status: RequestStatus::Idle,
            data: None,
            error: None,
        }
    }

    pub fn loading() -> Self {
        Self {
            status: RequestStatus::Loading,
            data: None,
            error: None,
        }
    }

    pub fn success(data: T) -> Self {
        Self {
            status: RequestStatus::Success,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(error: FoldError) -> Self {
        Self {
            status: RequestStatus::Error,
            data: None,
            error: Some(error),
        }
    }

    pub fn with_data(mut self, data: Option<T>) -> Self {
        self.data = data;
        self
    }

    pub fn is_loading(&self) -> bool {
        self.status == RequestStatus::Loading
    }

    /// Success or Error.
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, RequestStatus::Success | RequestStatus::Error)
    }

    pub fn is_success(&self) -> bool {
        self.status == RequestStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == RequestStatus::Error
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> RequestState<U> {
        RequestState {
            status: self.status,
            data: self.data.map(f),
            error: self.error,
        }
    }
}
