use std::time::Duration;

use thiserror::Error;

/// Failure of a `request`/`release` call against the token store.
///
/// One acquisition may answer several waiting callers, so the error is `Clone`
/// and keeps provider failures as rendered messages.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The provider rejected the acquisition or refresh
    #[error("{0}")]
    AcquisitionFailed(String),

    #[error("token request for provider '{provider}' timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    /// The provider call ended without a success or an error (it panicked)
    #[error("unknown acquisition result: {0}")]
    UnknownAcquisitionResult(String),

    #[error("provider store unavailable: {0}")]
    ProviderStoreUnavailable(String),
}

impl StoreError {
    pub fn acquisition_failed(err: &anyhow::Error) -> Self {
        StoreError::AcquisitionFailed(format!("{:#}", err))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, StoreError::Timeout { .. })
    }

    /// Short label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::AcquisitionFailed(_) => "acquisition_failed",
            StoreError::Timeout { .. } => "timeout",
            StoreError::UnknownAcquisitionResult(_) => "unknown_result",
            StoreError::ProviderStoreUnavailable(_) => "unavailable",
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
