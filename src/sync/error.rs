use thiserror::Error;

use crate::error::AppError;
use crate::validation::ValidationError;

/// Failures surfaced by the sync core to the rendering layer.
///
/// None of these are fatal: the worst case is a stale, read-only view.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// The session, task or reward does not exist.
    #[error("not found")]
    NotFound,

    /// The caller is not a participant of the session, or does not own the entity.
    #[error("not allowed for this participant")]
    Unauthorized,

    /// The change feed is gone and the retry budget is exhausted.
    #[error("change feed disconnected")]
    Disconnected,

    /// Input rejected before any network call.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// A transient mutation or fetch failure.
    #[error("backend error: {0}")]
    Backend(String),
}

impl From<ValidationError> for SyncError {
    fn from(err: ValidationError) -> Self {
        SyncError::ValidationFailed(err.to_string())
    }
}

impl From<AppError> for SyncError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::NotFound => SyncError::NotFound,
            AppError::Unauthorized => SyncError::Unauthorized,
            AppError::Validation(msg) => SyncError::ValidationFailed(msg),
            other => SyncError::Backend(other.to_string()),
        }
    }
}
