//! Shared error types for the services crate.

use thiserror::Error;

use literacy_core::client::ToggleError;
use literacy_core::model::{CategoryParseError, LessonId, ProgressError, UserId};
use literacy_core::sync::PayloadError;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by `ProgressService`.
///
/// None of these are retried by the service. Every mutating operation is
/// idempotent for its own payload, so callers may resubmit after any of them.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressServiceError {
    #[error("user {0} not found")]
    UserNotFound(UserId),

    #[error("lesson {0} not found in catalog")]
    LessonNotFound(LessonId),

    #[error("user {0} already exists")]
    UserExists(UserId),

    #[error(transparent)]
    InvalidCategory(#[from] CategoryParseError),

    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] PayloadError),

    #[error("invalid progress value: {0}")]
    InvalidValue(#[from] ProgressError),

    /// Another write landed between load and save; nothing was applied.
    #[error("progress for user {user} changed concurrently (expected version {expected}, found {found})")]
    Conflict {
        user: UserId,
        expected: u64,
        found: u64,
    },

    #[error("persistence failure: {0}")]
    Persistence(#[from] StorageError),
}

impl ProgressServiceError {
    /// True for failures where resubmitting the same request can succeed:
    /// a lost version race or an unreachable store. Corrupt stored data is not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Conflict { .. } | Self::Persistence(StorageError::Connection(_))
        )
    }
}

/// Errors emitted by `ProgressSyncClient`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SyncClientError {
    #[error(transparent)]
    Toggle(#[from] ToggleError),
    #[error(transparent)]
    Service(#[from] ProgressServiceError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
}
