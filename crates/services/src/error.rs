//! Shared error types for the services crate.

use std::time::Duration;

use thiserror::Error;

use practice_core::controller::ControllerError;
use practice_core::model::SessionStateError;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by a `QuestionService` implementation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QuestionServiceError {
    #[error("question service is not configured")]
    Disabled,
    #[error("question service request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("question service did not answer within {0:?}")]
    Timeout(Duration),
    #[error("question service rejected the request: {0}")]
    Rejected(String),
    #[error("invalid question service payload: {0}")]
    Decode(String),
}

/// Errors emitted by the practice session engine and its parts.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    /// A user-initiated service call failed; the caller may retry.
    #[error("question service unavailable: {0}")]
    ServiceUnavailable(#[from] QuestionServiceError),
    /// The persisted snapshot could not be decoded or violates an invariant.
    #[error("stored session is corrupt: {0}")]
    Corrupt(String),
    #[error("no more questions available for this session")]
    Exhausted,
    #[error("session already completed")]
    Completed,
    #[error("no active session")]
    NoActiveSession,
    #[error("no question is being answered")]
    NoActiveQuestion,
    #[error("current question has not been graded yet")]
    NotGraded,
    #[error(transparent)]
    State(#[from] SessionStateError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while loading configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error(transparent)]
    Controller(#[from] ControllerError),
    #[error(transparent)]
    State(#[from] SessionStateError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    QuestionService(#[from] QuestionServiceError),
}
