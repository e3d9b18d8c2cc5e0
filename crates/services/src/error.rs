//! Shared error types for the services crate.

use thiserror::Error;

use report_core::model::{AttemptError, ContextError, DisplayOptionsErrors};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by `AttemptTracker`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TrackerError {
    /// The context is not a course or activity, or has no parent course.
    #[error("unsupported context: {0}")]
    UnsupportedContext(#[from] ContextError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `AttemptService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AttemptServiceError {
    #[error(transparent)]
    Attempt(#[from] AttemptError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `ReportQueryBuilder` and `ReportService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReportError {
    /// A history report was requested without a `usageid`.
    #[error("no question usage selected")]
    MissingUsage,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `DisplayOptionsService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DisplayOptionsServiceError {
    #[error("invalid display options: {0}")]
    Invalid(#[from] DisplayOptionsErrors),
    #[error(transparent)]
    Tracker(#[from] TrackerError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while assembling `ReportServices`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReportServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
}
