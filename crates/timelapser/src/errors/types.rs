//! Error type definitions for the timelapser scheduling core
//!
//! This module defines all error types used throughout the crate,
//! providing a hierarchical error system that makes debugging and error
//! handling more straightforward.
//!
//! Business-rule outcomes ("capture not due", "outside window", "camera
//! offline") are deliberately NOT errors; they are carried as data in
//! verdict records. The enums here cover genuine failures: malformed
//! configuration, repository faults, and scheduler infrastructure problems.

use thiserror::Error;

/// Top-level application error type
///
/// This enum represents all possible errors that can occur in the crate.
/// It uses `thiserror` to provide automatic error trait implementations and
/// proper error chaining.
#[derive(Error, Debug)]
pub enum AppError {
    /// Timing/validation errors from the calculators
    #[error("Timing error: {0}")]
    Timing(#[from] TimingError),

    /// Scheduler engine and job queue errors
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Repository layer errors
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Validation errors
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Resource not found errors
    #[error("Not found: {resource} with id {id}")]
    NotFound { resource: String, id: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Validation failures from the time-window and capture-timing calculators
///
/// These are recoverable: the caller receives the violated bound or the
/// offending value for user-facing messaging.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimingError {
    /// A time-window string was not `HH:MM` or `HH:MM:SS`
    #[error("Invalid time window format: '{value}' (expected HH:MM or HH:MM:SS)")]
    InvalidWindowFormat { value: String },

    /// Capture interval below the configured minimum
    #[error("Capture interval {seconds}s is below the minimum of {min}s")]
    IntervalTooShort { seconds: i64, min: i64 },

    /// Capture interval above the configured maximum
    #[error("Capture interval {seconds}s is above the maximum of {max}s")]
    IntervalTooLong { seconds: i64, max: i64 },

    /// A sunrise/sunset offset string was not parseable (e.g. "+30m", "-1h15m")
    #[error("Invalid time offset: '{value}' (expected forms like '+30m' or '-1h15m')")]
    InvalidOffset { value: String },

    /// A timezone identifier was not a valid IANA zone name
    #[error("Invalid timezone: '{value}'")]
    InvalidTimezone { value: String },
}

/// Scheduler engine and job queue specific errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// The trigger engine is not running (startup, shutdown, or test harness)
    ///
    /// Callers must treat this as "feature temporarily unavailable" and
    /// degrade gracefully rather than failing their own request.
    #[error("Scheduler engine is not running")]
    Unavailable,

    /// A job id was not found in the trigger registry
    #[error("Unknown job: {job_id}")]
    UnknownJob { job_id: String },

    /// The job queue reached its configured pending capacity
    #[error("Job queue is full ({pending} pending jobs)")]
    QueueFull { pending: usize },
}

/// Repository layer specific errors
///
/// The in-memory repositories never produce these, but database-backed
/// implementations behind the same traits will; the readiness validator
/// catches them at its boundary and reports `validation_error`.
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Backend connection failures
    #[error("Repository connection failed: {message}")]
    ConnectionFailed { message: String },

    /// Query execution failures
    #[error("Query failed: {message}")]
    QueryFailed { message: String },

    /// Record not found
    #[error("Not found: {resource} with id {id}")]
    NotFound { resource: String, id: String },
}

/// Convenience methods for creating common error types
impl AppError {
    /// Create a validation error with a custom message
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a not-found error
    pub fn not_found<R: Into<String>, I: ToString>(resource: R, id: I) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.to_string(),
        }
    }
}

impl RepositoryError {
    /// Create a query-failed error
    pub fn query_failed<S: Into<String>>(message: S) -> Self {
        Self::QueryFailed {
            message: message.into(),
        }
    }
}
