//! Centralized error handling for the timelapser scheduling core
//!
//! This module provides a comprehensive error handling system that unifies
//! error types across all layers of the crate and provides consistent error
//! reporting and debugging capabilities.
//!
//! # Error Categories
//!
//! - **Timing Errors**: interval bounds, time-window formats, offsets
//! - **Scheduler Errors**: trigger engine availability, job registry, queue
//! - **Repository Errors**: data access layer failures
//! - **Validation/Configuration Errors**: input validation and config loading
//!
//! # Usage
//!
//! ```rust
//! use timelapser::errors::{AppError, AppResult};
//!
//! async fn example_function() -> AppResult<String> {
//!     // Function can return any error type that converts to AppError
//!     Ok("success".to_string())
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for timing calculator Results
pub type TimingResult<T> = Result<T, TimingError>;

/// Convenience type alias for scheduler Results
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Convenience type alias for Repository Results
pub type RepositoryResult<T> = Result<T, RepositoryError>;
