//! Centralized error handling for the proposal monitor
//!
//! This module provides the error hierarchy used across the application:
//! configuration problems (bad cron/time strings, unknown schedules),
//! store read/write failures, refresh collaborator failures, and
//! notification channel failures.

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;
