//! Error type definitions for the proposal monitor
//!
//! The hierarchy mirrors the failure taxonomy of the system: a
//! `ConfigError` never aborts anything beyond the schedule or trigger it
//! belongs to, a `RefreshError` marks the whole run as failed, a
//! `StoreError` leaves the in-memory view at the last committed state,
//! and notification failures stay inside their channel.

use thiserror::Error;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration errors (malformed cron/time strings, unknown ids)
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Durable store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// External refresh collaborator errors
    #[error("Refresh error: {0}")]
    Refresh(#[from] RefreshError),

    /// Notification channel errors
    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Configuration-level errors
///
/// These are surfaced to the caller rather than swallowed: a schedule
/// with a bad cron expression is skipped and reported, never silently
/// ignored and never fatal for the rest of the system.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid cron expression
    #[error("Invalid cron expression '{expression}': {message}")]
    InvalidCron { expression: String, message: String },

    /// Invalid HH:MM clock time string
    #[error("Invalid time '{value}': expected HH:MM")]
    InvalidTime { value: String },

    /// Unknown IANA timezone identifier
    #[error("Unknown timezone '{zone}'")]
    UnknownTimezone { zone: String },

    /// Schedule id not present in the store
    #[error("Schedule not found: {id}")]
    ScheduleNotFound { id: String },

    /// A schedule whose trigger fields are all missing or malformed
    #[error("Schedule '{id}' has no usable trigger for mode {mode}")]
    NoUsableTrigger { id: String, mode: String },
}

/// Durable store errors (schedule store, last-check state, datasets)
#[derive(Error, Debug)]
pub enum StoreError {
    /// Filesystem failures
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failures
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// External refresh collaborator errors
///
/// A refresh that "ran but found nothing" is a success; these variants
/// are reserved for runs that genuinely failed.
#[derive(Error, Debug)]
pub enum RefreshError {
    /// The refresh command could not be spawned or awaited
    #[error("Failed to run refresh command '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The refresh command exited with a non-zero status
    #[error("Refresh command exited with status {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },
}

/// Notification channel errors (logged per channel, never escalated)
#[derive(Error, Debug)]
pub enum NotifyError {
    /// Invalid sender or recipient address
    #[error("Invalid email address: {0}")]
    Address(#[from] lettre::address::AddressError),

    /// Email message construction failed
    #[error("Failed to build email: {0}")]
    EmailBuild(#[from] lettre::error::Error),

    /// SMTP transport failure
    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    /// Webhook HTTP request failure
    #[error("Webhook request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Webhook endpoint answered with a non-success status
    #[error("Webhook returned status {status}")]
    WebhookStatus { status: u16 },

    /// Channel is enabled but its settings are incomplete
    #[error("Channel '{channel}' is not fully configured: missing {missing}")]
    Incomplete {
        channel: &'static str,
        missing: &'static str,
    },
}

/// Errors produced by a single fetch-and-notify run
#[derive(Error, Debug)]
pub enum FetchError {
    /// Schedule-level configuration problem discovered at run time
    #[error("Fetch aborted by configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The external refresh collaborator failed
    #[error("Refresh failed: {0}")]
    Refresh(#[from] RefreshError),

    /// Schedule store read failure
    #[error("Store read failed: {0}")]
    Store(#[from] StoreError),
}

impl AppError {
    /// Create an internal error with a custom message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl ConfigError {
    /// Create an invalid-cron error
    pub fn invalid_cron<E: Into<String>, M: Into<String>>(expression: E, message: M) -> Self {
        Self::InvalidCron {
            expression: expression.into(),
            message: message.into(),
        }
    }

    /// Create an invalid-time error
    pub fn invalid_time<S: Into<String>>(value: S) -> Self {
        Self::InvalidTime {
            value: value.into(),
        }
    }
}
