//! Error types for the referral webhook service.

use std::time::Duration;

use uuid::Uuid;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Errors raised on the synchronous webhook boundary.
///
/// Everything here is visible to the caller as an HTTP status.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Call attempt lookup failed: {0}")]
    Lookup(#[from] DatabaseError),

    #[error("Call attempt lookup timed out after {0:?}")]
    LookupTimeout(Duration),

    #[error("Outcome queue unavailable: {0}")]
    Unavailable(#[from] DispatchError),
}

/// Errors raised while processing an outcome off the request path.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: String,
        timeout: Duration,
    },

    #[error("Referral {id} not found")]
    ReferralNotFound { id: Uuid },

    #[error("Reschedule of referral {referral_id} was not applied")]
    RescheduleNotApplied { referral_id: Uuid },

    #[error("Failed to create follow-up flag for referral {referral_id}: {reason}")]
    FlagCreation { referral_id: Uuid, reason: String },

    #[error("{operation} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        last_error: String,
    },
}

/// Calendar adapter errors. Always best-effort for the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum CalendarError {
    #[error("Calendar request failed: {0}")]
    Request(String),

    #[error("Calendar API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Calendar call timed out after {0:?}")]
    Timeout(Duration),
}

/// Email adapter errors. Always best-effort for the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build email: {0}")]
    Build(String),

    #[error("SMTP send failed: {0}")]
    Send(String),

    #[error("Email send timed out after {0:?}")]
    Timeout(Duration),
}

/// Errors from submitting work to the outcome dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Outcome queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("Outcome dispatcher is shut down")]
    Closed,
}
