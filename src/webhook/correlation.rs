//! Resolve a webhook event back to the call attempt that produced it.

use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::WebhookError;
use crate::model::CallAttempt;
use crate::store::Database;
use crate::webhook::event::WebhookEvent;

/// Result of looking up an event's call attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Correlation {
    /// A pending attempt; the event should be processed.
    Resolved(CallAttempt),
    /// No usable `call_log_id` in the metadata (test pings, foreign calls).
    MissingId,
    /// Well-formed id that matches no stored attempt.
    UnknownAttempt(Uuid),
    /// The attempt already has its outcome; this is a redelivery.
    AlreadyTerminal(CallAttempt),
}

impl Correlation {
    /// Message returned to the provider in the acknowledgment.
    pub fn ack_message(&self) -> &'static str {
        match self {
            Self::Resolved(_) => "Webhook received, processing",
            Self::MissingId => "Call log ID not found, ignoring",
            Self::UnknownAttempt(_) => "Call log not found, ignoring",
            Self::AlreadyTerminal(_) => "Call already processed, ignoring",
        }
    }
}

/// Look up the call attempt named in the event's correlation payload.
///
/// Misses are not errors. Only a failing or slow store is.
pub async fn resolve(
    store: &dyn Database,
    event: &WebhookEvent,
    timeout: Duration,
) -> Result<Correlation, WebhookError> {
    let Some(attempt_id) = event.metadata.call_attempt_id() else {
        info!(
            call_id = ?event.call_id,
            raw_id = ?event.metadata.call_log_id,
            "Webhook without usable call_log_id"
        );
        return Ok(Correlation::MissingId);
    };

    let attempt = tokio::time::timeout(timeout, store.get_call_attempt(attempt_id))
        .await
        .map_err(|_| WebhookError::LookupTimeout(timeout))??;

    let Some(attempt) = attempt else {
        info!(call_attempt_id = %attempt_id, "Unknown call_log_id");
        return Ok(Correlation::UnknownAttempt(attempt_id));
    };

    if let Some(claimed) = event.metadata.referral_id.as_deref()
        && claimed != attempt.referral_id.to_string()
    {
        warn!(
            call_attempt_id = %attempt.id,
            stored_referral = %attempt.referral_id,
            claimed_referral = claimed,
            "Webhook referral_id disagrees with stored call attempt; using stored value"
        );
    }

    if attempt.status.is_terminal() {
        debug!(call_attempt_id = %attempt.id, status = %attempt.status, "Redelivery for terminal attempt");
        return Ok(Correlation::AlreadyTerminal(attempt));
    }

    Ok(Correlation::Resolved(attempt))
}
