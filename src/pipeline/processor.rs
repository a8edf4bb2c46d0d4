//! Outcome processor. Applies one call-completion event.
//!
//! Flow:
//! 1. Map provider strings to an [`OutcomeDecision`]
//! 2. Conditionally write the outcome onto the call attempt
//! 3. Reschedule, or flag for follow-up
//!
//! Step 2 is the idempotency guard. A redelivery finds the attempt already
//! terminal, writes nothing and stops.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::integrations::{CalendarService, EmailService};
use crate::model::{CallAttempt, CallAttemptUpdate, FollowUpFlag};
use crate::pipeline::follow_up::FollowUpFlagger;
use crate::pipeline::outcome::{OutcomeDecision, decide};
use crate::pipeline::reschedule::{RescheduleOrchestrator, RescheduleReport};
use crate::pipeline::retry::{RetryPolicy, bounded};
use crate::store::Database;
use crate::webhook::event::WebhookEvent;

/// What processing one event produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessingOutcome {
    Rescheduled(RescheduleReport),
    FlagCreated(FollowUpFlag),
    /// Another delivery got there first.
    AlreadyTerminal,
}

impl ProcessingOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Rescheduled(_) => "rescheduled",
            Self::FlagCreated(_) => "flag_created",
            Self::AlreadyTerminal => "already_terminal",
        }
    }
}

pub struct OutcomeProcessor {
    store: Arc<dyn Database>,
    retry: RetryPolicy,
    config: PipelineConfig,
    orchestrator: RescheduleOrchestrator,
    flagger: FollowUpFlagger,
}

impl OutcomeProcessor {
    pub fn new(
        store: Arc<dyn Database>,
        calendar: Option<Arc<dyn CalendarService>>,
        email: Option<Arc<dyn EmailService>>,
        config: PipelineConfig,
    ) -> Self {
        let retry = RetryPolicy::from_config(&config);
        let orchestrator = RescheduleOrchestrator::new(
            Arc::clone(&store),
            calendar,
            email,
            retry.clone(),
            config.call_timeout,
        );
        let flagger = FollowUpFlagger::new(Arc::clone(&store), config.call_timeout);
        Self {
            store,
            retry,
            config,
            orchestrator,
            flagger,
        }
    }

    /// Apply `event` to `attempt`.
    pub async fn process(
        &self,
        attempt: &CallAttempt,
        event: &WebhookEvent,
    ) -> Result<ProcessingOutcome, PipelineError> {
        let decision = decide(&event.status, event.outcome.as_deref());
        info!(
            call_attempt_id = %attempt.id,
            referral_id = %attempt.referral_id,
            status = %decision.status,
            resolution = ?decision.resolution,
            "Processing call outcome"
        );

        if !self.record_outcome(attempt, event, &decision).await? {
            info!(call_attempt_id = %attempt.id, "Call attempt already terminal, skipping");
            return Ok(ProcessingOutcome::AlreadyTerminal);
        }

        if decision.is_reschedule() {
            if let Some(new_time) = event.new_appointment_time {
                let report = self
                    .orchestrator
                    .reschedule(attempt.referral_id, new_time)
                    .await?;
                return Ok(ProcessingOutcome::Rescheduled(report));
            }
            warn!(
                call_attempt_id = %attempt.id,
                "Rescheduled outcome without new_appointment_time, flagging for follow-up"
            );
        }

        let flag = self
            .flagger
            .flag(attempt.referral_id, &decision.reason, event.transcript.as_deref())
            .await?;
        Ok(ProcessingOutcome::FlagCreated(flag))
    }

    /// Terminal write. `false` when the attempt was already terminal.
    async fn record_outcome(
        &self,
        attempt: &CallAttempt,
        event: &WebhookEvent,
        decision: &OutcomeDecision,
    ) -> Result<bool, PipelineError> {
        let update = CallAttemptUpdate {
            status: decision.status,
            resolution: decision.resolution,
            transcript: event.transcript.clone(),
            duration_seconds: event.duration_seconds,
            completed_at: Utc::now(),
        };
        self.retry
            .run("update_call_attempt", || {
                bounded(
                    "update_call_attempt",
                    self.config.call_timeout,
                    self.store.update_call_attempt(attempt.id, &update),
                )
            })
            .await
    }
}
