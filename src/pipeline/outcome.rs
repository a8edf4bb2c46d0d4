//! Outcome policy: maps provider vocabulary to internal state.
//!
//! Pure functions only. Every match has an explicit fallback arm so a new
//! provider value lands on a conservative default instead of being dropped.

use crate::model::{CallResolution, CallStatus, FlagPriority};

/// Call status as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderStatus {
    Completed,
    Failed,
    NoAnswer,
    Unrecognized(String),
}

impl From<&str> for ProviderStatus {
    fn from(raw: &str) -> Self {
        match raw.trim() {
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "no_answer" => Self::NoAnswer,
            other => Self::Unrecognized(other.to_string()),
        }
    }
}

/// Conversation outcome as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderOutcome {
    Rescheduled,
    Declined,
    Voicemail,
    CallbackRequested,
    NoAnswer,
    Unrecognized(String),
}

impl From<&str> for ProviderOutcome {
    fn from(raw: &str) -> Self {
        match raw.trim() {
            "rescheduled" => Self::Rescheduled,
            "declined" => Self::Declined,
            "voicemail" => Self::Voicemail,
            "callback_requested" => Self::CallbackRequested,
            "no_answer" => Self::NoAnswer,
            other => Self::Unrecognized(other.to_string()),
        }
    }
}

/// Why a nurse needs to follow up.
///
/// Derived from the outcome string when the provider sent one, otherwise
/// from the status string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowUpReason {
    Declined,
    NoAnswer,
    Voicemail,
    CallbackRequested,
    InvalidNumber,
    Failed,
    Other(String),
}

impl From<&str> for FollowUpReason {
    fn from(raw: &str) -> Self {
        match raw.trim() {
            "declined" => Self::Declined,
            "no_answer" => Self::NoAnswer,
            "voicemail" => Self::Voicemail,
            "callback_requested" => Self::CallbackRequested,
            "invalid_number" => Self::InvalidNumber,
            "failed" => Self::Failed,
            other => Self::Other(other.to_string()),
        }
    }
}

impl FollowUpReason {
    /// Provider-vocabulary label, as shown to nurses.
    pub fn label(&self) -> &str {
        match self {
            Self::Declined => "declined",
            Self::NoAnswer => "no_answer",
            Self::Voicemail => "voicemail",
            Self::CallbackRequested => "callback_requested",
            Self::InvalidNumber => "invalid_number",
            Self::Failed => "failed",
            Self::Other(raw) => raw,
        }
    }

    pub fn priority(&self) -> FlagPriority {
        match self {
            Self::Declined => FlagPriority::High,
            Self::NoAnswer => FlagPriority::Medium,
            Self::Voicemail => FlagPriority::Medium,
            Self::CallbackRequested => FlagPriority::High,
            Self::InvalidNumber => FlagPriority::Urgent,
            Self::Failed => FlagPriority::High,
            Self::Other(_) => FlagPriority::Medium,
        }
    }
}

/// Internal status for a provider status. Unknown values count as failed
/// so they end up in front of a human.
pub fn map_status(status: &ProviderStatus) -> CallStatus {
    match status {
        ProviderStatus::Completed => CallStatus::Completed,
        ProviderStatus::Failed => CallStatus::Failed,
        ProviderStatus::NoAnswer => CallStatus::NoAnswer,
        ProviderStatus::Unrecognized(_) => CallStatus::Failed,
    }
}

/// Internal resolution for a provider outcome.
pub fn map_resolution(outcome: &ProviderOutcome) -> Option<CallResolution> {
    match outcome {
        ProviderOutcome::Rescheduled => Some(CallResolution::Rescheduled),
        ProviderOutcome::Declined => Some(CallResolution::Declined),
        ProviderOutcome::Voicemail => Some(CallResolution::LeftVoicemail),
        ProviderOutcome::CallbackRequested => Some(CallResolution::CallbackRequested),
        ProviderOutcome::NoAnswer => Some(CallResolution::NoAnswer),
        ProviderOutcome::Unrecognized(_) => None,
    }
}

/// Everything the processor needs to know about one event's outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutcomeDecision {
    pub status: CallStatus,
    pub resolution: Option<CallResolution>,
    pub reason: FollowUpReason,
    pub priority: FlagPriority,
}

impl OutcomeDecision {
    pub fn is_reschedule(&self) -> bool {
        self.resolution == Some(CallResolution::Rescheduled)
    }
}

/// Map raw provider strings to a decision. Total and deterministic.
pub fn decide(status: &str, outcome: Option<&str>) -> OutcomeDecision {
    let provider_status = ProviderStatus::from(status);
    let provider_outcome = outcome.map(ProviderOutcome::from);
    let reason = FollowUpReason::from(outcome.unwrap_or(status));

    OutcomeDecision {
        status: map_status(&provider_status),
        resolution: provider_outcome.as_ref().and_then(map_resolution),
        priority: reason.priority(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_table() {
        assert_eq!(map_status(&"completed".into()), CallStatus::Completed);
        assert_eq!(map_status(&"failed".into()), CallStatus::Failed);
        assert_eq!(map_status(&"no_answer".into()), CallStatus::NoAnswer);
        assert_eq!(map_status(&"busy".into()), CallStatus::Failed);
    }

    #[test]
    fn resolution_table() {
        let cases = [
            ("rescheduled", Some(CallResolution::Rescheduled)),
            ("declined", Some(CallResolution::Declined)),
            ("voicemail", Some(CallResolution::LeftVoicemail)),
            ("callback_requested", Some(CallResolution::CallbackRequested)),
            ("no_answer", Some(CallResolution::NoAnswer)),
            ("hung_up", None),
        ];
        for (raw, expected) in cases {
            assert_eq!(map_resolution(&raw.into()), expected, "outcome {raw}");
        }
    }

    #[test]
    fn priority_table() {
        let cases = [
            ("declined", FlagPriority::High),
            ("no_answer", FlagPriority::Medium),
            ("voicemail", FlagPriority::Medium),
            ("callback_requested", FlagPriority::High),
            ("invalid_number", FlagPriority::Urgent),
            ("failed", FlagPriority::High),
            ("completed", FlagPriority::Medium),
            ("something_new", FlagPriority::Medium),
        ];
        for (raw, expected) in cases {
            assert_eq!(FollowUpReason::from(raw).priority(), expected, "reason {raw}");
        }
    }

    #[test]
    fn full_status_outcome_grid() {
        use CallResolution as R;
        use CallStatus as S;
        use FlagPriority as P;

        let outcomes: [(Option<&str>, Option<R>, Option<P>); 6] = [
            (Some("rescheduled"), Some(R::Rescheduled), Some(P::Medium)),
            (Some("declined"), Some(R::Declined), Some(P::High)),
            (Some("voicemail"), Some(R::LeftVoicemail), Some(P::Medium)),
            (Some("callback_requested"), Some(R::CallbackRequested), Some(P::High)),
            (Some("no_answer"), Some(R::NoAnswer), Some(P::Medium)),
            // Absent outcome: priority comes from the status.
            (None, None, None),
        ];
        let statuses = [
            ("completed", S::Completed, P::Medium),
            ("failed", S::Failed, P::High),
            ("no_answer", S::NoAnswer, P::Medium),
        ];

        for (raw_status, status, status_priority) in statuses {
            for (raw_outcome, resolution, outcome_priority) in outcomes {
                let decision = decide(raw_status, raw_outcome);
                assert_eq!(decision.status, status, "{raw_status}/{raw_outcome:?}");
                assert_eq!(decision.resolution, resolution, "{raw_status}/{raw_outcome:?}");
                assert_eq!(
                    decision.priority,
                    outcome_priority.unwrap_or(status_priority),
                    "{raw_status}/{raw_outcome:?}"
                );
                // Same input, same answer.
                assert_eq!(decision, decide(raw_status, raw_outcome));
            }
        }
    }

    #[test]
    fn reason_uses_outcome_then_status() {
        assert_eq!(decide("failed", Some("declined")).reason, FollowUpReason::Declined);
        assert_eq!(decide("no_answer", None).reason, FollowUpReason::NoAnswer);
        assert_eq!(decide("no_answer", None).reason.label(), "no_answer");
    }

    #[test]
    fn unmapped_strings_fall_back_conservatively() {
        let decision = decide("exploded", Some("alien"));
        assert_eq!(decision.status, CallStatus::Failed);
        assert_eq!(decision.resolution, None);
        assert_eq!(decision.reason, FollowUpReason::Other("alien".into()));
        assert_eq!(decision.priority, FlagPriority::Medium);
        assert!(!decision.is_reschedule());
    }

    #[test]
    fn only_rescheduled_outcome_is_a_reschedule() {
        assert!(decide("completed", Some("rescheduled")).is_reschedule());
        assert!(decide("failed", Some("rescheduled")).is_reschedule());
        assert!(!decide("completed", Some("declined")).is_reschedule());
        assert!(!decide("completed", None).is_reschedule());
    }
}
