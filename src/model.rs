//! Domain records touched by the webhook pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Call attempts ───────────────────────────────────────────────────

/// Lifecycle status of an automated call attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    NoAnswer,
}

impl CallStatus {
    /// Terminal statuses accept no further webhook transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::NoAnswer)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::NoAnswer => "no_answer",
        }
    }
}

impl std::fmt::Display for CallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CallStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "no_answer" => Ok(Self::NoAnswer),
            _ => Err(format!("Unknown call status: {}", s)),
        }
    }
}

/// What the call achieved, when it got far enough to say.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallResolution {
    Rescheduled,
    Declined,
    LeftVoicemail,
    CallbackRequested,
    NoAnswer,
}

impl CallResolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rescheduled => "rescheduled",
            Self::Declined => "declined",
            Self::LeftVoicemail => "left_voicemail",
            Self::CallbackRequested => "callback_requested",
            Self::NoAnswer => "no_answer",
        }
    }
}

impl std::fmt::Display for CallResolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CallResolution {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rescheduled" => Ok(Self::Rescheduled),
            "declined" => Ok(Self::Declined),
            "left_voicemail" => Ok(Self::LeftVoicemail),
            "callback_requested" => Ok(Self::CallbackRequested),
            "no_answer" => Ok(Self::NoAnswer),
            _ => Err(format!("Unknown call resolution: {}", s)),
        }
    }
}

/// One outbound automated call tied to a referral.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallAttempt {
    pub id: Uuid,
    pub referral_id: Uuid,
    /// Provider-side call identifier, when known.
    pub provider_call_id: Option<String>,
    pub status: CallStatus,
    pub resolution: Option<CallResolution>,
    pub transcript: Option<String>,
    pub duration_seconds: Option<u32>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CallAttempt {
    /// A fresh pending attempt for `referral_id`.
    pub fn new(referral_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            referral_id,
            provider_call_id: None,
            status: CallStatus::Pending,
            resolution: None,
            transcript: None,
            duration_seconds: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_provider_call_id(mut self, call_id: impl Into<String>) -> Self {
        self.provider_call_id = Some(call_id.into());
        self
    }
}

/// Fields written onto a call attempt when its outcome arrives.
#[derive(Debug, Clone, PartialEq)]
pub struct CallAttemptUpdate {
    pub status: CallStatus,
    pub resolution: Option<CallResolution>,
    pub transcript: Option<String>,
    pub duration_seconds: Option<u32>,
    pub completed_at: DateTime<Utc>,
}

// ── Referrals ───────────────────────────────────────────────────────

/// Referral lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferralStatus {
    Pending,
    Scheduled,
    Missed,
    Completed,
    Cancelled,
}

impl ReferralStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Scheduled => "scheduled",
            Self::Missed => "missed",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ReferralStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReferralStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "scheduled" => Ok(Self::Scheduled),
            "missed" => Ok(Self::Missed),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Unknown referral status: {}", s)),
        }
    }
}

/// A specialist referral whose lifecycle the webhooks advance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Referral {
    pub id: Uuid,
    pub patient_name: String,
    pub patient_email: Option<String>,
    pub patient_phone: Option<String>,
    pub specialist_type: String,
    pub status: ReferralStatus,
    pub scheduled_date: Option<DateTime<Utc>>,
    /// Calendar-side event id. Owned by the calendar, only referenced here.
    pub calendar_event_id: Option<String>,
    pub notes: Option<String>,
    /// Why the status last changed.
    pub status_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Referral {
    pub fn new(patient_name: impl Into<String>, specialist_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            patient_name: patient_name.into(),
            patient_email: None,
            patient_phone: None,
            specialist_type: specialist_type.into(),
            status: ReferralStatus::Pending,
            scheduled_date: None,
            calendar_event_id: None,
            notes: None,
            status_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_status(mut self, status: ReferralStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_scheduled_date(mut self, date: DateTime<Utc>) -> Self {
        self.scheduled_date = Some(date);
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.patient_email = Some(email.into());
        self
    }

    pub fn with_calendar_event(mut self, event_id: impl Into<String>) -> Self {
        self.calendar_event_id = Some(event_id.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

// ── Follow-up flags ─────────────────────────────────────────────────

/// Urgency of a human follow-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl FlagPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

impl std::fmt::Display for FlagPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FlagPriority {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            _ => Err(format!("Unknown flag priority: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagStatus {
    Open,
    Closed,
}

impl FlagStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

impl std::str::FromStr for FlagStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            _ => Err(format!("Unknown flag status: {}", s)),
        }
    }
}

/// A work item surfaced to a nurse after an unsuccessful call.
///
/// Created open by the pipeline; only a human closes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowUpFlag {
    pub id: Uuid,
    pub referral_id: Uuid,
    pub title: String,
    pub description: String,
    pub priority: FlagPriority,
    pub status: FlagStatus,
    pub created_at: DateTime<Utc>,
}

impl FollowUpFlag {
    pub fn open(
        referral_id: Uuid,
        title: impl Into<String>,
        description: impl Into<String>,
        priority: FlagPriority,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            referral_id,
            title: title.into(),
            description: description.into(),
            priority,
            status: FlagStatus::Open,
            created_at: Utc::now(),
        }
    }
}

// ── Notification log ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    AppointmentRescheduled,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AppointmentRescheduled => "appointment_rescheduled",
        }
    }
}

impl std::str::FromStr for NotificationKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "appointment_rescheduled" => Ok(Self::AppointmentRescheduled),
            _ => Err(format!("Unknown notification kind: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Sent,
    Failed,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for NotificationStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(Self::Sent),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Unknown notification status: {}", s)),
        }
    }
}

/// Record of a patient notification sent by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationLog {
    pub id: Uuid,
    pub referral_id: Uuid,
    pub kind: NotificationKind,
    pub recipient: String,
    pub subject: String,
    pub status: NotificationStatus,
    pub provider_message_id: Option<String>,
    pub calendar_invite_attached: bool,
    pub sent_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(!CallStatus::Pending.is_terminal());
        assert!(!CallStatus::InProgress.is_terminal());
        assert!(CallStatus::Completed.is_terminal());
        assert!(CallStatus::Failed.is_terminal());
        assert!(CallStatus::NoAnswer.is_terminal());
    }

    #[test]
    fn status_strings_parse_back() {
        for status in [
            CallStatus::Pending,
            CallStatus::InProgress,
            CallStatus::Completed,
            CallStatus::Failed,
            CallStatus::NoAnswer,
        ] {
            assert_eq!(status.as_str().parse::<CallStatus>().unwrap(), status);
        }
        assert!("done".parse::<CallStatus>().is_err());
    }

    #[test]
    fn priority_orders_by_urgency() {
        assert!(FlagPriority::Urgent > FlagPriority::High);
        assert!(FlagPriority::High > FlagPriority::Medium);
        assert!(FlagPriority::Medium > FlagPriority::Low);
    }

    #[test]
    fn new_flag_is_open() {
        let flag = FollowUpFlag::open(Uuid::new_v4(), "t", "d", FlagPriority::High);
        assert_eq!(flag.status, FlagStatus::Open);
    }
}
