//! `Database` trait: single async interface for all persistence the
//! webhook pipeline needs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::model::{CallAttempt, CallAttemptUpdate, FollowUpFlag, NotificationLog, Referral};

/// Backend-agnostic database trait.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    // ── Call attempts ───────────────────────────────────────────────

    /// Insert a new call attempt.
    async fn insert_call_attempt(&self, attempt: &CallAttempt) -> Result<(), DatabaseError>;

    /// Get a call attempt by ID.
    async fn get_call_attempt(&self, id: Uuid) -> Result<Option<CallAttempt>, DatabaseError>;

    /// Write an outcome onto a call attempt that is not yet terminal.
    ///
    /// Returns `false` (and writes nothing) when the attempt is missing or
    /// already terminal. This conditional write is the only guard against
    /// duplicate webhook deliveries.
    async fn update_call_attempt(
        &self,
        id: Uuid,
        update: &CallAttemptUpdate,
    ) -> Result<bool, DatabaseError>;

    // ── Referrals ───────────────────────────────────────────────────

    /// Insert a new referral.
    async fn insert_referral(&self, referral: &Referral) -> Result<(), DatabaseError>;

    /// Get a referral by ID.
    async fn get_referral(&self, id: Uuid) -> Result<Option<Referral>, DatabaseError>;

    /// Move a referral to `scheduled` at `new_time` in a single write.
    ///
    /// Returns the updated referral, or `None` if it does not exist.
    async fn reschedule_referral(
        &self,
        id: Uuid,
        new_time: DateTime<Utc>,
        reason: &str,
    ) -> Result<Option<Referral>, DatabaseError>;

    // ── Flags ───────────────────────────────────────────────────────

    /// Insert a follow-up flag.
    async fn create_flag(&self, flag: &FollowUpFlag) -> Result<(), DatabaseError>;

    /// All flags for a referral, oldest first.
    async fn list_flags_for_referral(
        &self,
        referral_id: Uuid,
    ) -> Result<Vec<FollowUpFlag>, DatabaseError>;

    // ── Notifications ───────────────────────────────────────────────

    /// Record a sent (or failed) patient notification.
    async fn create_notification_log(&self, entry: &NotificationLog) -> Result<(), DatabaseError>;

    /// All notification log entries for a referral, oldest first.
    async fn list_notification_logs_for_referral(
        &self,
        referral_id: Uuid,
    ) -> Result<Vec<NotificationLog>, DatabaseError>;
}
