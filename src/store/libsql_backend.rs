//! libSQL implementation of the async `Database` trait.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::model::{
    CallAttempt, CallAttemptUpdate, FollowUpFlag, NotificationLog, Referral, ReferralStatus,
};
use crate::store::migrations;
use crate::store::traits::Database;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_optional_datetime(s: Option<String>) -> Option<DateTime<Utc>> {
    s.as_deref().map(parse_datetime)
}

fn parse_uuid(column: &str, s: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::Query(format!("bad {column} '{s}': {e}")))
}

fn parse_enum<T: std::str::FromStr<Err = String>>(s: &str) -> Result<T, DatabaseError> {
    s.parse().map_err(DatabaseError::Query)
}

fn col_err(context: &str, e: libsql::Error) -> DatabaseError {
    DatabaseError::Query(format!("{context} row parse: {e}"))
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn opt_int(v: Option<u32>) -> libsql::Value {
    match v {
        Some(v) => libsql::Value::Integer(i64::from(v)),
        None => libsql::Value::Null,
    }
}

fn opt_datetime(dt: Option<DateTime<Utc>>) -> libsql::Value {
    match dt {
        Some(dt) => libsql::Value::Text(dt.to_rfc3339()),
        None => libsql::Value::Null,
    }
}

const CALL_ATTEMPT_COLUMNS: &str = "id, referral_id, provider_call_id, status, resolution, transcript, duration_seconds, completed_at, created_at, updated_at";

const REFERRAL_COLUMNS: &str = "id, patient_name, patient_email, patient_phone, specialist_type, status, scheduled_date, calendar_event_id, notes, status_reason, created_at, updated_at";

const FLAG_COLUMNS: &str = "id, referral_id, title, description, priority, status, created_at";

const NOTIFICATION_COLUMNS: &str = "id, referral_id, notification_type, recipient, subject, status, provider_message_id, calendar_invite_attached, sent_at";

/// Map a libsql Row to a CallAttempt. Column order matches CALL_ATTEMPT_COLUMNS.
fn row_to_call_attempt(row: &libsql::Row) -> Result<CallAttempt, DatabaseError> {
    let ctx = "call_attempt";
    let id: String = row.get(0).map_err(|e| col_err(ctx, e))?;
    let referral_id: String = row.get(1).map_err(|e| col_err(ctx, e))?;
    let status: String = row.get(3).map_err(|e| col_err(ctx, e))?;
    let resolution: Option<String> = row.get::<String>(4).ok();
    let created: String = row.get(8).map_err(|e| col_err(ctx, e))?;
    let updated: String = row.get(9).map_err(|e| col_err(ctx, e))?;

    Ok(CallAttempt {
        id: parse_uuid("call_attempts.id", &id)?,
        referral_id: parse_uuid("call_attempts.referral_id", &referral_id)?,
        provider_call_id: row.get::<String>(2).ok(),
        status: parse_enum(&status)?,
        resolution: resolution.as_deref().map(parse_enum).transpose()?,
        transcript: row.get::<String>(5).ok(),
        duration_seconds: row
            .get::<i64>(6)
            .ok()
            .and_then(|v| u32::try_from(v).ok()),
        completed_at: parse_optional_datetime(row.get::<String>(7).ok()),
        created_at: parse_datetime(&created),
        updated_at: parse_datetime(&updated),
    })
}

/// Map a libsql Row to a Referral. Column order matches REFERRAL_COLUMNS.
fn row_to_referral(row: &libsql::Row) -> Result<Referral, DatabaseError> {
    let ctx = "referral";
    let id: String = row.get(0).map_err(|e| col_err(ctx, e))?;
    let status: String = row.get(5).map_err(|e| col_err(ctx, e))?;
    let created: String = row.get(10).map_err(|e| col_err(ctx, e))?;
    let updated: String = row.get(11).map_err(|e| col_err(ctx, e))?;

    Ok(Referral {
        id: parse_uuid("referrals.id", &id)?,
        patient_name: row.get(1).map_err(|e| col_err(ctx, e))?,
        patient_email: row.get::<String>(2).ok(),
        patient_phone: row.get::<String>(3).ok(),
        specialist_type: row.get(4).map_err(|e| col_err(ctx, e))?,
        status: parse_enum(&status)?,
        scheduled_date: parse_optional_datetime(row.get::<String>(6).ok()),
        calendar_event_id: row.get::<String>(7).ok(),
        notes: row.get::<String>(8).ok(),
        status_reason: row.get::<String>(9).ok(),
        created_at: parse_datetime(&created),
        updated_at: parse_datetime(&updated),
    })
}

fn row_to_flag(row: &libsql::Row) -> Result<FollowUpFlag, DatabaseError> {
    let ctx = "flag";
    let id: String = row.get(0).map_err(|e| col_err(ctx, e))?;
    let referral_id: String = row.get(1).map_err(|e| col_err(ctx, e))?;
    let priority: String = row.get(4).map_err(|e| col_err(ctx, e))?;
    let status: String = row.get(5).map_err(|e| col_err(ctx, e))?;
    let created: String = row.get(6).map_err(|e| col_err(ctx, e))?;

    Ok(FollowUpFlag {
        id: parse_uuid("flags.id", &id)?,
        referral_id: parse_uuid("flags.referral_id", &referral_id)?,
        title: row.get(2).map_err(|e| col_err(ctx, e))?,
        description: row.get(3).map_err(|e| col_err(ctx, e))?,
        priority: parse_enum(&priority)?,
        status: parse_enum(&status)?,
        created_at: parse_datetime(&created),
    })
}

fn row_to_notification(row: &libsql::Row) -> Result<NotificationLog, DatabaseError> {
    let ctx = "notification_log";
    let id: String = row.get(0).map_err(|e| col_err(ctx, e))?;
    let referral_id: String = row.get(1).map_err(|e| col_err(ctx, e))?;
    let kind: String = row.get(2).map_err(|e| col_err(ctx, e))?;
    let status: String = row.get(5).map_err(|e| col_err(ctx, e))?;
    let sent: String = row.get(8).map_err(|e| col_err(ctx, e))?;

    Ok(NotificationLog {
        id: parse_uuid("notification_logs.id", &id)?,
        referral_id: parse_uuid("notification_logs.referral_id", &referral_id)?,
        kind: parse_enum(&kind)?,
        recipient: row.get(3).map_err(|e| col_err(ctx, e))?,
        subject: row.get(4).map_err(|e| col_err(ctx, e))?,
        status: parse_enum(&status)?,
        provider_message_id: row.get::<String>(6).ok(),
        calendar_invite_attached: row.get::<i64>(7).unwrap_or(0) != 0,
        sent_at: parse_datetime(&sent),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Call attempts ───────────────────────────────────────────────

    async fn insert_call_attempt(&self, attempt: &CallAttempt) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO call_attempts (id, referral_id, provider_call_id, status, resolution, transcript, duration_seconds, completed_at, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    attempt.id.to_string(),
                    attempt.referral_id.to_string(),
                    opt_text(attempt.provider_call_id.as_deref()),
                    attempt.status.as_str(),
                    opt_text(attempt.resolution.map(|r| r.as_str())),
                    opt_text(attempt.transcript.as_deref()),
                    opt_int(attempt.duration_seconds),
                    opt_datetime(attempt.completed_at),
                    attempt.created_at.to_rfc3339(),
                    attempt.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_call_attempt: {e}")))?;

        debug!(call_attempt_id = %attempt.id, "Call attempt inserted");
        Ok(())
    }

    async fn get_call_attempt(&self, id: Uuid) -> Result<Option<CallAttempt>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {CALL_ATTEMPT_COLUMNS} FROM call_attempts WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_call_attempt: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_call_attempt(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_call_attempt: {e}"))),
        }
    }

    async fn update_call_attempt(
        &self,
        id: Uuid,
        update: &CallAttemptUpdate,
    ) -> Result<bool, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let affected = self
            .conn()
            .execute(
                "UPDATE call_attempts SET status = ?1, resolution = ?2, transcript = ?3, duration_seconds = ?4, completed_at = ?5, updated_at = ?6 WHERE id = ?7 AND status IN ('pending', 'in_progress')",
                params![
                    update.status.as_str(),
                    opt_text(update.resolution.map(|r| r.as_str())),
                    opt_text(update.transcript.as_deref()),
                    opt_int(update.duration_seconds),
                    update.completed_at.to_rfc3339(),
                    now,
                    id.to_string(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_call_attempt: {e}")))?;

        debug!(call_attempt_id = %id, applied = affected > 0, "Call attempt update");
        Ok(affected > 0)
    }

    // ── Referrals ───────────────────────────────────────────────────

    async fn insert_referral(&self, referral: &Referral) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO referrals (id, patient_name, patient_email, patient_phone, specialist_type, status, scheduled_date, calendar_event_id, notes, status_reason, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    referral.id.to_string(),
                    referral.patient_name.as_str(),
                    opt_text(referral.patient_email.as_deref()),
                    opt_text(referral.patient_phone.as_deref()),
                    referral.specialist_type.as_str(),
                    referral.status.as_str(),
                    opt_datetime(referral.scheduled_date),
                    opt_text(referral.calendar_event_id.as_deref()),
                    opt_text(referral.notes.as_deref()),
                    opt_text(referral.status_reason.as_deref()),
                    referral.created_at.to_rfc3339(),
                    referral.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_referral: {e}")))?;

        debug!(referral_id = %referral.id, "Referral inserted");
        Ok(())
    }

    async fn get_referral(&self, id: Uuid) -> Result<Option<Referral>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {REFERRAL_COLUMNS} FROM referrals WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_referral: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_referral(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_referral: {e}"))),
        }
    }

    async fn reschedule_referral(
        &self,
        id: Uuid,
        new_time: DateTime<Utc>,
        reason: &str,
    ) -> Result<Option<Referral>, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        // Status and date change in one statement.
        let affected = self
            .conn()
            .execute(
                "UPDATE referrals SET status = ?1, scheduled_date = ?2, status_reason = ?3, updated_at = ?4 WHERE id = ?5",
                params![
                    ReferralStatus::Scheduled.as_str(),
                    new_time.to_rfc3339(),
                    reason,
                    now,
                    id.to_string(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("reschedule_referral: {e}")))?;

        if affected == 0 {
            return Ok(None);
        }
        debug!(referral_id = %id, new_time = %new_time, "Referral rescheduled");
        self.get_referral(id).await
    }

    // ── Flags ───────────────────────────────────────────────────────

    async fn create_flag(&self, flag: &FollowUpFlag) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO flags (id, referral_id, title, description, priority, status, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    flag.id.to_string(),
                    flag.referral_id.to_string(),
                    flag.title.as_str(),
                    flag.description.as_str(),
                    flag.priority.as_str(),
                    flag.status.as_str(),
                    flag.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("create_flag: {e}")))?;

        debug!(flag_id = %flag.id, referral_id = %flag.referral_id, "Flag inserted");
        Ok(())
    }

    async fn list_flags_for_referral(
        &self,
        referral_id: Uuid,
    ) -> Result<Vec<FollowUpFlag>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {FLAG_COLUMNS} FROM flags WHERE referral_id = ?1 ORDER BY created_at ASC"
                ),
                params![referral_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_flags_for_referral: {e}")))?;

        let mut flags = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_flags_for_referral: {e}")))?
        {
            flags.push(row_to_flag(&row)?);
        }
        Ok(flags)
    }

    // ── Notifications ───────────────────────────────────────────────

    async fn create_notification_log(&self, entry: &NotificationLog) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO notification_logs (id, referral_id, notification_type, recipient, subject, status, provider_message_id, calendar_invite_attached, sent_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    entry.id.to_string(),
                    entry.referral_id.to_string(),
                    entry.kind.as_str(),
                    entry.recipient.as_str(),
                    entry.subject.as_str(),
                    entry.status.as_str(),
                    opt_text(entry.provider_message_id.as_deref()),
                    i64::from(entry.calendar_invite_attached),
                    entry.sent_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("create_notification_log: {e}")))?;

        debug!(referral_id = %entry.referral_id, kind = entry.kind.as_str(), "Notification logged");
        Ok(())
    }

    async fn list_notification_logs_for_referral(
        &self,
        referral_id: Uuid,
    ) -> Result<Vec<NotificationLog>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {NOTIFICATION_COLUMNS} FROM notification_logs WHERE referral_id = ?1 ORDER BY sent_at ASC"
                ),
                params![referral_id.to_string()],
            )
            .await
            .map_err(|e| {
                DatabaseError::Query(format!("list_notification_logs_for_referral: {e}"))
            })?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| {
            DatabaseError::Query(format!("list_notification_logs_for_referral: {e}"))
        })? {
            entries.push(row_to_notification(&row)?);
        }
        Ok(entries)
    }
}
