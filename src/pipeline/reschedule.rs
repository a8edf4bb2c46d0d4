//! Reschedule orchestration, the happy path of an automated call.
//!
//! The referral write is the only fatal step. Calendar sync and the patient
//! email run concurrently afterwards and never fail the job.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{CalendarError, EmailError, PipelineError};
use crate::integrations::email::reschedule_subject;
use crate::integrations::{CalendarService, EmailService, RescheduleNotice};
use crate::model::{NotificationKind, NotificationLog, NotificationStatus, Referral};
use crate::pipeline::retry::{RetryPolicy, bounded};
use crate::store::Database;

/// Reason recorded on the referral and in calendar notes.
pub const RESCHEDULE_REASON: &str = "Rescheduled via automated call";

/// What the orchestrator managed to do.
#[derive(Debug, Clone, PartialEq)]
pub struct RescheduleReport {
    /// Referral as stored after the update.
    pub referral: Referral,
    pub calendar_synced: bool,
    pub email_sent: bool,
}

pub struct RescheduleOrchestrator {
    store: Arc<dyn Database>,
    calendar: Option<Arc<dyn CalendarService>>,
    email: Option<Arc<dyn EmailService>>,
    retry: RetryPolicy,
    call_timeout: Duration,
}

impl RescheduleOrchestrator {
    pub fn new(
        store: Arc<dyn Database>,
        calendar: Option<Arc<dyn CalendarService>>,
        email: Option<Arc<dyn EmailService>>,
        retry: RetryPolicy,
        call_timeout: Duration,
    ) -> Self {
        Self {
            store,
            calendar,
            email,
            retry,
            call_timeout,
        }
    }

    /// Move the referral to `new_time`, then notify calendar and patient.
    pub async fn reschedule(
        &self,
        referral_id: Uuid,
        new_time: DateTime<Utc>,
    ) -> Result<RescheduleReport, PipelineError> {
        let previous = self
            .retry
            .run("get_referral", || {
                bounded("get_referral", self.call_timeout, self.store.get_referral(referral_id))
            })
            .await?
            .ok_or(PipelineError::ReferralNotFound { id: referral_id })?;

        let updated = self
            .retry
            .run("reschedule_referral", || {
                bounded(
                    "reschedule_referral",
                    self.call_timeout,
                    self.store
                        .reschedule_referral(referral_id, new_time, RESCHEDULE_REASON),
                )
            })
            .await?
            .ok_or(PipelineError::RescheduleNotApplied { referral_id })?;

        info!(
            %referral_id,
            old_time = ?previous.scheduled_date,
            new_time = %new_time,
            "Referral rescheduled"
        );

        let (calendar_synced, email_sent) = tokio::join!(
            self.sync_calendar(&updated, new_time),
            self.notify_patient(&updated, previous.scheduled_date, new_time),
        );

        Ok(RescheduleReport {
            referral: updated,
            calendar_synced,
            email_sent,
        })
    }

    async fn sync_calendar(&self, referral: &Referral, new_time: DateTime<Utc>) -> bool {
        let (Some(calendar), Some(event_id)) = (&self.calendar, referral.calendar_event_id.as_deref())
        else {
            debug!(referral_id = %referral.id, "No calendar event to update");
            return false;
        };

        let notes = match referral.notes.as_deref() {
            Some(notes) if !notes.is_empty() => format!("{RESCHEDULE_REASON}. {notes}"),
            _ => format!("{RESCHEDULE_REASON}."),
        };

        let result = tokio::time::timeout(
            self.call_timeout,
            calendar.update_event(event_id, new_time, &notes, true),
        )
        .await
        .unwrap_or(Err(CalendarError::Timeout(self.call_timeout)));

        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(referral_id = %referral.id, event_id, error = %e, "Calendar sync failed, continuing");
                false
            }
        }
    }

    async fn notify_patient(
        &self,
        referral: &Referral,
        old_time: Option<DateTime<Utc>>,
        new_time: DateTime<Utc>,
    ) -> bool {
        let (Some(email), Some(to_email)) = (&self.email, referral.patient_email.as_deref()) else {
            debug!(referral_id = %referral.id, "No patient email to send");
            return false;
        };

        let notice = RescheduleNotice {
            referral_id: referral.id,
            to_email: to_email.to_string(),
            patient_name: referral.patient_name.clone(),
            specialist_type: referral.specialist_type.clone(),
            new_time,
            old_time,
            location: None,
            reason: RESCHEDULE_REASON.to_string(),
            attach_calendar: true,
        };

        let result = tokio::time::timeout(self.call_timeout, email.send_reschedule_notification(&notice))
            .await
            .unwrap_or(Err(EmailError::Timeout(self.call_timeout)));

        let delivery = match result {
            Ok(delivery) => delivery,
            Err(e) => {
                warn!(referral_id = %referral.id, error = %e, "Reschedule email failed, continuing");
                return false;
            }
        };
        if !delivery.success {
            warn!(referral_id = %referral.id, "SMTP server did not accept reschedule email");
        }

        let entry = NotificationLog {
            id: Uuid::new_v4(),
            referral_id: referral.id,
            kind: NotificationKind::AppointmentRescheduled,
            recipient: notice.to_email.clone(),
            subject: reschedule_subject(&notice.specialist_type),
            status: if delivery.success {
                NotificationStatus::Sent
            } else {
                NotificationStatus::Failed
            },
            provider_message_id: delivery.message_id.clone(),
            calendar_invite_attached: notice.attach_calendar,
            sent_at: Utc::now(),
        };
        if let Err(e) = bounded(
            "create_notification_log",
            self.call_timeout,
            self.store.create_notification_log(&entry),
        )
        .await
        {
            warn!(referral_id = %referral.id, error = %e, "Failed to record notification log");
        }

        delivery.success
    }
}
