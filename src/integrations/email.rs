//! Patient email notifications over SMTP (lettre).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use secrecy::ExposeSecret;
use uuid::Uuid;

use crate::config::EmailConfig;
use crate::error::EmailError;

/// Everything needed to tell a patient their appointment moved.
#[derive(Debug, Clone, PartialEq)]
pub struct RescheduleNotice {
    pub referral_id: Uuid,
    pub to_email: String,
    pub patient_name: String,
    pub specialist_type: String,
    pub new_time: DateTime<Utc>,
    pub old_time: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub reason: String,
    /// Attach an `.ics` invite for the new time.
    pub attach_calendar: bool,
}

/// Outcome of handing a message to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryResult {
    pub success: bool,
    pub message_id: Option<String>,
}

/// Email collaborator.
#[async_trait]
pub trait EmailService: Send + Sync {
    async fn send_reschedule_notification(
        &self,
        notice: &RescheduleNotice,
    ) -> Result<DeliveryResult, EmailError>;
}

/// Subject line used for reschedule emails and their log entries.
pub fn reschedule_subject(specialist_type: &str) -> String {
    format!("Appointment Rescheduled - {specialist_type}")
}

fn format_time(dt: DateTime<Utc>) -> String {
    dt.format("%A, %B %-d, %Y at %-I:%M %p UTC").to_string()
}

fn ics_time(dt: DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Plain-text body of the reschedule email.
pub fn reschedule_body(notice: &RescheduleNotice) -> String {
    let mut lines = vec![
        format!("Hi {},", notice.patient_name),
        String::new(),
        format!(
            "Your {} appointment has been rescheduled.",
            notice.specialist_type
        ),
        String::new(),
        format!("New time: {}", format_time(notice.new_time)),
    ];
    if let Some(old) = notice.old_time {
        lines.push(format!("Previous time: {}", format_time(old)));
    }
    if let Some(location) = &notice.location {
        lines.push(format!("Location: {location}"));
    }
    lines.push(String::new());
    lines.push(format!("Reason: {}", notice.reason));
    lines.push(String::new());
    lines.push("If this time does not work for you, please contact our office.".to_string());
    lines.join("\n")
}

/// iCalendar invite for the new appointment (one hour).
pub fn reschedule_invite(notice: &RescheduleNotice, now: DateTime<Utc>) -> String {
    let end = notice.new_time + chrono::Duration::hours(1);
    [
        "BEGIN:VCALENDAR".to_string(),
        "VERSION:2.0".to_string(),
        "PRODID:-//referral-webhooks//EN".to_string(),
        "METHOD:REQUEST".to_string(),
        "BEGIN:VEVENT".to_string(),
        format!("UID:{}@referral-webhooks", notice.referral_id),
        format!("DTSTAMP:{}", ics_time(now)),
        format!("DTSTART:{}", ics_time(notice.new_time)),
        format!("DTEND:{}", ics_time(end)),
        format!("SUMMARY:{} appointment", notice.specialist_type),
        format!("DESCRIPTION:{}", notice.reason),
        "END:VEVENT".to_string(),
        "END:VCALENDAR".to_string(),
    ]
    .join("\r\n")
        + "\r\n"
}

/// SMTP-backed email service.
pub struct SmtpEmailService {
    config: EmailConfig,
}

impl SmtpEmailService {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    fn message_domain(&self) -> &str {
        self.config
            .from_address
            .rsplit_once('@')
            .map(|(_, domain)| domain.trim_end_matches('>'))
            .unwrap_or("localhost")
    }

    /// Build the full MIME message for `notice`.
    pub fn build_message(
        &self,
        notice: &RescheduleNotice,
        message_id: &str,
    ) -> Result<Message, EmailError> {
        let from: Mailbox =
            self.config
                .from_address
                .parse()
                .map_err(|e: lettre::address::AddressError| EmailError::InvalidAddress {
                    address: self.config.from_address.clone(),
                    reason: e.to_string(),
                })?;
        let to: Mailbox =
            notice
                .to_email
                .parse()
                .map_err(|e: lettre::address::AddressError| EmailError::InvalidAddress {
                    address: notice.to_email.clone(),
                    reason: e.to_string(),
                })?;

        let builder = Message::builder()
            .from(from)
            .to(to)
            .subject(reschedule_subject(&notice.specialist_type))
            .message_id(Some(message_id.to_string()));

        let text = SinglePart::plain(reschedule_body(notice));
        let message = if notice.attach_calendar {
            let ics_type = ContentType::parse("text/calendar; charset=utf-8; method=REQUEST")
                .map_err(|e| EmailError::Build(e.to_string()))?;
            let invite = Attachment::new("appointment.ics".to_string())
                .body(reschedule_invite(notice, Utc::now()), ics_type);
            builder.multipart(MultiPart::mixed().singlepart(text).singlepart(invite))
        } else {
            builder.singlepart(text)
        };
        message.map_err(|e| EmailError::Build(e.to_string()))
    }
}

#[async_trait]
impl EmailService for SmtpEmailService {
    async fn send_reschedule_notification(
        &self,
        notice: &RescheduleNotice,
    ) -> Result<DeliveryResult, EmailError> {
        let message_id = format!("<{}@{}>", Uuid::new_v4(), self.message_domain());
        let email = self.build_message(notice, &message_id)?;

        let creds = Credentials::new(
            self.config.username.clone(),
            self.config.password.expose_secret().to_string(),
        );
        // Dropping this future aborts the SMTP session.
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&self.config.smtp_host)
            .map_err(|e| EmailError::Send(format!("SMTP relay error: {e}")))?
            .port(self.config.smtp_port)
            .credentials(creds)
            .build();
        let response = transport
            .send(email)
            .await
            .map_err(|e| EmailError::Send(e.to_string()))?;

        let success = response.is_positive();
        tracing::info!(to = %notice.to_email, success, message_id = %message_id, "Reschedule email handed to SMTP");
        Ok(DeliveryResult {
            success,
            message_id: Some(message_id),
        })
    }
}
