//! Downstream collaborators the outcome pipeline notifies.
//!
//! Both are optional. A deployment without calendar or SMTP credentials
//! simply skips those steps.

pub mod calendar;
pub mod email;

pub use calendar::{CalendarService, GoogleCalendarClient};
pub use email::{DeliveryResult, EmailService, RescheduleNotice, SmtpEmailService};
