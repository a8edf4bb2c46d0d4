//! Calendar sync via the Google Calendar v3 events API over reqwest.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use serde_json::json;
use tracing::{debug, info};

use crate::config::CalendarConfig;
use crate::error::CalendarError;

/// Calendar collaborator. Deployments without one pass `None` instead.
#[async_trait]
pub trait CalendarService: Send + Sync {
    /// Move an existing event to `new_time`.
    async fn update_event(
        &self,
        event_id: &str,
        new_time: DateTime<Utc>,
        notes: &str,
        notify_attendees: bool,
    ) -> Result<(), CalendarError>;
}

/// Google Calendar client authenticated with a bearer token.
pub struct GoogleCalendarClient {
    http: reqwest::Client,
    config: CalendarConfig,
}

impl GoogleCalendarClient {
    pub fn new(config: CalendarConfig) -> Result<Self, CalendarError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("referral-webhooks/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CalendarError::Request(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { http, config })
    }

    fn event_url(&self, event_id: &str) -> String {
        format!(
            "{}/calendars/{}/events/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.calendar_id,
            event_id
        )
    }
}

/// PATCH body moving an event to `new_time`.
fn event_patch(new_time: DateTime<Utc>, end_time: DateTime<Utc>, notes: &str) -> serde_json::Value {
    json!({
        "start": { "dateTime": new_time.to_rfc3339(), "timeZone": "UTC" },
        "end": { "dateTime": end_time.to_rfc3339(), "timeZone": "UTC" },
        "description": notes,
    })
}

#[async_trait]
impl CalendarService for GoogleCalendarClient {
    async fn update_event(
        &self,
        event_id: &str,
        new_time: DateTime<Utc>,
        notes: &str,
        notify_attendees: bool,
    ) -> Result<(), CalendarError> {
        let duration = chrono::Duration::from_std(self.config.event_duration)
            .unwrap_or_else(|_| chrono::Duration::hours(1));
        let body = event_patch(new_time, new_time + duration, notes);
        let send_updates = if notify_attendees { "all" } else { "none" };

        debug!(event_id, send_updates, "Patching calendar event");
        let response = self
            .http
            .patch(self.event_url(event_id))
            .query(&[("sendUpdates", send_updates)])
            .bearer_auth(self.config.access_token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| CalendarError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CalendarError::Api {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        info!(event_id, new_time = %new_time, "Calendar event updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use axum::Router;
    use axum::extract::{Path, Query, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::patch;
    use secrecy::SecretString;
    use tokio::net::TcpListener;

    use super::*;

    #[derive(Debug, Clone)]
    struct Captured {
        path: String,
        send_updates: Option<String>,
        auth: Option<String>,
        body: serde_json::Value,
    }

    type Sink = Arc<Mutex<Vec<Captured>>>;

    async fn handle_patch(
        State((sink, status)): State<(Sink, StatusCode)>,
        Path((calendar, event)): Path<(String, String)>,
        Query(query): Query<std::collections::HashMap<String, String>>,
        headers: HeaderMap,
        axum::Json(body): axum::Json<serde_json::Value>,
    ) -> StatusCode {
        sink.lock().unwrap().push(Captured {
            path: format!("{calendar}/{event}"),
            send_updates: query.get("sendUpdates").cloned(),
            auth: headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(String::from),
            body,
        });
        status
    }

    /// Fake Calendar API on a random port answering every PATCH with `status`.
    async fn fake_api(status: StatusCode) -> (String, Sink) {
        let sink: Sink = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route("/calendars/{calendar}/events/{event}", patch(handle_patch))
            .with_state((Arc::clone(&sink), status));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://127.0.0.1:{port}"), sink)
    }

    fn client(api_base: String) -> GoogleCalendarClient {
        GoogleCalendarClient::new(CalendarConfig {
            api_base,
            calendar_id: "clinic".into(),
            access_token: SecretString::from("token-123"),
            event_duration: Duration::from_secs(30 * 60),
        })
        .unwrap()
    }

    fn new_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-02-01T14:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[tokio::test]
    async fn patches_event_with_new_times() {
        let (base, sink) = fake_api(StatusCode::OK).await;
        client(base)
            .update_event("evt-9", new_time(), "Rescheduled via automated call.", true)
            .await
            .unwrap();

        let captured = sink.lock().unwrap().clone();
        assert_eq!(captured.len(), 1);
        let req = &captured[0];
        assert_eq!(req.path, "clinic/evt-9");
        assert_eq!(req.send_updates.as_deref(), Some("all"));
        assert_eq!(req.auth.as_deref(), Some("Bearer token-123"));
        assert_eq!(req.body["start"]["dateTime"], "2026-02-01T14:00:00+00:00");
        assert_eq!(req.body["end"]["dateTime"], "2026-02-01T14:30:00+00:00");
        assert_eq!(req.body["description"], "Rescheduled via automated call.");
    }

    #[tokio::test]
    async fn api_error_is_reported() {
        let (base, _sink) = fake_api(StatusCode::NOT_FOUND).await;
        let err = client(base)
            .update_event("missing", new_time(), "", false)
            .await
            .unwrap_err();
        assert!(matches!(err, CalendarError::Api { status: 404, .. }));
    }

    #[tokio::test]
    async fn unreachable_api_is_a_request_error() {
        let err = client("http://127.0.0.1:1".into())
            .update_event("evt", new_time(), "", false)
            .await
            .unwrap_err();
        assert!(matches!(err, CalendarError::Request(_)));
    }
}
