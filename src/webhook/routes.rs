//! HTTP surface: the call-completion webhook and liveness endpoints.
//!
//! The POST handler authenticates, decodes, correlates and enqueues. It
//! never calls a third party, so the provider gets its acknowledgment fast.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::error::{DispatchError, WebhookError};
use crate::pipeline::{OutcomeDispatcher, OutcomeJob};
use crate::store::Database;
use crate::webhook::correlation::{Correlation, resolve};
use crate::webhook::event::decode_event;
use crate::webhook::signature::{SIGNATURE_HEADER, SignatureVerifier};

/// Path the provider posts call-completion events to.
pub const WEBHOOK_PATH: &str = "/webhooks/elevenlabs";

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub verifier: Arc<SignatureVerifier>,
    pub store: Arc<dyn Database>,
    pub dispatcher: OutcomeDispatcher,
    /// Bound on the correlation lookup done in-request.
    pub lookup_timeout: Duration,
}

/// Acknowledgment body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookAck {
    pub success: bool,
    pub message: String,
}

/// Build the Axum router with the webhook and health routes.
pub fn webhook_routes(state: AppState) -> Router {
    Router::new()
        .route(WEBHOOK_PATH, post(receive_call_completed).get(webhook_status))
        .route("/health", get(health))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "referral-webhooks"
    }))
}

async fn webhook_status() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "elevenlabs-webhook"
    }))
}

// ── Webhook ─────────────────────────────────────────────────────────────

async fn receive_call_completed(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, WebhookError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    if !state.verifier.verify(&body, signature) {
        warn!(
            has_signature = signature.is_some(),
            body_len = body.len(),
            "Rejected webhook with invalid signature"
        );
        return Err(WebhookError::InvalidSignature);
    }

    let event = decode_event(&body)?;
    let correlation = resolve(state.store.as_ref(), &event, state.lookup_timeout).await?;
    let message = correlation.ack_message();

    if let Correlation::Resolved(attempt) = correlation {
        let call_attempt_id = attempt.id;
        state.dispatcher.submit(OutcomeJob::new(attempt, event))?;
        info!(%call_attempt_id, "Webhook accepted for processing");
    }

    Ok(Json(WebhookAck {
        success: true,
        message: message.to_string(),
    }))
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            WebhookError::InvalidSignature => (StatusCode::UNAUTHORIZED, self.to_string()),
            WebhookError::InvalidPayload(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            WebhookError::Lookup(_) | WebhookError::LookupTimeout(_) => {
                error!(error = %self, "Call attempt lookup failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal error".to_string(),
                )
            }
            WebhookError::Unavailable(DispatchError::QueueFull { .. }) => {
                (StatusCode::SERVICE_UNAVAILABLE, self.to_string())
            }
            WebhookError::Unavailable(DispatchError::Closed) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Service shutting down".to_string(),
            ),
        };
        (
            status,
            Json(serde_json::json!({ "success": false, "error": message })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use secrecy::SecretString;
    use tower::ServiceExt;

    use super::*;
    use crate::config::PipelineConfig;
    use crate::error::DatabaseError;
    use crate::model::{CallAttempt, Referral};
    use crate::pipeline::{DispatcherHandle, JobResult, OutcomeProcessor};
    use crate::store::LibSqlBackend;
    use crate::webhook::signature::SignatureAlgorithm;

    struct Harness {
        app: Router,
        verifier: Arc<SignatureVerifier>,
        db: Arc<LibSqlBackend>,
        dispatcher: OutcomeDispatcher,
        _handle: DispatcherHandle,
    }

    async fn harness() -> Harness {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let config = PipelineConfig {
            call_timeout: Duration::from_secs(1),
            ..PipelineConfig::default()
        };
        let processor = Arc::new(OutcomeProcessor::new(db.clone(), None, None, config.clone()));
        let (dispatcher, handle) = OutcomeDispatcher::spawn(processor, &config);
        let verifier = Arc::new(SignatureVerifier::new(
            SecretString::from("whsec_test"),
            SignatureAlgorithm::HmacSha256,
        ));
        let app = webhook_routes(AppState {
            verifier: Arc::clone(&verifier),
            store: db.clone(),
            dispatcher: dispatcher.clone(),
            lookup_timeout: Duration::from_secs(1),
        });
        Harness {
            app,
            verifier,
            db,
            dispatcher,
            _handle: handle,
        }
    }

    fn post_signed(verifier: &SignatureVerifier, body: &str) -> Request<Body> {
        let signature = verifier.sign(body.as_bytes()).unwrap();
        Request::post(WEBHOOK_PATH)
            .header("content-type", "application/json")
            .header(SIGNATURE_HEADER, format!("sha256={signature}"))
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn read_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_endpoints_respond() {
        let h = harness().await;
        let response = h
            .app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await["status"], "ok");

        let response = h
            .app
            .oneshot(Request::get(WEBHOOK_PATH).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(
            read_json(response).await,
            serde_json::json!({"status": "ok", "service": "elevenlabs-webhook"})
        );
    }

    #[tokio::test]
    async fn unsigned_request_is_unauthorized() {
        let h = harness().await;
        let request = Request::post(WEBHOOK_PATH)
            .body(Body::from(r#"{"status":"completed","metadata":{}}"#))
            .unwrap();
        let response = h.app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        let h = harness().await;
        let response = h
            .app
            .oneshot(post_signed(&h.verifier, "{not json"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(read_json(response).await["success"], false);
    }

    #[tokio::test]
    async fn missing_call_log_id_is_acknowledged() {
        let h = harness().await;
        let response = h
            .app
            .oneshot(post_signed(&h.verifier, r#"{"status":"completed","metadata":{}}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            read_json(response).await,
            serde_json::json!({"success": true, "message": "Call log ID not found, ignoring"})
        );
    }

    #[tokio::test]
    async fn resolved_event_is_queued() {
        let h = harness().await;
        let referral = Referral::new("Kim", "Cardiology");
        h.db.insert_referral(&referral).await.unwrap();
        let attempt = CallAttempt::new(referral.id);
        h.db.insert_call_attempt(&attempt).await.unwrap();
        let mut reports = h.dispatcher.subscribe();

        let body = format!(
            r#"{{"status":"no_answer","metadata":{{"call_log_id":"{}"}}}}"#,
            attempt.id
        );
        let response = h.app.oneshot(post_signed(&h.verifier, &body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await["message"], "Webhook received, processing");

        let report = tokio::time::timeout(Duration::from_secs(5), reports.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.call_attempt_id, attempt.id);
        assert!(matches!(report.result, JobResult::Completed(_)));
    }

    #[test]
    fn error_statuses() {
        let cases = [
            (WebhookError::InvalidSignature, StatusCode::UNAUTHORIZED),
            (WebhookError::InvalidPayload("eof".into()), StatusCode::BAD_REQUEST),
            (
                WebhookError::Lookup(DatabaseError::Query("locked".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                WebhookError::LookupTimeout(Duration::from_secs(1)),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                WebhookError::Unavailable(DispatchError::QueueFull { capacity: 8 }),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                WebhookError::Unavailable(DispatchError::Closed),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}
