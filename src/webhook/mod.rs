//! Inbound call-completion webhook.

pub mod correlation;
pub mod event;
pub mod routes;
pub mod signature;

pub use routes::{AppState, WEBHOOK_PATH, WebhookAck, webhook_routes};
pub use signature::{SignatureAlgorithm, SignatureVerifier};
