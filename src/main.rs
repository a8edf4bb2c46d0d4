use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use referral_webhooks::config::{
    CalendarConfig, EmailConfig, PipelineConfig, ServiceConfig, WebhookConfig,
};
use referral_webhooks::integrations::{
    CalendarService, EmailService, GoogleCalendarClient, SmtpEmailService,
};
use referral_webhooks::pipeline::{OutcomeDispatcher, OutcomeProcessor};
use referral_webhooks::store::{Database, LibSqlBackend};
use referral_webhooks::webhook::{AppState, SignatureVerifier, WEBHOOK_PATH, webhook_routes};

/// Stderr logging, plus daily rolling files when `log_dir` is set.
///
/// The returned guard flushes the file writer on drop.
fn init_tracing(log_dir: Option<&Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "referral-webhooks.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .init();
            None
        }
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown requested"),
        Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C; shutting down"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let service = ServiceConfig::from_env();
    let _log_guard = init_tracing(service.log_dir.as_deref());

    let webhook_config = WebhookConfig::from_env();
    let pipeline_config = PipelineConfig::from_env()?;
    let calendar_config = CalendarConfig::from_env()?;
    let email_config = EmailConfig::from_env()?;

    eprintln!("Referral Webhooks v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Webhook: http://{}{}", service.bind_addr, WEBHOOK_PATH);
    eprintln!("   Database: {}", service.db_path.display());
    eprintln!(
        "   Calendar sync: {}",
        if calendar_config.is_some() { "enabled" } else { "disabled" }
    );
    eprintln!(
        "   Email notifications: {}",
        if email_config.is_some() { "enabled" } else { "disabled" }
    );

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&service.db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", service.db_path.display()))?,
    );

    // ── Collaborators ────────────────────────────────────────────────────
    let calendar: Option<Arc<dyn CalendarService>> = match calendar_config {
        Some(config) => Some(Arc::new(GoogleCalendarClient::new(config)?) as Arc<dyn CalendarService>),
        None => None,
    };
    let email: Option<Arc<dyn EmailService>> = email_config
        .map(|config| Arc::new(SmtpEmailService::new(config)) as Arc<dyn EmailService>);

    let verifier = Arc::new(SignatureVerifier::from_config(&webhook_config));
    if !verifier.is_configured() {
        eprintln!("   Warning: webhook signing not configured, every delivery will get 401");
    }

    // ── Outcome pipeline ─────────────────────────────────────────────────
    let processor = Arc::new(OutcomeProcessor::new(
        Arc::clone(&db),
        calendar,
        email,
        pipeline_config.clone(),
    ));
    let (dispatcher, dispatcher_handle) = OutcomeDispatcher::spawn(processor, &pipeline_config);

    // ── HTTP ─────────────────────────────────────────────────────────────
    let app = webhook_routes(AppState {
        verifier,
        store: db,
        dispatcher,
        lookup_timeout: pipeline_config.call_timeout,
    });
    let listener = tokio::net::TcpListener::bind(&service.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", service.bind_addr))?;
    info!(addr = %service.bind_addr, "Webhook server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    // The router (and its dispatcher handle) is gone; let queued jobs finish.
    info!("HTTP server stopped, draining outcome jobs");
    if dispatcher_handle.drain(pipeline_config.shutdown_grace).await {
        info!("All outcome jobs finished");
    }

    Ok(())
}
