//! Configuration types, built from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Read an optional env var, treating empty strings as unset.
fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Parse an optional env var, falling back to `default` when unset.
fn env_parse<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env_opt(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{raw}': {e}"),
        }),
        None => Ok(default),
    }
}

/// Process-level settings.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address the HTTP server binds to.
    pub bind_addr: String,
    /// libSQL database file.
    pub db_path: PathBuf,
    /// Directory for daily rolling log files. Stderr only when unset.
    pub log_dir: Option<PathBuf>,
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        Self {
            bind_addr: env_opt("REFERRAL_WEBHOOKS_BIND")
                .unwrap_or_else(|| "0.0.0.0:8000".to_string()),
            db_path: env_opt("REFERRAL_WEBHOOKS_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data/referrals.db")),
            log_dir: env_opt("REFERRAL_WEBHOOKS_LOG_DIR").map(PathBuf::from),
        }
    }
}

/// Webhook signing settings.
///
/// Both fields are required for verification to ever succeed; a missing
/// value makes every delivery fail signature checks.
#[derive(Debug, Clone, Default)]
pub struct WebhookConfig {
    pub signing_secret: Option<SecretString>,
    /// Algorithm identifier, e.g. `sha256`.
    pub algorithm: Option<String>,
}

impl WebhookConfig {
    pub fn from_env() -> Self {
        Self {
            signing_secret: env_opt("ELEVENLABS_WEBHOOK_SECRET").map(SecretString::from),
            algorithm: env_opt("ELEVENLABS_WEBHOOK_ALGORITHM"),
        }
    }
}

/// Outcome pipeline tuning.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum outcome jobs processed at once.
    pub max_concurrent_jobs: usize,
    /// Accepted-but-not-started jobs held before the endpoint sheds load.
    pub queue_capacity: usize,
    /// Bound on every store, calendar and email call.
    pub call_timeout: Duration,
    /// Attempts for the fatal state writes (call attempt, referral).
    pub state_update_attempts: u32,
    /// First retry delay; doubles per attempt.
    pub retry_base_delay: Duration,
    /// Cap on the exponential part of the retry delay.
    pub retry_max_delay: Duration,
    /// How long shutdown waits for in-flight jobs.
    pub shutdown_grace: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 16,
            queue_capacity: 256,
            call_timeout: Duration::from_secs(10),
            state_update_attempts: 3,
            retry_base_delay: Duration::from_millis(200),
            retry_max_delay: Duration::from_secs(2),
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            max_concurrent_jobs: env_parse(
                "PIPELINE_MAX_CONCURRENT_JOBS",
                defaults.max_concurrent_jobs,
            )?,
            queue_capacity: env_parse("PIPELINE_QUEUE_CAPACITY", defaults.queue_capacity)?,
            call_timeout: Duration::from_secs(env_parse(
                "PIPELINE_CALL_TIMEOUT_SECS",
                defaults.call_timeout.as_secs(),
            )?),
            state_update_attempts: env_parse(
                "PIPELINE_STATE_UPDATE_ATTEMPTS",
                defaults.state_update_attempts,
            )?,
            retry_base_delay: Duration::from_millis(env_parse(
                "PIPELINE_RETRY_BASE_DELAY_MS",
                defaults.retry_base_delay.as_millis() as u64,
            )?),
            retry_max_delay: defaults.retry_max_delay,
            shutdown_grace: Duration::from_secs(env_parse(
                "PIPELINE_SHUTDOWN_GRACE_SECS",
                defaults.shutdown_grace.as_secs(),
            )?),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_jobs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "PIPELINE_MAX_CONCURRENT_JOBS".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "PIPELINE_QUEUE_CAPACITY".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.state_update_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "PIPELINE_STATE_UPDATE_ATTEMPTS".into(),
                message: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

/// Google Calendar adapter settings. `None` disables calendar sync.
#[derive(Debug, Clone)]
pub struct CalendarConfig {
    pub api_base: String,
    pub calendar_id: String,
    pub access_token: SecretString,
    /// Length given to a rescheduled event.
    pub event_duration: Duration,
}

impl CalendarConfig {
    pub const DEFAULT_API_BASE: &'static str = "https://www.googleapis.com/calendar/v3";

    /// Returns `Ok(None)` if `GOOGLE_CALENDAR_ACCESS_TOKEN` is not set.
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(token) = env_opt("GOOGLE_CALENDAR_ACCESS_TOKEN") else {
            return Ok(None);
        };
        let minutes: u64 = env_parse("GOOGLE_CALENDAR_EVENT_MINUTES", 60)?;
        Ok(Some(Self {
            api_base: env_opt("GOOGLE_CALENDAR_API_BASE")
                .unwrap_or_else(|| Self::DEFAULT_API_BASE.to_string()),
            calendar_id: env_opt("GOOGLE_CALENDAR_ID").unwrap_or_else(|| "primary".to_string()),
            access_token: SecretString::from(token),
            event_duration: Duration::from_secs(minutes * 60),
        }))
    }
}

/// SMTP settings for patient emails. `None` disables email notifications.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

impl EmailConfig {
    /// Returns `Ok(None)` if `SMTP_HOST` is not set.
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(smtp_host) = env_opt("SMTP_HOST") else {
            return Ok(None);
        };
        let username = env_opt("SMTP_USERNAME").unwrap_or_default();
        let from_address = env_opt("EMAIL_FROM_ADDRESS").unwrap_or_else(|| username.clone());
        if from_address.is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "EMAIL_FROM_ADDRESS".into(),
                hint: "Set EMAIL_FROM_ADDRESS or SMTP_USERNAME when SMTP_HOST is set.".into(),
            });
        }
        Ok(Some(Self {
            smtp_host,
            smtp_port: env_parse("SMTP_PORT", 587)?,
            username,
            password: SecretString::from(env_opt("SMTP_PASSWORD").unwrap_or_default()),
            from_address,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.state_update_attempts, 3);
        assert_eq!(config.call_timeout, Duration::from_secs(10));
    }

    #[test]
    fn zero_workers_rejected() {
        let config = PipelineConfig {
            max_concurrent_jobs: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn webhook_config_default_has_no_secret() {
        let config = WebhookConfig::default();
        assert!(config.signing_secret.is_none());
        assert!(config.algorithm.is_none());
    }
}
