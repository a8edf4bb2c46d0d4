//! Inbound call-completion event and its decoder.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, de};
use uuid::Uuid;

use crate::error::WebhookError;

/// Call-completion event as delivered by the calling provider.
///
/// `status` and `outcome` stay free text here; the outcome mapper decides
/// what they mean. Unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    /// Provider-side call identifier.
    #[serde(default)]
    pub call_id: Option<String>,
    pub status: String,
    #[serde(default)]
    pub outcome: Option<String>,
    /// Agreed appointment time, present when the patient rescheduled.
    #[serde(default, deserialize_with = "deserialize_appointment_time")]
    pub new_appointment_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub transcript: Option<String>,
    #[serde(default, deserialize_with = "deserialize_duration_seconds")]
    pub duration_seconds: Option<u32>,
    /// Provider-echoed correlation payload.
    pub metadata: CorrelationMetadata,
}

/// Metadata we attached when placing the call, echoed back by the provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMetadata {
    /// Internal call attempt id.
    #[serde(default)]
    pub call_log_id: Option<String>,
    #[serde(default)]
    pub referral_id: Option<String>,
}

impl CorrelationMetadata {
    /// The call attempt id, if present and well-formed.
    pub fn call_attempt_id(&self) -> Option<Uuid> {
        self.call_log_id
            .as_deref()
            .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
    }
}

/// Formats accepted for an appointment time without an offset. Read as UTC.
const NAIVE_TIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

fn parse_appointment_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(time) = DateTime::parse_from_rfc3339(raw) {
        return Some(time.with_timezone(&Utc));
    }
    NAIVE_TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

/// RFC 3339, or a naive timestamp taken as UTC.
fn deserialize_appointment_time<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(raw) => parse_appointment_time(&raw)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("invalid appointment time: {raw}"))),
    }
}

/// Whole seconds. Integral floats such as `95.0` are accepted.
fn deserialize_duration_seconds<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<f64>::deserialize(deserializer)? {
        None => Ok(None),
        Some(secs) if secs.fract() == 0.0 && (0.0..=f64::from(u32::MAX)).contains(&secs) => {
            Ok(Some(secs as u32))
        }
        Some(secs) => Err(de::Error::custom(format!(
            "duration_seconds must be a whole number of seconds, got {secs}"
        ))),
    }
}

/// Decode an already-authenticated body.
pub fn decode_event(body: &[u8]) -> Result<WebhookEvent, WebhookError> {
    serde_json::from_slice(body).map_err(|e| WebhookError::InvalidPayload(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_full_payload() {
        let body = br#"{
            "call_id": "el-call-uuid",
            "status": "completed",
            "outcome": "rescheduled",
            "new_appointment_time": "2026-02-01T14:00:00Z",
            "transcript": "Sure, Sunday works.",
            "duration_seconds": 120,
            "metadata": {
                "referral_id": "8b1e6bde-94a4-4c1a-9e0b-7b1f3c8f2a11",
                "call_log_id": "0c8a3f4e-5d2b-4b8e-9a61-2f7d1e3c4b5a"
            }
        }"#;
        let event = decode_event(body).unwrap();
        assert_eq!(event.status, "completed");
        assert_eq!(event.outcome.as_deref(), Some("rescheduled"));
        assert_eq!(
            event.new_appointment_time.unwrap().to_rfc3339(),
            "2026-02-01T14:00:00+00:00"
        );
        assert_eq!(event.duration_seconds, Some(120));
        assert_eq!(
            event.metadata.call_attempt_id().unwrap().to_string(),
            "0c8a3f4e-5d2b-4b8e-9a61-2f7d1e3c4b5a"
        );
    }

    #[test]
    fn ignores_unknown_fields() {
        let body = br#"{"status":"no_answer","metadata":{"extra":1},"agent_id":"x"}"#;
        let event = decode_event(body).unwrap();
        assert_eq!(event.status, "no_answer");
        assert!(event.outcome.is_none());
        assert!(event.metadata.call_attempt_id().is_none());
    }

    #[test]
    fn missing_required_fields_rejected() {
        assert!(matches!(
            decode_event(br#"{"metadata":{}}"#),
            Err(WebhookError::InvalidPayload(_))
        ));
        assert!(matches!(
            decode_event(br#"{"status":"completed"}"#),
            Err(WebhookError::InvalidPayload(_))
        ));
    }

    #[test]
    fn malformed_json_and_bad_types_rejected() {
        assert!(decode_event(b"{not json").is_err());
        assert!(decode_event(br#"{"status":5,"metadata":{}}"#).is_err());
        assert!(
            decode_event(br#"{"status":"completed","metadata":{},"new_appointment_time":"soon"}"#)
                .is_err()
        );
    }

    #[test]
    fn naive_appointment_time_is_read_as_utc() {
        for raw in ["2026-02-01T14:00:00", "2026-02-01 14:00:00", "2026-02-01T14:00:00.000"] {
            let body = format!(
                r#"{{"status":"completed","metadata":{{}},"new_appointment_time":"{raw}"}}"#
            );
            let event = decode_event(body.as_bytes()).unwrap();
            assert_eq!(
                event.new_appointment_time.unwrap().to_rfc3339(),
                "2026-02-01T14:00:00+00:00",
                "{raw}"
            );
        }
    }

    #[test]
    fn offset_appointment_time_is_converted_to_utc() {
        let body = br#"{"status":"completed","metadata":{},"new_appointment_time":"2026-02-01T09:00:00-05:00"}"#;
        let event = decode_event(body).unwrap();
        assert_eq!(
            event.new_appointment_time.unwrap().to_rfc3339(),
            "2026-02-01T14:00:00+00:00"
        );
    }

    #[test]
    fn null_optional_fields_are_absent() {
        let body = br#"{"status":"completed","metadata":{},"new_appointment_time":null,"duration_seconds":null}"#;
        let event = decode_event(body).unwrap();
        assert!(event.new_appointment_time.is_none());
        assert!(event.duration_seconds.is_none());
    }

    #[test]
    fn integral_float_duration_is_accepted() {
        let body = br#"{"status":"completed","metadata":{},"duration_seconds":95.0}"#;
        assert_eq!(decode_event(body).unwrap().duration_seconds, Some(95));

        for bad in ["95.5", "-3"] {
            let body = format!(r#"{{"status":"completed","metadata":{{}},"duration_seconds":{bad}}}"#);
            assert!(decode_event(body.as_bytes()).is_err(), "{bad}");
        }
    }

    #[test]
    fn non_uuid_correlation_id_is_absent() {
        let meta = CorrelationMetadata {
            call_log_id: Some("test-ping".into()),
            referral_id: None,
        };
        assert!(meta.call_attempt_id().is_none());
    }
}
