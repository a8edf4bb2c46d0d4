//! Follow-up flagging: hands unsuccessful calls to a human.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::model::FollowUpFlag;
use crate::pipeline::outcome::FollowUpReason;
use crate::store::Database;

/// Characters of transcript copied into a flag description.
pub const TRANSCRIPT_EXCERPT_CHARS: usize = 500;

/// `no_answer` → `No Answer`.
fn title_case(label: &str) -> String {
    label
        .split(['_', ' '])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

fn transcript_excerpt(transcript: &str) -> String {
    let excerpt: String = transcript.chars().take(TRANSCRIPT_EXCERPT_CHARS).collect();
    if transcript.chars().count() > TRANSCRIPT_EXCERPT_CHARS {
        format!("{excerpt}...")
    } else {
        excerpt
    }
}

/// Build the open flag for an unsuccessful call.
pub fn build_flag(
    referral_id: Uuid,
    reason: &FollowUpReason,
    transcript: Option<&str>,
) -> FollowUpFlag {
    let title = format!("Follow-up needed: {}", title_case(reason.label()));

    let mut lines = vec![
        format!("Automated call outcome: {}", reason.label()),
        "Patient needs manual follow-up to reschedule missed referral.".to_string(),
    ];
    if let Some(transcript) = transcript.filter(|t| !t.is_empty()) {
        lines.push(format!("\nCall transcript:\n{}", transcript_excerpt(transcript)));
    }

    FollowUpFlag::open(referral_id, title, lines.join("\n"), reason.priority())
}

/// Creates follow-up flags. One attempt per call; a failure is fatal.
pub struct FollowUpFlagger {
    store: Arc<dyn Database>,
    call_timeout: Duration,
}

impl FollowUpFlagger {
    pub fn new(store: Arc<dyn Database>, call_timeout: Duration) -> Self {
        Self {
            store,
            call_timeout,
        }
    }

    pub async fn flag(
        &self,
        referral_id: Uuid,
        reason: &FollowUpReason,
        transcript: Option<&str>,
    ) -> Result<FollowUpFlag, PipelineError> {
        let flag = build_flag(referral_id, reason, transcript);

        let result = match tokio::time::timeout(self.call_timeout, self.store.create_flag(&flag)).await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("timed out after {:?}", self.call_timeout)),
        };

        match result {
            Ok(()) => {
                info!(
                    %referral_id,
                    flag_id = %flag.id,
                    priority = %flag.priority,
                    reason = reason.label(),
                    "Follow-up flag created"
                );
                Ok(flag)
            }
            Err(reason) => {
                error!(%referral_id, error = %reason, "Follow-up flag creation failed");
                Err(PipelineError::FlagCreation {
                    referral_id,
                    reason,
                })
            }
        }
    }
}
