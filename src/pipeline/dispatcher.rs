//! Outcome dispatcher. Runs accepted webhook deliveries off the request path.
//!
//! The HTTP handler calls [`OutcomeDispatcher::submit`] and returns. A single
//! loop drains the bounded queue and spawns one task per job, gated by a
//! semaphore. Every job ends in a [`ProcessingReport`] on a broadcast
//! channel, including jobs that panicked.
//!
//! Shutdown: once every `OutcomeDispatcher` clone is dropped the loop stops
//! taking jobs, waits for in-flight tasks and exits.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio::sync::{Semaphore, broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::DispatchError;
use crate::model::CallAttempt;
use crate::pipeline::processor::{OutcomeProcessor, ProcessingOutcome};
use crate::webhook::event::WebhookEvent;

/// Buffered reports per subscriber before it starts lagging.
const REPORT_CHANNEL_CAPACITY: usize = 256;

/// One accepted delivery waiting for processing.
#[derive(Debug, Clone)]
pub struct OutcomeJob {
    pub attempt: CallAttempt,
    pub event: WebhookEvent,
    pub received_at: DateTime<Utc>,
}

impl OutcomeJob {
    pub fn new(attempt: CallAttempt, event: WebhookEvent) -> Self {
        Self {
            attempt,
            event,
            received_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobResult {
    Completed(ProcessingOutcome),
    Failed(String),
    Panicked(String),
}

/// Published once per job.
#[derive(Debug, Clone)]
pub struct ProcessingReport {
    pub call_attempt_id: Uuid,
    pub referral_id: Uuid,
    pub result: JobResult,
    pub elapsed: Duration,
}

/// Cheap handle for submitting jobs and watching their results.
#[derive(Clone)]
pub struct OutcomeDispatcher {
    tx: mpsc::Sender<OutcomeJob>,
    reports: broadcast::Sender<ProcessingReport>,
    capacity: usize,
}

impl OutcomeDispatcher {
    /// Start the dispatch loop. The returned handle finishes after every
    /// dispatcher clone is dropped and in-flight jobs are done.
    pub fn spawn(processor: Arc<OutcomeProcessor>, config: &PipelineConfig) -> (Self, DispatcherHandle) {
        let capacity = config.queue_capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let (reports, _) = broadcast::channel(REPORT_CHANNEL_CAPACITY);

        let worker = spawn_dispatch_loop(
            rx,
            processor,
            config.max_concurrent_jobs.max(1),
            reports.clone(),
        );

        (
            Self {
                tx,
                reports,
                capacity,
            },
            DispatcherHandle { worker },
        )
    }

    /// Queue a job without waiting. Fails fast when the queue is full.
    pub fn submit(&self, job: OutcomeJob) -> Result<(), DispatchError> {
        self.tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(job) => {
                warn!(call_attempt_id = %job.attempt.id, capacity = self.capacity, "Outcome queue full");
                DispatchError::QueueFull {
                    capacity: self.capacity,
                }
            }
            mpsc::error::TrySendError::Closed(_) => DispatchError::Closed,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProcessingReport> {
        self.reports.subscribe()
    }
}

/// Owns the dispatch loop task.
pub struct DispatcherHandle {
    worker: JoinHandle<()>,
}

impl DispatcherHandle {
    /// Wait up to `grace` for queued and in-flight jobs. Returns `false` if
    /// the deadline passed first.
    pub async fn drain(self, grace: Duration) -> bool {
        match tokio::time::timeout(grace, self.worker).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!(error = %e, "Outcome dispatch loop ended abnormally");
                false
            }
            Err(_) => {
                warn!(grace_secs = grace.as_secs(), "Shutdown grace elapsed with jobs still running");
                false
            }
        }
    }
}

fn spawn_dispatch_loop(
    mut rx: mpsc::Receiver<OutcomeJob>,
    processor: Arc<OutcomeProcessor>,
    max_concurrent: usize,
    reports: broadcast::Sender<ProcessingReport>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(max_concurrent, "Outcome dispatcher started");
        let permits = Arc::new(Semaphore::new(max_concurrent));

        while let Some(job) = rx.recv().await {
            let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                break;
            };
            let processor = Arc::clone(&processor);
            let reports = reports.clone();
            tokio::spawn(async move {
                let _permit = permit;
                run_job(&processor, job, &reports).await;
            });
        }

        // All senders gone: wait for in-flight jobs to hand back their permits.
        if let Ok(all) = permits.acquire_many(max_concurrent as u32).await {
            drop(all);
        }
        info!("Outcome dispatcher stopped");
    })
}

async fn run_job(
    processor: &OutcomeProcessor,
    job: OutcomeJob,
    reports: &broadcast::Sender<ProcessingReport>,
) {
    let started = Instant::now();
    let queued_ms = (Utc::now() - job.received_at).num_milliseconds();
    debug!(call_attempt_id = %job.attempt.id, queued_ms, "Outcome job started");

    let outcome = AssertUnwindSafe(processor.process(&job.attempt, &job.event))
        .catch_unwind()
        .await;

    let result = match outcome {
        Ok(Ok(outcome)) => {
            info!(
                call_attempt_id = %job.attempt.id,
                referral_id = %job.attempt.referral_id,
                outcome = outcome.label(),
                "Outcome job completed"
            );
            JobResult::Completed(outcome)
        }
        Ok(Err(e)) => {
            error!(
                call_attempt_id = %job.attempt.id,
                referral_id = %job.attempt.referral_id,
                error = %e,
                "Outcome job failed"
            );
            JobResult::Failed(e.to_string())
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!(
                call_attempt_id = %job.attempt.id,
                referral_id = %job.attempt.referral_id,
                panic = %message,
                "Outcome job panicked"
            );
            JobResult::Panicked(message)
        }
    };

    // No subscribers is fine.
    let _ = reports.send(ProcessingReport {
        call_attempt_id: job.attempt.id,
        referral_id: job.attempt.referral_id,
        result,
        elapsed: started.elapsed(),
    });
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
