//! Outcome processing pipeline.
//!
//! Accepted webhook deliveries flow through:
//! 1. `OutcomeDispatcher::submit()`: bounded queue, returns immediately
//! 2. `OutcomeProcessor::process()`: terminal write on the call attempt
//! 3. `RescheduleOrchestrator` or `FollowUpFlagger`: the side effects
//!
//! The terminal write is conditional, so a redelivered event produces no
//! second set of side effects.

pub mod dispatcher;
pub mod follow_up;
pub mod outcome;
pub mod processor;
pub mod reschedule;
pub mod retry;

pub use dispatcher::{DispatcherHandle, JobResult, OutcomeDispatcher, OutcomeJob, ProcessingReport};
pub use processor::{OutcomeProcessor, ProcessingOutcome};
