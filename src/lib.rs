//! Referral webhooks: call-outcome intake for the referral tracker.

pub mod config;
pub mod error;
pub mod integrations;
pub mod model;
pub mod pipeline;
pub mod store;
pub mod webhook;
