//! Core data model: jobs, schedules, payloads, run records, and the
//! session/lane identifiers derived from them.
//!
//! All types here are plain data — no I/O, no clock reads. Validation that
//! depends on engine configuration (e.g. `min_interval`) lives in
//! [`crate::store`], not here.

mod job;
mod payload;
mod run;
mod schedule;
mod session;

pub use job::{Isolation, Job, JobPatch, PostToMainMode, SessionTarget, WakeMode};
pub use payload::Payload;
pub use run::{DeliveryOutcome, Outcome, RunRecord};
pub use schedule::Schedule;
pub use session::{LastRoute, SessionKey, TriggerReason};

/// Opaque unique job identifier.
pub type JobId = String;

/// Opaque run identifier, unique per Executor invocation.
pub type RunId = String;

/// Mint a fresh [`JobId`].
pub fn new_job_id() -> JobId {
    uuid::Uuid::new_v4().to_string()
}

/// Mint a fresh [`RunId`].
pub fn new_run_id() -> RunId {
    uuid::Uuid::new_v4().to_string()
}
