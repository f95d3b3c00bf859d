use async_trait::async_trait;

use crate::model::{Job, JobId, JobPatch, RunRecord};

use super::JobStoreError;

/// A job returned by [`JobStore::claim_due`], paired with the due instant
/// the Scheduler observed when it claimed the lease.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub job: Job,
    pub due_at_ms: i64,
}

/// Durable catalog of jobs and their run history (§4.2).
///
/// A single authoritative instance lives inside one gateway process; the
/// store is not designed to be shared by concurrent writers from outside
/// the process (§9, "single-process singleton catalog").
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn list(&self) -> Result<Vec<Job>, JobStoreError>;
    async fn get(&self, job_id: &JobId) -> Result<Job, JobStoreError>;
    async fn add(&self, job: Job) -> Result<Job, JobStoreError>;
    async fn update(&self, job_id: &JobId, patch: JobPatch) -> Result<Job, JobStoreError>;
    async fn remove(&self, job_id: &JobId) -> Result<(), JobStoreError>;

    /// Atomically claim up to `max_batch` jobs whose `next_due <= at_ms`,
    /// are `enabled`, and are not already under an outstanding lease.
    /// Claimed jobs receive a lease valid until `at_ms + lease_ttl_ms`.
    async fn claim_due(
        &self,
        at_ms: i64,
        max_batch: usize,
        lease_ttl_ms: i64,
    ) -> Result<Vec<ClaimedJob>, JobStoreError>;

    /// Commit the recurrence step for `job_id`: `previous_due` is a CAS
    /// token — if the job's current `next_due_ms` no longer matches it
    /// (e.g. another actor already advanced it), the call is a no-op and
    /// returns `Ok(false)`. `new_due = None` marks the job complete
    /// (one-shot) or, combined with `delete_after_run`, deletes it.
    async fn advance(
        &self,
        job_id: &JobId,
        previous_due_ms: i64,
        new_due_ms: Option<i64>,
    ) -> Result<bool, JobStoreError>;

    async fn append_run(&self, record: RunRecord) -> Result<(), JobStoreError>;
    async fn runs(&self, job_id: &JobId, limit: Option<usize>) -> Result<Vec<RunRecord>, JobStoreError>;

    /// `true` once disk I/O has started failing; drives the `degraded`
    /// health state (§6).
    async fn is_available(&self) -> bool;
}
