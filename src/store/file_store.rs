//! JSON-catalog-backed [`JobStore`] implementation.
//!
//! Grounded on `config::loader::save_config`'s atomic-write idiom
//! (write `.tmp` → backup existing as `.bak` → rename); the teacher's own
//! scheduler instead persisted into SQLite via diesel, which we deliberately
//! step back from per the spec's plain-JSON-catalog requirement (see
//! DESIGN.md).

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Job, JobId, JobPatch, RunRecord};
use crate::trigger::{self, Due};

use super::{ClaimedJob, JobStore, JobStoreError};

#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogFile {
    version: u64,
    jobs: Vec<Job>,
}

struct Catalog {
    jobs: HashMap<JobId, Job>,
    version: u64,
}

pub struct FileJobStore {
    catalog: Mutex<Catalog>,
    cron_dir: PathBuf,
    runs_dir: PathBuf,
    max_history_per_job: usize,
    available: AtomicBool,
}

impl FileJobStore {
    /// Load (or create) the catalog rooted at `<state_dir>/cron`.
    pub fn open(state_dir: &Path, max_history_per_job: usize) -> Result<Self, JobStoreError> {
        let cron_dir = state_dir.join("cron");
        let runs_dir = cron_dir.join("runs");
        fs::create_dir_all(&runs_dir)?;

        let jobs_path = cron_dir.join("jobs.json");
        let (jobs, version) = match fs::read_to_string(&jobs_path) {
            Ok(content) => {
                let file: CatalogFile = serde_json::from_str(&content)?;
                let jobs = file.jobs.into_iter().map(|j| (j.job_id.clone(), j)).collect();
                (jobs, file.version)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (HashMap::new(), 0),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            catalog: Mutex::new(Catalog { jobs, version }),
            cron_dir,
            runs_dir,
            max_history_per_job,
            available: AtomicBool::new(true),
        })
    }

    fn jobs_path(&self) -> PathBuf {
        self.cron_dir.join("jobs.json")
    }

    fn run_log_path(&self, job_id: &JobId) -> PathBuf {
        self.runs_dir.join(format!("{job_id}.jsonl"))
    }

    /// Atomic write-temp → backup → rename, mirroring the config loader.
    fn persist(&self, catalog: &Catalog) -> Result<(), JobStoreError> {
        let mut jobs: Vec<Job> = catalog.jobs.values().cloned().collect();
        jobs.sort_by_key(|j| j.created_at);
        let file = CatalogFile {
            version: catalog.version,
            jobs,
        };
        let content = serde_json::to_string_pretty(&file)?;

        let path = self.jobs_path();
        let tmp_path = path.with_extension("json.tmp");
        let result = (|| -> Result<(), JobStoreError> {
            fs::write(&tmp_path, &content)?;
            if path.exists() {
                let bak_path = path.with_extension("json.bak");
                fs::copy(&path, &bak_path)?;
            }
            fs::rename(&tmp_path, &path)?;
            Ok(())
        })();

        match &result {
            Ok(()) => self.available.store(true, Ordering::SeqCst),
            Err(_) => self.available.store(false, Ordering::SeqCst),
        }
        result
    }

    fn validate_schedule(schedule: &crate::model::Schedule, min_interval_ms: i64) -> Result<(), JobStoreError> {
        use crate::model::Schedule;
        match schedule {
            Schedule::At { .. } => Ok(()),
            Schedule::Every { every_ms } => {
                if *every_ms < min_interval_ms {
                    Err(JobStoreError::InvalidSchedule(format!(
                        "every_ms={every_ms} is below the configured minimum of {min_interval_ms}ms"
                    )))
                } else {
                    Ok(())
                }
            }
            Schedule::Cron { expr, tz } => {
                trigger::cron::validate(expr)?;
                if let Some(tz) = tz {
                    crate::tz::resolve_tz(Some(tz))?;
                }
                Ok(())
            }
        }
    }

    fn compute_initial_due(job: &Job) -> Result<Option<i64>, JobStoreError> {
        let due = trigger::next_due(&job.schedule, job.created_at, None, job.created_at)?;
        Ok(match due {
            Due::At(at) => Some(at.timestamp_millis()),
            Due::Done => None,
        })
    }

    /// `min_interval_ms` is read from `EngineConfig` at construction time by
    /// callers; exposed here so [`FileJobStore::open`] can stay config-free
    /// and testable without the `config` module.
    pub fn with_min_interval(self, min_interval_ms: i64) -> ValidatingJobStore {
        ValidatingJobStore {
            inner: self,
            min_interval_ms,
        }
    }

    fn append_run_log(&self, record: &RunRecord) -> Result<(), JobStoreError> {
        let path = self.run_log_path(&record.job_id);
        let line = serde_json::to_string(record)?;
        use std::io::Write;
        let mut file = fs::OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(file, "{line}")?;
        self.prune_run_log(&path)?;
        Ok(())
    }

    fn prune_run_log(&self, path: &Path) -> Result<(), JobStoreError> {
        let content = fs::read_to_string(path)?;
        let lines: Vec<&str> = content.lines().collect();
        if lines.len() <= self.max_history_per_job {
            return Ok(());
        }
        let start = lines.len() - self.max_history_per_job;
        let trimmed = lines[start..].join("\n") + "\n";
        fs::write(path, trimmed)?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for FileJobStore {
    async fn list(&self) -> Result<Vec<Job>, JobStoreError> {
        let catalog = self.catalog.lock().expect("catalog mutex poisoned");
        let mut jobs: Vec<Job> = catalog.jobs.values().cloned().collect();
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }

    async fn get(&self, job_id: &JobId) -> Result<Job, JobStoreError> {
        let catalog = self.catalog.lock().expect("catalog mutex poisoned");
        catalog
            .jobs
            .get(job_id)
            .cloned()
            .ok_or_else(|| JobStoreError::NotFound(job_id.clone()))
    }

    async fn add(&self, mut job: Job) -> Result<Job, JobStoreError> {
        job.next_due_ms = Self::compute_initial_due(&job)?;
        let mut catalog = self.catalog.lock().expect("catalog mutex poisoned");
        catalog.jobs.insert(job.job_id.clone(), job.clone());
        catalog.version += 1;
        self.persist(&catalog)?;
        Ok(job)
    }

    async fn update(&self, job_id: &JobId, patch: JobPatch) -> Result<Job, JobStoreError> {
        let mut catalog = self.catalog.lock().expect("catalog mutex poisoned");
        let job = catalog
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| JobStoreError::NotFound(job_id.clone()))?;
        let schedule_replaced = patch.schedule.is_some();
        job.apply_patch(patch, Utc::now())?;
        if schedule_replaced {
            job.next_due_ms = Self::compute_initial_due(job)?;
        }
        let updated = job.clone();
        catalog.version += 1;
        self.persist(&catalog)?;
        Ok(updated)
    }

    async fn remove(&self, job_id: &JobId) -> Result<(), JobStoreError> {
        let mut catalog = self.catalog.lock().expect("catalog mutex poisoned");
        catalog.jobs.remove(job_id);
        catalog.version += 1;
        self.persist(&catalog)?;
        Ok(())
    }

    async fn claim_due(
        &self,
        at_ms: i64,
        max_batch: usize,
        lease_ttl_ms: i64,
    ) -> Result<Vec<ClaimedJob>, JobStoreError> {
        let mut catalog = self.catalog.lock().expect("catalog mutex poisoned");

        let mut candidates: Vec<JobId> = catalog
            .jobs
            .values()
            .filter(|j| j.enabled && !j.is_claimed(at_ms))
            .filter(|j| matches!(j.next_due_ms, Some(due) if due <= at_ms))
            .map(|j| j.job_id.clone())
            .collect();
        candidates.sort_by_key(|id| catalog.jobs[id].created_at);
        candidates.truncate(max_batch);

        let mut claimed = Vec::with_capacity(candidates.len());
        for id in &candidates {
            let job = catalog.jobs.get_mut(id).expect("candidate exists");
            let due_at_ms = job.next_due_ms.expect("filtered on Some above");
            job.claimed_until_ms = Some(at_ms + lease_ttl_ms);
            claimed.push(ClaimedJob {
                job: job.clone(),
                due_at_ms,
            });
        }

        if !claimed.is_empty() {
            catalog.version += 1;
            self.persist(&catalog)?;
        }
        Ok(claimed)
    }

    async fn advance(
        &self,
        job_id: &JobId,
        previous_due_ms: i64,
        new_due_ms: Option<i64>,
    ) -> Result<bool, JobStoreError> {
        let mut catalog = self.catalog.lock().expect("catalog mutex poisoned");
        let Some(job) = catalog.jobs.get_mut(job_id) else {
            return Ok(false);
        };
        if job.next_due_ms != Some(previous_due_ms) {
            // Another actor already advanced this job past our view; drop
            // without re-queuing (§4.4 partial-failure semantics).
            return Ok(false);
        }
        job.last_due_ms = Some(previous_due_ms);
        job.next_due_ms = new_due_ms;
        job.claimed_until_ms = None;
        catalog.version += 1;
        self.persist(&catalog)?;
        Ok(true)
    }

    async fn append_run(&self, record: RunRecord) -> Result<(), JobStoreError> {
        self.append_run_log(&record)
    }

    async fn runs(&self, job_id: &JobId, limit: Option<usize>) -> Result<Vec<RunRecord>, JobStoreError> {
        let path = self.run_log_path(job_id);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut records: Vec<RunRecord> = content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(serde_json::from_str)
            .collect::<Result<_, _>>()?;
        if let Some(limit) = limit {
            if records.len() > limit {
                records = records.split_off(records.len() - limit);
            }
        }
        Ok(records)
    }

    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}

/// Thin wrapper enforcing `every_ms >= min_interval` and cron parseability
/// at `add`/`update` time, per §4.2's `InvalidSchedule` failure mode. Kept
/// separate from [`FileJobStore`] so the base store stays config-free and
/// directly testable.
pub struct ValidatingJobStore {
    inner: FileJobStore,
    min_interval_ms: i64,
}

#[async_trait]
impl JobStore for ValidatingJobStore {
    async fn list(&self) -> Result<Vec<Job>, JobStoreError> {
        self.inner.list().await
    }

    async fn get(&self, job_id: &JobId) -> Result<Job, JobStoreError> {
        self.inner.get(job_id).await
    }

    async fn add(&self, job: Job) -> Result<Job, JobStoreError> {
        FileJobStore::validate_schedule(&job.schedule, self.min_interval_ms)?;
        self.inner.add(job).await
    }

    async fn update(&self, job_id: &JobId, patch: JobPatch) -> Result<Job, JobStoreError> {
        if let Some(schedule) = &patch.schedule {
            FileJobStore::validate_schedule(schedule, self.min_interval_ms)?;
        }
        self.inner.update(job_id, patch).await
    }

    async fn remove(&self, job_id: &JobId) -> Result<(), JobStoreError> {
        self.inner.remove(job_id).await
    }

    async fn claim_due(
        &self,
        at_ms: i64,
        max_batch: usize,
        lease_ttl_ms: i64,
    ) -> Result<Vec<ClaimedJob>, JobStoreError> {
        self.inner.claim_due(at_ms, max_batch, lease_ttl_ms).await
    }

    async fn advance(
        &self,
        job_id: &JobId,
        previous_due_ms: i64,
        new_due_ms: Option<i64>,
    ) -> Result<bool, JobStoreError> {
        self.inner.advance(job_id, previous_due_ms, new_due_ms).await
    }

    async fn append_run(&self, record: RunRecord) -> Result<(), JobStoreError> {
        self.inner.append_run(record).await
    }

    async fn runs(&self, job_id: &JobId, limit: Option<usize>) -> Result<Vec<RunRecord>, JobStoreError> {
        self.inner.runs(job_id, limit).await
    }

    async fn is_available(&self) -> bool {
        self.inner.is_available().await
    }
}

#[allow(unused)]
fn _assert_datetime_used(_: DateTime<Utc>) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Payload, Schedule, SessionTarget, WakeMode};
    use tempfile::TempDir;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc)
    }

    fn main_job(name: &str, at_ms: i64) -> Job {
        Job::new(
            None,
            name.to_string(),
            None,
            Some("agent-a".to_string()),
            Schedule::At { at_ms },
            SessionTarget::Main,
            WakeMode::Now,
            Payload::SystemEvent { text: "hi".into() },
            None,
            true,
            true,
            now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn add_then_get_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = FileJobStore::open(dir.path(), 200).unwrap();
        let job = main_job("R", 1_738_262_400_000);
        let job_id = job.job_id.clone();
        let added = store.add(job).await.unwrap();
        let fetched = store.get(&job_id).await.unwrap();
        assert_eq!(added.job_id, fetched.job_id);
        assert_eq!(fetched.next_due_ms, Some(1_738_262_400_000));
    }

    #[tokio::test]
    async fn claim_due_respects_enabled_and_due_time() {
        let dir = TempDir::new().unwrap();
        let store = FileJobStore::open(dir.path(), 200).unwrap();
        let job = store.add(main_job("R", 1_000)).await.unwrap();

        let claimed = store.claim_due(500, 10, 60_000).await.unwrap();
        assert!(claimed.is_empty(), "not due yet");

        let claimed = store.claim_due(1_000, 10, 60_000).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].job.job_id, job.job_id);

        // Leased: a second claim at the same instant should not re-claim it.
        let claimed_again = store.claim_due(1_000, 10, 60_000).await.unwrap();
        assert!(claimed_again.is_empty());
    }

    #[tokio::test]
    async fn claimed_lease_expires_and_is_reclaimable() {
        let dir = TempDir::new().unwrap();
        let store = FileJobStore::open(dir.path(), 200).unwrap();
        store.add(main_job("R", 1_000)).await.unwrap();
        store.claim_due(1_000, 10, 5_000).await.unwrap();

        // Still leased shortly after.
        assert!(store.claim_due(2_000, 10, 5_000).await.unwrap().is_empty());
        // Lease (until 6_000) has expired by 7_000.
        assert_eq!(store.claim_due(7_000, 10, 5_000).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn advance_cas_rejects_stale_previous_due() {
        let dir = TempDir::new().unwrap();
        let store = FileJobStore::open(dir.path(), 200).unwrap();
        let job = store.add(main_job("R", 1_000)).await.unwrap();

        let ok = store.advance(&job.job_id, 999, None).await.unwrap();
        assert!(!ok, "stale CAS token must be rejected");

        let ok = store.advance(&job.job_id, 1_000, None).await.unwrap();
        assert!(ok);
        let fetched = store.get(&job.job_id).await.unwrap();
        assert_eq!(fetched.next_due_ms, None);
        assert_eq!(fetched.last_due_ms, Some(1_000));
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = FileJobStore::open(dir.path(), 200).unwrap();
        let job = store.add(main_job("R", 1_000)).await.unwrap();
        store.remove(&job.job_id).await.unwrap();
        store.remove(&job.job_id).await.unwrap();
        assert!(matches!(
            store.get(&job.job_id).await.unwrap_err(),
            JobStoreError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn catalog_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let job_id = {
            let store = FileJobStore::open(dir.path(), 200).unwrap();
            store.add(main_job("R", 1_000)).await.unwrap().job_id
        };
        let reopened = FileJobStore::open(dir.path(), 200).unwrap();
        let fetched = reopened.get(&job_id).await.unwrap();
        assert_eq!(fetched.next_due_ms, Some(1_000));
    }

    #[tokio::test]
    async fn run_log_appends_and_prunes() {
        let dir = TempDir::new().unwrap();
        let store = FileJobStore::open(dir.path(), 3).unwrap();
        let job = store.add(main_job("R", 1_000)).await.unwrap();

        for i in 0..5 {
            store
                .append_run(RunRecord {
                    run_id: format!("run-{i}"),
                    job_id: job.job_id.clone(),
                    triggered_at: now(),
                    started_at: None,
                    finished_at: None,
                    outcome: crate::model::Outcome::Ok,
                    error_kind: None,
                    error_detail: None,
                    usage: None,
                    delivery: None,
                })
                .await
                .unwrap();
        }

        let runs = store.runs(&job.job_id, None).await.unwrap();
        assert_eq!(runs.len(), 3, "history pruned to max_history_per_job");
        assert_eq!(runs.last().unwrap().run_id, "run-4");
    }

    #[tokio::test]
    async fn validating_store_rejects_sub_floor_interval() {
        let dir = TempDir::new().unwrap();
        let store = FileJobStore::open(dir.path(), 200).unwrap().with_min_interval(5_000);
        let job = Job::new(
            None,
            "R".into(),
            None,
            None,
            Schedule::Every { every_ms: 1_000 },
            SessionTarget::Main,
            WakeMode::Now,
            Payload::SystemEvent { text: "hi".into() },
            None,
            true,
            false,
            now(),
        )
        .unwrap();
        let err = store.add(job).await.unwrap_err();
        assert!(matches!(err, JobStoreError::InvalidSchedule(_)));
    }
}
