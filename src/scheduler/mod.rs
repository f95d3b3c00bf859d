//! Scheduler (§4.4): single-threaded cooperative loop that claims due jobs
//! and hands them to the Lane Dispatcher.
//!
//! Grounded in `scheduler::tokio_scheduler::TokioScheduler::start`'s
//! `tokio::select!` tick/stop loop, generalised from its fixed 1-second
//! polling interval to a configurable tick floor with wake-event
//! preemption — the teacher has no wake channel at all, so the
//! `tokio::sync::watch`-based wake signal here is new, built the same way
//! the teacher builds `stop_rx`.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use thiserror::Error;

use crate::clock::Clock;
use crate::dispatcher::{DispatchError, LaneDispatcher};
use crate::event_bus::{AppEvent, EventBus};
use crate::executor::Executor;
use crate::model::{
    new_run_id, Job, JobId, JobPatch, Outcome, Payload, RunId, Schedule, SessionKey, SessionTarget, TriggerReason,
    WakeMode,
};
use crate::store::{ClaimedJob, JobStore, JobStoreError};
use crate::trigger::{self, Due};

/// Failure modes for out-of-band scheduler operations (§6 `cron.run`,
/// immediate system events) driven from the gateway rather than a tick.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("job is not currently due; use mode=force to run anyway")]
    NotDue,
    #[error(transparent)]
    Store(#[from] JobStoreError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Global kill-switch (§5): when set, the Scheduler stops claiming new work,
/// but the Job Store keeps accepting CRUD. Checked fresh on every tick —
/// never cached at startup.
#[derive(Clone, Default)]
pub struct KillSwitch(Arc<AtomicBool>);

impl KillSwitch {
    pub fn is_killed(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set(&self, killed: bool) {
        self.0.store(killed, Ordering::SeqCst);
    }
}

pub struct SchedulerConfig {
    pub tick_floor_ms: i64,
    pub lease_ttl_ms: i64,
    pub claim_batch: usize,
    pub default_agent_id: String,
}

pub struct Scheduler {
    clock: Arc<dyn Clock>,
    store: Arc<dyn JobStore>,
    dispatcher: Arc<LaneDispatcher>,
    executor: Arc<Executor>,
    bus: Arc<dyn EventBus>,
    kill_switch: KillSwitch,
    config: SchedulerConfig,
    wake_rx: watch::Receiver<u64>,
    wake_tx: watch::Sender<u64>,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
    last_tick_ms: Arc<AtomicI64>,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        clock: Arc<dyn Clock>,
        store: Arc<dyn JobStore>,
        dispatcher: Arc<LaneDispatcher>,
        executor: Arc<Executor>,
        bus: Arc<dyn EventBus>,
        kill_switch: KillSwitch,
        config: SchedulerConfig,
    ) -> Arc<Self> {
        let (wake_tx, wake_rx) = watch::channel(0);
        let (stop_tx, stop_rx) = watch::channel(false);
        Arc::new(Self {
            clock,
            store,
            dispatcher,
            executor,
            bus,
            kill_switch,
            config,
            wake_tx,
            wake_rx,
            stop_tx,
            stop_rx,
            last_tick_ms: Arc::new(AtomicI64::new(0)),
        })
    }

    pub fn kill_switch(&self) -> KillSwitch {
        self.kill_switch.clone()
    }

    pub fn tick_floor_ms(&self) -> i64 {
        self.config.tick_floor_ms
    }

    /// Milliseconds since the epoch at which `tick` last ran, or 0 if the
    /// loop has never ticked. Used by the status endpoint's staleness check.
    pub fn last_tick_ms(&self) -> i64 {
        self.last_tick_ms.load(Ordering::SeqCst)
    }

    /// Preempt the sleep and tick immediately (§4.4 wake events): manual
    /// run requests, inbound channel messages, and `wake_mode=now` job
    /// creation all call this.
    pub fn wake(&self) {
        let next = *self.wake_rx.borrow() + 1;
        let _ = self.wake_tx.send(next);
    }

    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    pub fn start(self: &Arc<Self>) {
        let this = self.clone();
        tokio::spawn(async move { this.run().await });
    }

    async fn run(self: Arc<Self>) {
        let mut wake_rx = self.wake_rx.clone();
        let mut stop_rx = self.stop_rx.clone();
        let tick_floor = StdDuration::from_millis(self.config.tick_floor_ms.max(1) as u64);

        loop {
            tokio::select! {
                _ = tokio::time::sleep(tick_floor) => {
                    self.tick().await;
                }
                Ok(()) = wake_rx.changed() => {
                    self.tick().await;
                }
                Ok(()) = stop_rx.changed() => {
                    if *stop_rx.borrow() {
                        break;
                    }
                }
            }
        }
    }

    /// One scheduling pass. Exposed directly so tests can drive ticks
    /// without waiting on real time.
    pub async fn tick(&self) {
        let now = self.clock.now();
        self.last_tick_ms.store(now.timestamp_millis(), Ordering::SeqCst);

        if self.kill_switch.is_killed() {
            return;
        }
        let claimed = match self
            .store
            .claim_due(now.timestamp_millis(), self.config.claim_batch, self.config.lease_ttl_ms)
            .await
        {
            Ok(c) => c,
            Err(_) => return,
        };

        for claimed_job in claimed {
            self.schedule_one(claimed_job, now).await;
        }
    }

    async fn schedule_one(&self, claimed: ClaimedJob, now: DateTime<Utc>) {
        let job = claimed.job;
        // The instant just claimed becomes the new `last_due` anchor for
        // computing what comes after it — not the job's previous firing.
        let firing_due: Option<DateTime<Utc>> = DateTime::from_timestamp_millis(claimed.due_at_ms);
        let due = match trigger::next_due(&job.schedule, job.created_at, firing_due, now) {
            Ok(d) => d,
            Err(_) => return,
        };
        let new_due_ms = match due {
            Due::At(at) => Some(at.timestamp_millis()),
            Due::Done => None,
        };

        let advanced = match self.store.advance(&job.job_id, claimed.due_at_ms, new_due_ms).await {
            Ok(ok) => ok,
            Err(_) => return,
        };
        if !advanced {
            return;
        }

        let is_one_shot_done = matches!(due, Due::Done);
        let run_id = new_run_id();
        let agent_id = job.agent_id.clone().unwrap_or_else(|| self.config.default_agent_id.clone());
        let lane_key = match job.session_target {
            SessionTarget::Main => SessionKey::main(&agent_id),
            SessionTarget::Isolated => SessionKey::isolated(&agent_id, &job.job_id),
        };

        let _ = self.bus.publish(AppEvent::CronFired {
            job_id: job.job_id.clone(),
            run_id: run_id.clone(),
        });

        let executor = self.executor.clone();
        let store = self.store.clone();
        let delete_after_run = job.delete_after_run;
        let job_id = job.job_id.clone();

        let _ = self.dispatcher.enqueue(&lane_key, move |cancel| async move {
            let record = executor.execute(&job, run_id, TriggerReason::Schedule, cancel).await;
            let succeeded = record.outcome == Outcome::Ok;
            let _ = store.append_run(record).await;

            if is_one_shot_done {
                if delete_after_run && succeeded {
                    let _ = store.remove(&job_id).await;
                } else {
                    let patch = JobPatch {
                        enabled: Some(false),
                        ..Default::default()
                    };
                    let _ = store.update(&job_id, patch).await;
                }
            }
        });
    }

    /// `cron.run`: dispatch a single job outside the normal claim/advance
    /// cycle. `force=true` ignores `enabled` and `next_due_ms`; otherwise
    /// the job must currently be due. Does not touch `next_due_ms` — the
    /// job's ordinary schedule is untouched by a manual run.
    pub async fn run_now(&self, job_id: &JobId, force: bool) -> Result<RunId, SchedulerError> {
        let job = self.store.get(job_id).await?;

        if !force {
            let now_ms = self.clock.now_ms();
            let is_due = job.next_due_ms.map(|due| due <= now_ms).unwrap_or(false);
            if !job.enabled || !is_due {
                return Err(SchedulerError::NotDue);
            }
        }

        let run_id = new_run_id();
        let agent_id = job.agent_id.clone().unwrap_or_else(|| self.config.default_agent_id.clone());
        let lane_key = match job.session_target {
            SessionTarget::Main => SessionKey::main(&agent_id),
            SessionTarget::Isolated => SessionKey::isolated(&agent_id, &job.job_id),
        };

        let _ = self.bus.publish(AppEvent::CronFired {
            job_id: job.job_id.clone(),
            run_id: run_id.clone(),
        });

        let executor = self.executor.clone();
        let store = self.store.clone();
        let run_id_for_dispatch = run_id.clone();

        self.dispatcher.enqueue(&lane_key, move |cancel| async move {
            let record = executor.execute(&job, run_id_for_dispatch, TriggerReason::Manual, cancel).await;
            let _ = store.append_run(record).await;
        })?;

        Ok(run_id)
    }

    /// Immediate system event (§6): enqueues `text` into the main session
    /// without creating a catalog entry, bypassing the Job Store entirely.
    pub async fn emit_system_event(
        &self,
        agent_id: Option<String>,
        text: String,
        wake_mode: WakeMode,
    ) -> Result<RunId, SchedulerError> {
        let agent_id = agent_id.unwrap_or_else(|| self.config.default_agent_id.clone());
        let now = self.clock.now();
        let job = Job::new(
            None,
            "immediate-system-event".to_string(),
            None,
            Some(agent_id.clone()),
            Schedule::At { at_ms: now.timestamp_millis() },
            SessionTarget::Main,
            wake_mode,
            Payload::SystemEvent { text },
            None,
            true,
            true,
            now,
        )?;

        let run_id = new_run_id();
        let lane_key = SessionKey::main(&agent_id);
        let executor = self.executor.clone();
        let run_id_for_dispatch = run_id.clone();

        self.dispatcher.enqueue(&lane_key, move |cancel| async move {
            let _ = executor.execute(&job, run_id_for_dispatch, TriggerReason::Manual, cancel).await;
        })?;

        Ok(run_id)
    }
}
