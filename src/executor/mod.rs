//! Executor (§4.6): runs a single job — resolves its session, invokes the
//! Agent Runtime (or just the event sink, for main-session jobs), captures
//! the result, and hands delivery off to the Delivery Router.
//!
//! Grounded in `scheduler::tokio_scheduler::execute_job`, generalised from
//! its three-arm stub `match` on `JobPayload` into the full main/isolated
//! dispatch with a real `AgentRuntime` collaborator, and in the
//! stuck-detection `tokio::time::timeout` wrapper the teacher applies
//! around `execute_job`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::agent::{AgentError, AgentErrorKind, AgentRuntime, EventSink, RunOptions};
use crate::clock::Clock;
use crate::delivery::{DeliveryRequest, DeliveryRouter};
use crate::dispatcher::CancelToken;
use crate::model::{
    DeliveryOutcome, Isolation, Job, Outcome, Payload, PostToMainMode, RunId, RunRecord, SessionKey, SessionTarget,
    TriggerReason, WakeMode,
};

const SUMMARY_MAX_CHARS: usize = 280;
const TRUNCATION_MARKER: &str = "\n… [truncated]";

pub struct Executor {
    clock: Arc<dyn Clock>,
    agent: Arc<dyn AgentRuntime>,
    event_sink: Arc<dyn EventSink>,
    delivery: Arc<DeliveryRouter>,
    default_agent_id: String,
}

impl Executor {
    pub fn new(
        clock: Arc<dyn Clock>,
        agent: Arc<dyn AgentRuntime>,
        event_sink: Arc<dyn EventSink>,
        delivery: Arc<DeliveryRouter>,
        default_agent_id: impl Into<String>,
    ) -> Self {
        Self {
            clock,
            agent,
            event_sink,
            delivery,
            default_agent_id: default_agent_id.into(),
        }
    }

    /// Run one Executor invocation for `job`, producing exactly one
    /// [`RunRecord`] (§4.6 side effects). Execution-time errors are never
    /// surfaced as `Err` here — they are folded into the record's
    /// `outcome`/`error_kind` per §7's propagation policy.
    pub async fn execute(
        &self,
        job: &Job,
        run_id: RunId,
        _trigger_reason: TriggerReason,
        cancel: CancelToken,
    ) -> RunRecord {
        let triggered_at = self.clock.now();
        let agent_id = job.agent_id.clone().unwrap_or_else(|| self.default_agent_id.clone());

        if cancel.is_cancelled() {
            return cancelled_record(run_id, job.job_id.clone(), triggered_at);
        }

        match job.session_target {
            SessionTarget::Main => self.execute_main(job, run_id, triggered_at, &agent_id).await,
            SessionTarget::Isolated => self.execute_isolated(job, run_id, triggered_at, &agent_id, cancel).await,
        }
    }

    async fn execute_main(&self, job: &Job, run_id: RunId, triggered_at: chrono::DateTime<Utc>, agent_id: &str) -> RunRecord {
        let Payload::SystemEvent { text } = &job.payload else {
            unreachable!("session_target=main always carries a SystemEvent payload");
        };
        let started_at = self.clock.now();
        let session_id = SessionKey::main(agent_id).to_string();
        let wake_now = job.wake_mode == WakeMode::Now;
        self.event_sink.enqueue_event(&session_id, text, wake_now).await;

        RunRecord {
            run_id,
            job_id: job.job_id.clone(),
            triggered_at,
            started_at: Some(started_at),
            finished_at: Some(self.clock.now()),
            outcome: Outcome::Ok,
            error_kind: None,
            error_detail: None,
            usage: None,
            delivery: None,
        }
    }

    async fn execute_isolated(
        &self,
        job: &Job,
        run_id: RunId,
        triggered_at: chrono::DateTime<Utc>,
        agent_id: &str,
        cancel: CancelToken,
    ) -> RunRecord {
        let Payload::AgentTurn {
            message,
            model,
            thinking,
            timeout_s,
            channel,
            to,
            best_effort_deliver,
            ..
        } = &job.payload
        else {
            unreachable!("session_target=isolated always carries an AgentTurn payload");
        };

        let started_at = self.clock.now();
        // Fresh sub-identifier per run, for traceability only — the lane
        // stays keyed by job_id regardless (§3, SessionKey note).
        let sub_session_id = format!("{}:{}", SessionKey::isolated(agent_id, &job.job_id), &run_id);
        let prompt = format!("[cron:{} {}] {}", job.job_id, job.name, message);
        let options = RunOptions {
            model: model.clone(),
            thinking: thinking.clone(),
            timeout_s: *timeout_s,
        };

        let result = self.run_with_timeout_and_retry(&sub_session_id, &prompt, options).await;

        let isolation = job.isolation.clone().unwrap_or_default();
        let main_session_id = SessionKey::main(agent_id).to_string();

        match result {
            Ok(output) => {
                let posted = post_to_main_text(&isolation, &output.output_text);
                self.event_sink
                    .enqueue_event(&main_session_id, &format!("[{}] {}", isolation.post_to_main_prefix, posted), false)
                    .await;

                if cancel.is_cancelled() {
                    return cancelled_record(run_id, job.job_id.clone(), triggered_at);
                }

                let delivery_outcome = if job.payload.should_deliver() {
                    Some(self.deliver(job, agent_id, channel.as_deref(), to.as_deref(), &output.output_text).await)
                } else {
                    None
                };

                let (outcome, error_kind) = match &delivery_outcome {
                    Some(d) if d.status == Outcome::Failed && !*best_effort_deliver => {
                        (Outcome::Failed, Some("delivery_error".to_string()))
                    }
                    _ => (Outcome::Ok, None),
                };

                RunRecord {
                    run_id,
                    job_id: job.job_id.clone(),
                    triggered_at,
                    started_at: Some(started_at),
                    finished_at: Some(self.clock.now()),
                    outcome,
                    error_kind,
                    error_detail: None,
                    usage: output.usage,
                    delivery: delivery_outcome,
                }
            }
            Err(e) => {
                let error_kind = match e.kind {
                    AgentErrorKind::Retryable => "agent_timeout",
                    AgentErrorKind::Terminal => "agent_error",
                };
                self.event_sink
                    .enqueue_event(
                        &main_session_id,
                        &format!("[{}] job \"{}\" failed: {}", isolation.post_to_main_prefix, job.name, e.message),
                        false,
                    )
                    .await;

                RunRecord {
                    run_id,
                    job_id: job.job_id.clone(),
                    triggered_at,
                    started_at: Some(started_at),
                    finished_at: Some(self.clock.now()),
                    outcome: Outcome::Failed,
                    error_kind: Some(error_kind.to_string()),
                    error_detail: Some(e.message),
                    usage: None,
                    delivery: None,
                }
            }
        }
    }

    /// One retry only if the runtime marks the failure as transient
    /// (§4.6 failure semantics); a retry that itself times out is terminal.
    async fn run_with_timeout_and_retry(
        &self,
        session_id: &str,
        prompt: &str,
        options: RunOptions,
    ) -> Result<crate::agent::AgentOutput, AgentError> {
        let first = self.run_with_timeout(session_id, prompt, options.clone()).await;
        match first {
            Err(e) if e.kind == AgentErrorKind::Retryable => self.run_with_timeout(session_id, prompt, options).await,
            other => other,
        }
    }

    async fn run_with_timeout(
        &self,
        session_id: &str,
        prompt: &str,
        options: RunOptions,
    ) -> Result<crate::agent::AgentOutput, AgentError> {
        let Some(secs) = options.timeout_s else {
            return self.agent.run(session_id, prompt, options).await;
        };
        match tokio::time::timeout(Duration::from_secs(secs), self.agent.run(session_id, prompt, options)).await {
            Ok(result) => result,
            Err(_) => Err(AgentError {
                kind: AgentErrorKind::Retryable,
                message: format!("agent call exceeded timeout_s={secs}"),
            }),
        }
    }

    async fn deliver(
        &self,
        job: &Job,
        agent_id: &str,
        channel: Option<&str>,
        to: Option<&str>,
        text: &str,
    ) -> DeliveryOutcome {
        let session_key = SessionKey::isolated(agent_id, &job.job_id);
        match self
            .delivery
            .deliver(DeliveryRequest {
                session_key: &session_key,
                channel,
                to,
                text,
            })
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => DeliveryOutcome {
                channel: channel.unwrap_or_default().to_string(),
                target: to.unwrap_or_default().to_string(),
                status: Outcome::Failed,
                error_detail: Some(e.to_string()),
            },
        }
    }
}

fn cancelled_record(run_id: RunId, job_id: crate::model::JobId, triggered_at: chrono::DateTime<Utc>) -> RunRecord {
    RunRecord {
        run_id,
        job_id,
        triggered_at,
        started_at: None,
        finished_at: Some(triggered_at),
        outcome: Outcome::Cancelled,
        error_kind: Some("cancelled".to_string()),
        error_detail: None,
        usage: None,
        delivery: None,
    }
}

/// Head-only truncation with an explicit marker (§9 open question,
/// resolved in favour of head-only truncation for `full` mode); `summary`
/// mode uses a shorter fixed budget since the engine does not itself
/// generate summaries (that is a model concern, out of scope per §1).
fn post_to_main_text(isolation: &Isolation, output_text: &str) -> String {
    let limit = match isolation.post_to_main_mode {
        PostToMainMode::Full => isolation.post_to_main_max_chars,
        PostToMainMode::Summary => SUMMARY_MAX_CHARS.min(isolation.post_to_main_max_chars),
    };
    truncate_head(output_text, limit)
}

fn truncate_head(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let head: String = text.chars().take(limit).collect();
    format!("{head}{TRUNCATION_MARKER}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::fake::{FakeAgentRuntime, FakeEventSink};
    use crate::channels::{fake::FakeChannel, ChannelManager};
    use crate::clock::FakeClock;
    use crate::delivery::{route_now, FileLastRouteStore, LastRouteStore};
    use crate::model::{Job, Schedule, WakeMode};
    use chrono::TimeZone;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn now() -> chrono::DateTime<Utc> {
        Utc.timestamp_millis_opt(1_738_262_000_000).unwrap()
    }

    fn main_job(name: &str) -> Job {
        Job::new(
            None,
            name.to_string(),
            None,
            Some("agent-a".into()),
            Schedule::At { at_ms: 1 },
            SessionTarget::Main,
            WakeMode::Now,
            Payload::SystemEvent { text: "check the list".into() },
            None,
            true,
            true,
            now(),
        )
        .unwrap()
    }

    fn isolated_job(deliver: bool, to: Option<&str>, channel: Option<&str>, best_effort: bool) -> Job {
        Job::new(
            None,
            "Weekly report".into(),
            None,
            Some("agent-a".into()),
            Schedule::Cron {
                expr: "0 7 * * *".into(),
                tz: Some("America/Los_Angeles".into()),
            },
            SessionTarget::Isolated,
            WakeMode::Now,
            Payload::AgentTurn {
                message: "M".into(),
                model: None,
                thinking: None,
                timeout_s: Some(5),
                deliver: Some(deliver),
                channel: channel.map(String::from),
                to: to.map(String::from),
                best_effort_deliver: best_effort,
            },
            Some(Isolation::default()),
            true,
            false,
            now(),
        )
        .unwrap()
    }

    fn harness(
        agent: Arc<FakeAgentRuntime>,
        dir: &TempDir,
    ) -> (Executor, Arc<FakeEventSink>, Arc<ChannelManager>) {
        let event_sink = Arc::new(FakeEventSink::default());
        let channels = Arc::new(ChannelManager::new());
        channels.register(Arc::new(FakeChannel::new("slack")));
        let last_route = Arc::new(FileLastRouteStore::open(dir.path()).unwrap());
        let delivery = Arc::new(DeliveryRouter::new(channels.clone(), last_route));
        let clock = Arc::new(FakeClock::new(now()));
        let executor = Executor::new(clock, agent, event_sink.clone(), delivery, "agent-a");
        (executor, event_sink, channels)
    }

    #[tokio::test]
    async fn main_job_enqueues_system_event_without_calling_agent() {
        let dir = TempDir::new().unwrap();
        let agent = Arc::new(FakeAgentRuntime::succeeding("unused"));
        let (executor, event_sink, _channels) = harness(agent.clone(), &dir);
        let job = main_job("Reminder");

        let record = executor
            .execute(&job, "run-1".into(), TriggerReason::Schedule, CancelToken::default())
            .await;

        assert_eq!(record.outcome, Outcome::Ok);
        assert!(agent.calls().is_empty());
        let events = event_sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, "agent:agent-a:main");
        assert!(events[0].2, "wake_mode=now should set wake_now");
    }

    #[tokio::test]
    async fn isolated_job_delivers_to_explicit_target_and_posts_summary() {
        let dir = TempDir::new().unwrap();
        let agent = Arc::new(FakeAgentRuntime::succeeding("OUT"));
        let (executor, event_sink, _channels) = harness(agent, &dir);
        let job = isolated_job(true, Some("channel:C1"), Some("slack"), false);

        let record = executor
            .execute(&job, "run-2".into(), TriggerReason::Schedule, CancelToken::default())
            .await;

        assert_eq!(record.outcome, Outcome::Ok);
        let delivery = record.delivery.unwrap();
        assert_eq!(delivery.status, Outcome::Ok);
        assert_eq!(delivery.channel, "slack");
        assert_eq!(delivery.target, "channel:C1");

        let events = event_sink.events();
        assert!(events.iter().any(|(sid, text, _)| sid == "agent:agent-a:main" && text.contains("Cron")));
    }

    #[tokio::test]
    async fn falls_back_to_last_route_when_to_is_unset() {
        let dir = TempDir::new().unwrap();

        let seed_store = FileLastRouteStore::open(dir.path()).unwrap();
        seed_store
            .set("agent:agent-a:cron:x", route_now("slack", "channel:C1"))
            .await
            .unwrap();

        let event_sink = Arc::new(FakeEventSink::default());
        let channels = Arc::new(ChannelManager::new());
        channels.register(Arc::new(FakeChannel::new("slack")));
        let last_route = Arc::new(FileLastRouteStore::open(dir.path()).unwrap());
        let delivery = Arc::new(DeliveryRouter::new(channels, last_route));
        let clock = Arc::new(FakeClock::new(now()));
        let executor = Executor::new(clock, Arc::new(FakeAgentRuntime::succeeding("OUT")), event_sink, delivery, "agent-a");

        let mut job = isolated_job(true, None, None, false);
        job.job_id = "x".to_string();
        let record = executor
            .execute(&job, "run-3".into(), TriggerReason::Schedule, CancelToken::default())
            .await;

        let delivery = record.delivery.unwrap();
        assert_eq!(delivery.channel, "slack");
        assert_eq!(delivery.target, "channel:C1");
    }

    #[tokio::test]
    async fn best_effort_delivery_failure_keeps_run_ok() {
        let dir = TempDir::new().unwrap();
        let event_sink = Arc::new(FakeEventSink::default());
        let channels = Arc::new(ChannelManager::new());
        channels.register(Arc::new(FakeChannel::failing("slack")));
        let last_route = Arc::new(FileLastRouteStore::open(dir.path()).unwrap());
        let delivery = Arc::new(DeliveryRouter::new(channels, last_route));
        let clock = Arc::new(FakeClock::new(now()));
        let executor = Executor::new(
            clock,
            Arc::new(FakeAgentRuntime::succeeding("OUT")),
            event_sink,
            delivery,
            "agent-a",
        );
        let job = isolated_job(true, Some("channel:C1"), Some("slack"), true);

        let record = executor
            .execute(&job, "run-4".into(), TriggerReason::Schedule, CancelToken::default())
            .await;

        assert_eq!(record.outcome, Outcome::Ok);
        assert_eq!(record.delivery.unwrap().status, Outcome::Failed);
    }

    #[tokio::test]
    async fn non_best_effort_delivery_failure_fails_run() {
        let dir = TempDir::new().unwrap();
        let event_sink = Arc::new(FakeEventSink::default());
        let channels = Arc::new(ChannelManager::new());
        channels.register(Arc::new(FakeChannel::failing("slack")));
        let last_route = Arc::new(FileLastRouteStore::open(dir.path()).unwrap());
        let delivery = Arc::new(DeliveryRouter::new(channels, last_route));
        let clock = Arc::new(FakeClock::new(now()));
        let executor = Executor::new(
            clock,
            Arc::new(FakeAgentRuntime::succeeding("OUT")),
            event_sink,
            delivery,
            "agent-a",
        );
        let job = isolated_job(true, Some("channel:C1"), Some("slack"), false);

        let record = executor
            .execute(&job, "run-5".into(), TriggerReason::Schedule, CancelToken::default())
            .await;

        assert_eq!(record.outcome, Outcome::Failed);
        assert_eq!(record.error_kind.as_deref(), Some("delivery_error"));
    }

    #[tokio::test]
    async fn agent_terminal_error_still_posts_to_main() {
        let dir = TempDir::new().unwrap();
        let agent = Arc::new(FakeAgentRuntime::failing(AgentErrorKind::Terminal, "boom"));
        let (executor, event_sink, _channels) = harness(agent, &dir);
        let job = isolated_job(false, None, None, false);

        let record = executor
            .execute(&job, "run-6".into(), TriggerReason::Schedule, CancelToken::default())
            .await;

        assert_eq!(record.outcome, Outcome::Failed);
        assert_eq!(record.error_kind.as_deref(), Some("agent_error"));
        let events = event_sink.events();
        assert!(events.iter().any(|(_, text, _)| text.contains("failed")));
    }

    #[tokio::test]
    async fn pre_cancelled_token_yields_cancelled_outcome_without_calling_agent() {
        let dir = TempDir::new().unwrap();
        let agent = Arc::new(FakeAgentRuntime::succeeding("unused"));
        let (executor, _sink, _channels) = harness(agent.clone(), &dir);
        let job = isolated_job(false, None, None, false);
        let cancel = CancelToken::default();
        cancel.cancel();

        let record = executor
            .execute(&job, "run-7".into(), TriggerReason::Schedule, cancel)
            .await;

        assert_eq!(record.outcome, Outcome::Cancelled);
        assert!(agent.calls().is_empty());
    }

    #[test]
    fn truncate_head_adds_marker_when_over_limit() {
        let text = "a".repeat(20);
        let truncated = truncate_head(&text, 5);
        assert!(truncated.starts_with("aaaaa"));
        assert!(truncated.contains("truncated"));
    }
}
