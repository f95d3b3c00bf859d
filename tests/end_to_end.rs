//! Full-pipeline tests exercising tick → claim → dispatch → execute →
//! deliver purely through the crate's public API, the way an embedding
//! application would: build the collaborators, add jobs to the store,
//! drive the scheduler, and observe results through the store/event-sink/
//! channel seams rather than any internal type.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use gatehouse::agent::fake::{FakeAgentRuntime, FakeEventSink};
use gatehouse::channels::fake::FakeChannel;
use gatehouse::channels::ChannelManager;
use gatehouse::clock::{Clock, FakeClock};
use gatehouse::delivery::{route_now, DeliveryRouter, FileLastRouteStore, LastRouteStore};
use gatehouse::dispatcher::LaneDispatcher;
use gatehouse::event_bus::{EventBus, TokioBroadcastBus};
use gatehouse::executor::Executor;
use gatehouse::model::{Isolation, Job, Payload, Schedule, SessionTarget, WakeMode};
use gatehouse::scheduler::{KillSwitch, Scheduler, SchedulerConfig};
use gatehouse::store::{FileJobStore, JobStore, JobStoreError};

fn anchor() -> DateTime<Utc> {
    Utc.timestamp_millis_opt(1_738_262_400_000).unwrap()
}

struct Harness {
    scheduler: Arc<Scheduler>,
    store: Arc<FileJobStore>,
    clock: Arc<FakeClock>,
    agent: Arc<FakeAgentRuntime>,
    event_sink: Arc<FakeEventSink>,
    channel: Arc<FakeChannel>,
    last_route: Arc<FileLastRouteStore>,
    _dir: TempDir,
}

fn build(agent_output: &str) -> Harness {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FileJobStore::open(dir.path(), 200).unwrap());
    let clock = Arc::new(FakeClock::new(anchor()));
    let dispatcher = Arc::new(LaneDispatcher::new(4, 16));
    let event_sink = Arc::new(FakeEventSink::default());
    let agent = Arc::new(FakeAgentRuntime::succeeding(agent_output));
    let channels = Arc::new(ChannelManager::new());
    let channel = Arc::new(FakeChannel::new("slack"));
    channels.register(channel.clone());
    let last_route = Arc::new(FileLastRouteStore::open(dir.path()).unwrap());
    let delivery = Arc::new(DeliveryRouter::new(channels, last_route.clone()));
    let executor = Arc::new(Executor::new(
        clock.clone() as Arc<dyn Clock>,
        agent.clone(),
        event_sink.clone(),
        delivery,
        "agent-a",
    ));
    let bus: Arc<dyn EventBus> = Arc::new(TokioBroadcastBus::new());

    let scheduler = Scheduler::new(
        clock.clone() as Arc<dyn Clock>,
        store.clone() as Arc<dyn JobStore>,
        dispatcher,
        executor,
        bus,
        KillSwitch::default(),
        SchedulerConfig {
            tick_floor_ms: 5_000,
            lease_ttl_ms: 60_000,
            claim_batch: 10,
            default_agent_id: "agent-a".to_string(),
        },
    );

    Harness { scheduler, store, clock, agent, event_sink, channel, last_route, _dir: dir }
}

async fn wait_for_run(store: &FileJobStore, job_id: &str) -> gatehouse::model::RunRecord {
    for _ in 0..40 {
        let runs = store.runs(&job_id.to_string(), None).await.unwrap();
        if let Some(r) = runs.into_iter().next() {
            return r;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("no run recorded for job {job_id} within the wait window");
}

#[tokio::test]
async fn one_shot_main_session_job_fires_and_is_removed() {
    let h = build("unused");
    let job = Job::new(
        None,
        "Morning reminder".into(),
        None,
        Some("agent-a".into()),
        Schedule::At { at_ms: anchor().timestamp_millis() },
        SessionTarget::Main,
        WakeMode::Now,
        Payload::SystemEvent { text: "stand up".into() },
        None,
        true,
        true,
        anchor(),
    )
    .unwrap();
    let job = h.store.add(job).await.unwrap();

    h.scheduler.tick().await;
    wait_for_run(&h.store, &job.job_id).await;

    let events = h.event_sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0, "agent:agent-a:main");
    assert_eq!(events[0].1, "stand up");

    let err = h.store.get(&job.job_id).await.unwrap_err();
    assert!(matches!(err, JobStoreError::NotFound(_)));
}

#[tokio::test]
async fn recurring_isolated_job_delivers_and_reschedules() {
    let h = build("weekly summary text");
    let job = Job::new(
        None,
        "Weekly report".into(),
        None,
        Some("agent-a".into()),
        Schedule::Every { every_ms: 3_600_000 },
        SessionTarget::Isolated,
        WakeMode::Now,
        Payload::AgentTurn {
            message: "summarize the week".into(),
            model: None,
            thinking: None,
            timeout_s: Some(5),
            deliver: Some(true),
            channel: Some("slack".into()),
            to: Some("channel:C1".into()),
            best_effort_deliver: false,
        },
        Some(Isolation::default()),
        true,
        false,
        anchor(),
    )
    .unwrap();
    let job = h.store.add(job).await.unwrap();
    let first_due = job.next_due_ms.unwrap();
    h.clock.set(DateTime::from_timestamp_millis(first_due).unwrap());

    h.scheduler.tick().await;
    let record = wait_for_run(&h.store, &job.job_id).await;

    assert_eq!(record.outcome, gatehouse::model::Outcome::Ok);
    assert_eq!(h.agent.calls().len(), 1);
    assert_eq!(h.channel.sent().len(), 1);
    assert_eq!(h.channel.sent()[0].0, "channel:C1");

    let fetched = h.store.get(&job.job_id).await.unwrap();
    assert!(fetched.enabled, "a recurring job stays enabled after firing");
    assert_eq!(fetched.next_due_ms, Some(first_due + 3_600_000));
}

#[tokio::test]
async fn isolated_job_without_explicit_target_falls_back_to_last_route() {
    let h = build("ack");
    let job = Job::new(
        None,
        "Check in".into(),
        None,
        Some("agent-a".into()),
        Schedule::At { at_ms: anchor().timestamp_millis() },
        SessionTarget::Isolated,
        WakeMode::Now,
        Payload::AgentTurn {
            message: "check in".into(),
            model: None,
            thinking: None,
            timeout_s: None,
            deliver: Some(true),
            channel: None,
            to: None,
            best_effort_deliver: false,
        },
        Some(Isolation::default()),
        true,
        true,
        anchor(),
    )
    .unwrap();
    let job = h.store.add(job).await.unwrap();

    h.last_route
        .set(&format!("agent:agent-a:cron:{}", job.job_id), route_now("slack", "channel:C9"))
        .await
        .unwrap();

    h.scheduler.tick().await;
    wait_for_run(&h.store, &job.job_id).await;

    assert_eq!(h.channel.sent().len(), 1);
    assert_eq!(h.channel.sent()[0].0, "channel:C9");
}

#[tokio::test]
async fn best_effort_delivery_failure_does_not_fail_the_run() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FileJobStore::open(dir.path(), 200).unwrap());
    let clock = Arc::new(FakeClock::new(anchor()));
    let dispatcher = Arc::new(LaneDispatcher::new(4, 16));
    let event_sink = Arc::new(FakeEventSink::default());
    let agent = Arc::new(FakeAgentRuntime::succeeding("OUT"));
    let channels = Arc::new(ChannelManager::new());
    channels.register(Arc::new(FakeChannel::failing("slack")));
    let last_route = Arc::new(FileLastRouteStore::open(dir.path()).unwrap());
    let delivery = Arc::new(DeliveryRouter::new(channels, last_route));
    let executor = Arc::new(Executor::new(clock.clone() as Arc<dyn Clock>, agent, event_sink, delivery, "agent-a"));
    let bus: Arc<dyn EventBus> = Arc::new(TokioBroadcastBus::new());
    let scheduler = Scheduler::new(
        clock.clone() as Arc<dyn Clock>,
        store.clone() as Arc<dyn JobStore>,
        dispatcher,
        executor,
        bus,
        KillSwitch::default(),
        SchedulerConfig { tick_floor_ms: 5_000, lease_ttl_ms: 60_000, claim_batch: 10, default_agent_id: "agent-a".into() },
    );

    let job = Job::new(
        None,
        "Best effort post".into(),
        None,
        Some("agent-a".into()),
        Schedule::At { at_ms: anchor().timestamp_millis() },
        SessionTarget::Isolated,
        WakeMode::Now,
        Payload::AgentTurn {
            message: "m".into(),
            model: None,
            thinking: None,
            timeout_s: None,
            deliver: Some(true),
            channel: Some("slack".into()),
            to: Some("channel:C1".into()),
            best_effort_deliver: true,
        },
        Some(Isolation::default()),
        true,
        true,
        anchor(),
    )
    .unwrap();
    let job = store.add(job).await.unwrap();

    scheduler.tick().await;
    let record = wait_for_run(&store, &job.job_id).await;

    assert_eq!(record.outcome, gatehouse::model::Outcome::Ok);
    assert_eq!(record.delivery.unwrap().status, gatehouse::model::Outcome::Failed);
}

#[tokio::test]
async fn run_now_force_dispatches_without_touching_next_due() {
    let h = build("forced output");
    let job = Job::new(
        None,
        "Far future".into(),
        None,
        Some("agent-a".into()),
        Schedule::At { at_ms: anchor().timestamp_millis() + 86_400_000 },
        SessionTarget::Main,
        WakeMode::Now,
        Payload::SystemEvent { text: "ping".into() },
        None,
        true,
        false,
        anchor(),
    )
    .unwrap();
    let job = h.store.add(job).await.unwrap();
    let next_due_before = job.next_due_ms;

    let run_id = h.scheduler.run_now(&job.job_id, true).await.unwrap();
    assert!(!run_id.is_empty());
    wait_for_run(&h.store, &job.job_id).await;

    let fetched = h.store.get(&job.job_id).await.unwrap();
    assert_eq!(fetched.next_due_ms, next_due_before, "a manual run must not perturb the normal schedule");
}

#[tokio::test]
async fn immediate_system_event_bypasses_the_catalog_entirely() {
    let h = build("unused");
    let run_id = h.scheduler.emit_system_event(Some("agent-a".into()), "deploy finished".into(), WakeMode::Now).await.unwrap();
    assert!(!run_id.is_empty());

    for _ in 0..40 {
        if !h.event_sink.events().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert!(h.store.list().await.unwrap().is_empty(), "immediate events never touch the job catalog");
    let events = h.event_sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].1, "deploy finished");
}
