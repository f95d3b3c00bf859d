//! `gatehoused`: wires the engine's components together and serves the
//! gateway HTTP+WebSocket API. Grounded on `cli::handle_daemon`'s foreground
//! wiring path — that code builds a `TokioScheduler` plus an empty
//! `ChannelManager`-equivalent and hands everything to `start_gateway`; this
//! binary does the same for every component in the engine (§1 OVERVIEW).

use std::path::PathBuf;
use std::sync::Arc;

use gatehouse::agent::fake::{FakeAgentRuntime, FakeEventSink};
use gatehouse::channels::ChannelManager;
use gatehouse::clock::SystemClock;
use gatehouse::config::load_default_config;
use gatehouse::delivery::{DeliveryRouter, FileLastRouteStore};
use gatehouse::dispatcher::LaneDispatcher;
use gatehouse::event_bus::TokioBroadcastBus;
use gatehouse::executor::Executor;
use gatehouse::gateway::{start_gateway, GatewayState};
use gatehouse::scheduler::{KillSwitch, Scheduler, SchedulerConfig};
use gatehouse::store::FileJobStore;

const DEFAULT_AGENT_ID: &str = "default";

#[tokio::main]
async fn main() {
    let config = load_default_config();
    gatehouse::logging::init(None);

    let state_dir = PathBuf::from(&config.store.state_dir);
    if let Err(e) = std::fs::create_dir_all(&state_dir) {
        eprintln!("gatehoused: failed to create state dir {state_dir:?}: {e}");
        std::process::exit(1);
    }
    write_pid_file(&state_dir);

    let store = match FileJobStore::open(&state_dir, config.store.max_run_history_per_job) {
        Ok(s) => Arc::new(s.with_min_interval(config.store.min_interval_ms)),
        Err(e) => {
            eprintln!("gatehoused: failed to open job store: {e}");
            std::process::exit(1);
        }
    };

    let last_route = match FileLastRouteStore::open(&state_dir) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            eprintln!("gatehoused: failed to open last-route store: {e}");
            std::process::exit(1);
        }
    };

    // Channel drivers are deliberately out of scope beyond the wiring point:
    // real credentials are supplied via env vars per driver and only
    // registered when the corresponding feature is compiled in.
    let channels = Arc::new(ChannelManager::new());
    register_channels(&channels);

    let bus: Arc<dyn gatehouse::event_bus::EventBus> = Arc::new(TokioBroadcastBus::new());
    let clock = Arc::new(SystemClock);
    let delivery = Arc::new(DeliveryRouter::new(channels.clone(), last_route));

    // The Agent Runtime has no real backend in this engine (§1 Non-goals) —
    // only the Fake stands in, here and in tests alike.
    let agent = Arc::new(FakeAgentRuntime::succeeding("(no agent runtime configured)"));
    let event_sink = Arc::new(FakeEventSink::default());

    let executor = Arc::new(Executor::new(clock.clone(), agent, event_sink, delivery, DEFAULT_AGENT_ID));

    let dispatcher = Arc::new(LaneDispatcher::new(config.dispatcher.global_parallelism, config.dispatcher.lane_queue_cap));

    let kill_switch = KillSwitch::default();
    kill_switch.set(config.scheduler.killed);

    let scheduler = Scheduler::new(
        clock,
        store.clone(),
        dispatcher,
        executor,
        bus.clone(),
        kill_switch,
        SchedulerConfig {
            tick_floor_ms: config.scheduler.tick_floor_ms,
            lease_ttl_ms: config.scheduler.lease_ttl_ms,
            claim_batch: config.scheduler.claim_batch,
            default_agent_id: DEFAULT_AGENT_ID.to_string(),
        },
    );
    scheduler.start();

    let gateway_state = GatewayState {
        store,
        scheduler,
        bus,
        auth_token: config.gateway.auth_token.clone(),
    };

    if let Err(e) = start_gateway(gateway_state, &config.gateway.bind_addr).await {
        eprintln!("gatehoused: {e}");
        std::process::exit(1);
    }
}

/// Register channel drivers whose feature is compiled in and whose
/// credentials are present in the environment. A channel silently stays
/// unregistered when its env vars are absent — `ChannelManager::send` then
/// reports it as "not registered" rather than the daemon refusing to start.
fn register_channels(channels: &ChannelManager) {
    #[cfg(feature = "channels-telegram")]
    {
        use gatehouse::channels::telegram::{TelegramChannel, TelegramConfig};
        if let Ok(token) = std::env::var("GATEWAY_TELEGRAM_TOKEN") {
            let allowed_chat_ids = std::env::var("GATEWAY_TELEGRAM_ALLOWED_CHAT_IDS")
                .ok()
                .map(|v| v.split(',').filter_map(|s| s.trim().parse().ok()).collect())
                .unwrap_or_default();
            channels.register(Arc::new(TelegramChannel::new(TelegramConfig {
                token,
                allowed_chat_ids,
                polling_timeout_secs: 30,
            })));
        }
    }

    #[cfg(feature = "channels-discord")]
    {
        use gatehouse::channels::discord::{DiscordChannel, DiscordConfig};
        if let Ok(bot_token) = std::env::var("GATEWAY_DISCORD_BOT_TOKEN") {
            channels.register(Arc::new(DiscordChannel::new(DiscordConfig { bot_token })));
        }
    }

    #[cfg(feature = "channels-slack")]
    {
        use gatehouse::channels::slack::{SlackChannel, SlackConfig};
        if let Ok(bot_token) = std::env::var("GATEWAY_SLACK_BOT_TOKEN") {
            channels.register(Arc::new(SlackChannel::new(SlackConfig { bot_token })));
        }
    }

    let _ = channels;
}

fn write_pid_file(state_dir: &std::path::Path) {
    let pid_dir = dirs::home_dir().unwrap_or_else(|| state_dir.to_path_buf()).join(".gatehouse");
    if std::fs::create_dir_all(&pid_dir).is_ok() {
        let _ = std::fs::write(pid_dir.join("daemon.pid"), std::process::id().to_string());
    }
}
