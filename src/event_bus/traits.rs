use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Events broadcast for the gateway's WebSocket surface and logging, trimmed
/// to what this engine actually emits (§1.2 ambient Gateway HTTP API).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppEvent {
    SystemReady,
    SystemError {
        message: String,
    },
    CronFired {
        job_id: String,
        run_id: String,
    },
    HeartbeatTick {
        timestamp: String,
    },
    HeartbeatAlert {
        content: String,
    },
    ChannelMessage {
        channel: String,
        from: String,
        content: String,
    },
}

/// Central pub/sub bus for application events.
pub trait EventBus: Send + Sync {
    fn publish(&self, event: AppEvent) -> Result<(), String>;
    fn subscribe(&self) -> broadcast::Receiver<AppEvent>;
}
