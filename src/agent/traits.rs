use async_trait::async_trait;
use serde_json::Value;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub model: Option<String>,
    pub thinking: Option<String>,
    pub timeout_s: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentErrorKind {
    Retryable,
    Terminal,
}

#[derive(Debug, Clone)]
pub struct AgentError {
    pub kind: AgentErrorKind,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct AgentOutput {
    pub output_text: String,
    pub usage: Option<Value>,
}

/// The Agent Runtime collaborator: turns a prompt into tokens. The engine
/// only ever passes it opaque session ids — the runtime owns session
/// history and the retryable/terminal error classification.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    async fn run(&self, session_id: &str, prompt: &str, options: RunOptions) -> Result<AgentOutput, AgentError>;
}

/// Main-session event sink: how the engine posts system events (heartbeat
/// feed items, cron summaries) into a session without invoking the runtime
/// directly.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn enqueue_event(&self, session_id: &str, text: &str, wake_now: bool);
}
