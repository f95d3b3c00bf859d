use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::JobId;

/// Lane key derivation, centralised here per the §9 "session-key
/// derivation" redesign note — nothing else in the crate recomputes this.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn main(agent_id: &str) -> Self {
        Self(format!("agent:{agent_id}:main"))
    }

    pub fn isolated(agent_id: &str, job_id: &JobId) -> Self {
        Self(format!("agent:{agent_id}:cron:{job_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why an Executor invocation was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerReason {
    Schedule,
    Manual,
    InboundChannel,
}

/// The most recent `(channel, target)` a session successfully replied on,
/// used as the Delivery Router's fallback when a job doesn't pin a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastRoute {
    pub channel: String,
    pub target: String,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn main_and_isolated_keys_differ() {
        let job_id = "job-1".to_string();
        let main = SessionKey::main("agent-a");
        let isolated = SessionKey::isolated("agent-a", &job_id);
        assert_ne!(main, isolated);
        assert_eq!(main.as_str(), "agent:agent-a:main");
        assert_eq!(isolated.as_str(), "agent:agent-a:cron:job-1");
    }
}
