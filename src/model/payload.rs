use serde::{Deserialize, Serialize};

/// What a job does when it fires.
///
/// The `session_target × payload` relationship is the data model's key
/// invariant (§3, §9 "dynamic parameter bags" redesign note): `main` jobs
/// always carry `SystemEvent`, `isolated` jobs always carry `AgentTurn`.
/// That pairing is enforced once, at construction, by
/// [`super::Job::new`] — nothing downstream re-checks it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Payload {
    /// Injected into the main session's inbound queue verbatim.
    SystemEvent { text: String },
    /// Run in an isolated session, with optional delivery.
    AgentTurn {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        thinking: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_s: Option<u64>,
        #[serde(default)]
        deliver: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        channel: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<String>,
        #[serde(default)]
        best_effort_deliver: bool,
    },
}

impl Payload {
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::SystemEvent { .. } => "systemEvent",
            Payload::AgentTurn { .. } => "agentTurn",
        }
    }

    /// Resolve the effective `deliver` flag per §4.6's delivery decision:
    /// an explicit `to` implies delivery unless `deliver=false` was stated
    /// explicitly.
    pub fn should_deliver(&self) -> bool {
        match self {
            Payload::SystemEvent { .. } => false,
            Payload::AgentTurn { deliver, to, .. } => match (deliver, to) {
                (Some(false), _) => false,
                (Some(true), _) => true,
                (None, Some(_)) => true,
                (None, None) => false,
            },
        }
    }
}
