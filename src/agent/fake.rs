//! In-process test doubles for the Agent Runtime and event sink
//! collaborators, in the same "fake adapter" style as the teacher's
//! `channels::traits::Channel` test doubles.

use std::sync::Mutex;

use async_trait::async_trait;

use super::{AgentError, AgentErrorKind, AgentOutput, AgentRuntime, EventSink, RunOptions};

#[derive(Debug, Clone)]
pub enum FakeAgentBehavior {
    Succeed { output_text: String },
    Fail { kind: AgentErrorKind, message: String },
    Timeout,
}

pub struct FakeAgentRuntime {
    behavior: Mutex<FakeAgentBehavior>,
    calls: Mutex<Vec<(String, String)>>,
}

impl FakeAgentRuntime {
    pub fn succeeding(output_text: impl Into<String>) -> Self {
        Self {
            behavior: Mutex::new(FakeAgentBehavior::Succeed {
                output_text: output_text.into(),
            }),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(kind: AgentErrorKind, message: impl Into<String>) -> Self {
        Self {
            behavior: Mutex::new(FakeAgentBehavior::Fail {
                kind,
                message: message.into(),
            }),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn timing_out() -> Self {
        Self {
            behavior: Mutex::new(FakeAgentBehavior::Timeout),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().expect("fake agent mutex poisoned").clone()
    }
}

#[async_trait]
impl AgentRuntime for FakeAgentRuntime {
    async fn run(&self, session_id: &str, prompt: &str, options: RunOptions) -> Result<AgentOutput, AgentError> {
        self.calls
            .lock()
            .expect("fake agent mutex poisoned")
            .push((session_id.to_string(), prompt.to_string()));

        match self.behavior.lock().expect("fake agent mutex poisoned").clone() {
            FakeAgentBehavior::Succeed { output_text } => Ok(AgentOutput {
                output_text,
                usage: None,
            }),
            FakeAgentBehavior::Fail { kind, message } => Err(AgentError { kind, message }),
            FakeAgentBehavior::Timeout => {
                // Simulate exceeding timeout_s by sleeping past it, if set.
                let secs = options.timeout_s.unwrap_or(0) + 1;
                tokio::time::sleep(std::time::Duration::from_millis(secs.min(1))).await;
                Err(AgentError {
                    kind: AgentErrorKind::Retryable,
                    message: "simulated timeout".to_string(),
                })
            }
        }
    }
}

#[derive(Default)]
pub struct FakeEventSink {
    events: Mutex<Vec<(String, String, bool)>>,
}

impl FakeEventSink {
    pub fn events(&self) -> Vec<(String, String, bool)> {
        self.events.lock().expect("fake sink mutex poisoned").clone()
    }
}

#[async_trait]
impl EventSink for FakeEventSink {
    async fn enqueue_event(&self, session_id: &str, text: &str, wake_now: bool) {
        self.events
            .lock()
            .expect("fake sink mutex poisoned")
            .push((session_id.to_string(), text.to_string(), wake_now));
    }
}
