//! In-process test double, mirroring the `AlwaysHealthy`/`AlwaysUnhealthy`
//! doubles in the teacher's `channels::manager` test module.

use std::sync::Mutex;

use async_trait::async_trait;

use super::{Channel, ChannelError, InboundCallback, SendOptions, SendResult};

pub struct FakeChannel {
    name: String,
    healthy: bool,
    fail_send: bool,
    sent: Mutex<Vec<(String, String)>>,
}

impl FakeChannel {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            healthy: true,
            fail_send: false,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn with_health(name: &str, healthy: bool) -> Self {
        Self {
            healthy,
            ..Self::new(name)
        }
    }

    pub fn failing(name: &str) -> Self {
        Self {
            fail_send: true,
            ..Self::new(name)
        }
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().expect("fake channel mutex poisoned").clone()
    }
}

#[async_trait]
impl Channel for FakeChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, target: &str, text: &str, _options: SendOptions) -> SendResult {
        if self.fail_send {
            return SendResult::failed("fake_send_failure");
        }
        self.sent
            .lock()
            .expect("fake channel mutex poisoned")
            .push((target.to_string(), text.to_string()));
        SendResult::ok()
    }

    async fn listen(&self, _on_message: InboundCallback) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }
}
