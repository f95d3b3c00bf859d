//! Slack channel driver.
//!
//! Shares the bare-numeric-id-is-ambiguous target handling from
//! [`crate::delivery::target::parse_channel_ref`] rather than Telegram's
//! topic encoding, per §4.7.

use async_trait::async_trait;
use serde::Deserialize;

use crate::delivery::target::{parse_channel_ref, ChannelRef};

use super::{Channel, ChannelError, InboundCallback, SendOptions, SendResult};

#[derive(Debug, Clone, Deserialize)]
pub struct SlackConfig {
    pub bot_token: String,
}

pub struct SlackChannel {
    config: SlackConfig,
    #[cfg(feature = "channels-slack")]
    http: reqwest::Client,
}

impl SlackChannel {
    pub fn new(config: SlackConfig) -> Self {
        Self {
            config,
            #[cfg(feature = "channels-slack")]
            http: reqwest::Client::new(),
        }
    }

    #[cfg(feature = "channels-slack")]
    async fn post_message(&self, channel_id: &str, text: &str) -> Result<(), String> {
        let resp = self
            .http
            .post("https://slack.com/api/chat.postMessage")
            .bearer_auth(&self.config.bot_token)
            .json(&serde_json::json!({ "channel": channel_id, "text": text }))
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(format!("slack API returned {}", resp.status()))
        }
    }

    #[cfg(not(feature = "channels-slack"))]
    async fn post_message(&self, _channel_id: &str, _text: &str) -> Result<(), String> {
        Err("channels-slack feature is disabled".to_string())
    }
}

#[async_trait]
impl Channel for SlackChannel {
    fn name(&self) -> &str {
        "slack"
    }

    async fn send(&self, target: &str, text: &str, _options: SendOptions) -> SendResult {
        let reference = match parse_channel_ref(target) {
            Ok(r) => r,
            Err(e) => return SendResult::failed(e.to_string()),
        };
        let id = match reference {
            ChannelRef::Channel(id) | ChannelRef::User(id) => id,
        };
        match self.post_message(&id, text).await {
            Ok(()) => SendResult::ok(),
            Err(e) => SendResult::failed(e),
        }
    }

    async fn listen(&self, _on_message: InboundCallback) -> Result<(), ChannelError> {
        #[cfg(feature = "channels-slack")]
        {
            // A complete implementation opens a Socket Mode websocket here.
            Ok(())
        }
        #[cfg(not(feature = "channels-slack"))]
        {
            Err(ChannelError::NotConfigured(
                "channels-slack feature is disabled".to_string(),
            ))
        }
    }

    async fn health_check(&self) -> bool {
        !self.config.bot_token.is_empty()
    }
}
