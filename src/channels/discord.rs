//! Discord channel driver — same ambiguous-bare-id target handling as Slack.

use async_trait::async_trait;
use serde::Deserialize;

use crate::delivery::target::{parse_channel_ref, ChannelRef};

use super::{Channel, ChannelError, InboundCallback, SendOptions, SendResult};

#[derive(Debug, Clone, Deserialize)]
pub struct DiscordConfig {
    pub bot_token: String,
}

pub struct DiscordChannel {
    config: DiscordConfig,
    #[cfg(feature = "channels-discord")]
    http: reqwest::Client,
}

impl DiscordChannel {
    pub fn new(config: DiscordConfig) -> Self {
        Self {
            config,
            #[cfg(feature = "channels-discord")]
            http: reqwest::Client::new(),
        }
    }

    #[cfg(feature = "channels-discord")]
    async fn post_message(&self, channel_id: &str, text: &str) -> Result<(), String> {
        let url = format!("https://discord.com/api/v10/channels/{channel_id}/messages");
        let resp = self
            .http
            .post(&url)
            .header("Authorization", format!("Bot {}", self.config.bot_token))
            .json(&serde_json::json!({ "content": text }))
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(format!("discord API returned {}", resp.status()))
        }
    }

    #[cfg(not(feature = "channels-discord"))]
    async fn post_message(&self, _channel_id: &str, _text: &str) -> Result<(), String> {
        Err("channels-discord feature is disabled".to_string())
    }
}

#[async_trait]
impl Channel for DiscordChannel {
    fn name(&self) -> &str {
        "discord"
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
        #[cfg(feature = "channels-discord")]
        {
            // A complete implementation runs serenity's gateway client here.
            Ok(())
        }
        #[cfg(not(feature = "channels-discord"))]
        {
            Err(ChannelError::NotConfigured(
                "channels-discord feature is disabled".to_string(),
            ))
        }
    }

    async fn health_check(&self) -> bool {
        !self.config.bot_token.is_empty()
    }
}
