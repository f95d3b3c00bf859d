//! The uniform interface the engine sees every chat surface through.
//!
//! Kept close to the teacher's `channels::traits::Channel` — the
//! `send`/`listen`/`health_check` shape is reused near-verbatim; `send`
//! gains a `SendOptions` struct to carry `reply_to`/`attachments` per the
//! collaborator interface in §6.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ChannelError;

/// An inbound message observed on some channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub channel: String,
    pub sender: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Events a channel driver's `listen` loop may emit, beyond plain messages.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    Message(ChannelMessage),
    Reconnected,
    Disconnected { reason: String },
}

#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    pub reply_to: Option<String>,
    pub attachments: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SendResult {
    pub ok: bool,
    pub error_kind: Option<String>,
}

impl SendResult {
    pub fn ok() -> Self {
        Self {
            ok: true,
            error_kind: None,
        }
    }

    pub fn failed(kind: impl Into<String>) -> Self {
        Self {
            ok: false,
            error_kind: Some(kind.into()),
        }
    }
}

/// Callback the engine registers at startup to receive inbound messages.
pub type InboundCallback = Arc<dyn Fn(ChannelMessage) + Send + Sync>;

#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, target: &str, text: &str, options: SendOptions) -> SendResult;

    /// Run the channel's inbound I/O loop, invoking `on_message` for each
    /// message observed, until cancelled or a fatal transport error occurs.
    async fn listen(&self, on_message: InboundCallback) -> Result<(), ChannelError>;

    async fn health_check(&self) -> bool;
}
