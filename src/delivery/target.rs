//! Channel-specific target parsing and canonicalisation.
//!
//! The Telegram topic encoding is new — grounded on the general
//! "parse then canonicalise" shape of
//! `channels::telegram::TelegramChannel::parse_bot_command`, since the
//! upstream Telegram channel took a bare chat-id string with no topic
//! encoding at all.

use super::DeliveryError;

/// A normalised Telegram delivery target: a chat id plus an optional forum
/// topic id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelegramTarget {
    pub chat_id: i64,
    pub topic_id: Option<i64>,
}

impl TelegramTarget {
    /// Accepts `<chat_id>`, `<chat_id>:topic:<id>`, `<chat_id>:<id>`
    /// (shorthand — a bare numeric suffix is treated as a topic id), and
    /// prefixed variants `telegram:group:<chat_id>:topic:<id>` /
    /// `telegram:<chat_id>...`.
    pub fn parse(raw: &str) -> Result<Self, DeliveryError> {
        let stripped = raw
            .strip_prefix("telegram:group:")
            .or_else(|| raw.strip_prefix("telegram:"))
            .unwrap_or(raw);

        let parts: Vec<&str> = stripped.split(':').collect();
        match parts.as_slice() {
            [chat] => Ok(Self {
                chat_id: parse_i64(chat, raw)?,
                topic_id: None,
            }),
            [chat, "topic", topic] => Ok(Self {
                chat_id: parse_i64(chat, raw)?,
                topic_id: Some(parse_i64(topic, raw)?),
            }),
            [chat, topic] => Ok(Self {
                chat_id: parse_i64(chat, raw)?,
                topic_id: Some(parse_i64(topic, raw)?),
            }),
            _ => Err(DeliveryError::InvalidTarget(raw.to_string())),
        }
    }

    /// Canonical string form: `<chat_id>` or `<chat_id>:topic:<id>`.
    pub fn canonical(&self) -> String {
        match self.topic_id {
            Some(topic) => format!("{}:topic:{}", self.chat_id, topic),
            None => self.chat_id.to_string(),
        }
    }
}

fn parse_i64(field: &str, raw: &str) -> Result<i64, DeliveryError> {
    field
        .parse::<i64>()
        .map_err(|_| DeliveryError::InvalidTarget(raw.to_string()))
}

/// Disambiguated reference for channels (Slack/Discord/Mattermost) that
/// don't have a bespoke encoding: a bare numeric id is rejected because it
/// could name either a channel or a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelRef {
    Channel(String),
    User(String),
}

pub fn parse_channel_ref(raw: &str) -> Result<ChannelRef, DeliveryError> {
    if let Some(id) = raw.strip_prefix("channel:") {
        return Ok(ChannelRef::Channel(id.to_string()));
    }
    if let Some(id) = raw.strip_prefix("user:") {
        return Ok(ChannelRef::User(id.to_string()));
    }
    if raw.chars().all(|c| c.is_ascii_digit() || c == '-') && !raw.is_empty() {
        return Err(DeliveryError::AmbiguousTarget(raw.to_string()));
    }
    Ok(ChannelRef::Channel(raw.to_string()))
}
