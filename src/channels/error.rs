use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel transport error: {0}")]
    Transport(String),
    #[error("channel not configured: {0}")]
    NotConfigured(String),
}
