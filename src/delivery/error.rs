use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("invalid delivery target `{0}`")]
    InvalidTarget(String),
    #[error("ambiguous delivery target `{0}`: prefix with channel: or user:")]
    AmbiguousTarget(String),
    #[error("no channel named `{0}` is registered")]
    ChannelNotRegistered(String),
    #[error("no route available for session `{0}`")]
    NoRoute(String),
    #[error("channel send failed: {0}")]
    ChannelSendFailed(String),
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl From<std::io::Error> for DeliveryError {
    fn from(e: std::io::Error) -> Self {
        DeliveryError::StorageUnavailable(e.to_string())
    }
}

impl From<serde_json::Error> for DeliveryError {
    fn from(e: serde_json::Error) -> Self {
        DeliveryError::StorageUnavailable(e.to_string())
    }
}
