//! Delivery Router (§4.7): resolves the effective `(channel, target)` for a
//! run's output and sends it via the Channel Driver interface.
//!
//! Grounded on `channels::traits::Channel` (trait shape reused verbatim)
//! and `channels::telegram::TelegramChannel`; the `(to, deliver)` truth
//! table lives in [`crate::model::Payload::should_deliver`] so it is
//! implemented exactly once (§9).

mod error;
mod last_route;
pub mod target;

pub use error::DeliveryError;
pub use last_route::{route_now, FileLastRouteStore, LastRouteStore};

use std::sync::Arc;

use crate::channels::{ChannelManager, SendOptions};
use crate::model::{DeliveryOutcome, Outcome, SessionKey};

/// What the Executor asks the Delivery Router to do for one run's output.
pub struct DeliveryRequest<'a> {
    pub session_key: &'a SessionKey,
    pub channel: Option<&'a str>,
    pub to: Option<&'a str>,
    pub text: &'a str,
}

pub struct DeliveryRouter {
    channels: Arc<ChannelManager>,
    last_route: Arc<dyn LastRouteStore>,
}

impl DeliveryRouter {
    pub fn new(channels: Arc<ChannelManager>, last_route: Arc<dyn LastRouteStore>) -> Self {
        Self { channels, last_route }
    }

    /// Resolve a route, send, and — on success — update the session's
    /// LastRoute. Never fails the caller for a send failure; that is
    /// reported through the returned [`DeliveryOutcome`] and the caller
    /// (the Executor) decides the run outcome based on `best_effort_deliver`.
    pub async fn deliver(&self, req: DeliveryRequest<'_>) -> Result<DeliveryOutcome, DeliveryError> {
        let (channel, target) = self.resolve_route(&req).await?;

        let result = self
            .channels
            .send(&channel, &target, req.text, SendOptions::default())
            .await;

        if result.ok {
            self.last_route
                .set(req.session_key.as_str(), route_now(&channel, &target))
                .await?;
        }

        Ok(DeliveryOutcome {
            channel,
            target,
            status: if result.ok { Outcome::Ok } else { Outcome::Failed },
            error_detail: result.error_kind,
        })
    }

    async fn resolve_route(&self, req: &DeliveryRequest<'_>) -> Result<(String, String), DeliveryError> {
        if let Some(to) = req.to {
            let channel = req
                .channel
                .ok_or_else(|| DeliveryError::InvalidTarget("`to` set without `channel`".to_string()))?;
            return Ok((channel.to_string(), to.to_string()));
        }

        let route = self
            .last_route
            .get(req.session_key.as_str())
            .await
            .ok_or_else(|| DeliveryError::NoRoute(req.session_key.as_str().to_string()))?;
        Ok((route.channel, route.target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::fake::FakeChannel;
    use tempfile::TempDir;

    fn router(dir: &TempDir) -> DeliveryRouter {
        let channels = Arc::new(ChannelManager::new());
        channels.register(Arc::new(FakeChannel::new("slack")));
        channels.register(Arc::new(FakeChannel::failing("flaky")));
        let last_route = Arc::new(FileLastRouteStore::open(dir.path()).unwrap());
        DeliveryRouter::new(channels, last_route)
    }

    #[tokio::test]
    async fn explicit_to_and_channel_deliver_directly() {
        let dir = TempDir::new().unwrap();
        let router = router(&dir);
        let key = SessionKey::isolated("agent-a", &"job-1".to_string());
        let outcome = router
            .deliver(DeliveryRequest {
                session_key: &key,
                channel: Some("slack"),
                to: Some("channel:C1"),
                text: "OUT",
            })
            .await
            .unwrap();
        assert_eq!(outcome.status, Outcome::Ok);
        assert_eq!(outcome.channel, "slack");
        assert_eq!(outcome.target, "channel:C1");
    }

    #[tokio::test]
    async fn falls_back_to_last_route_when_no_explicit_target() {
        let dir = TempDir::new().unwrap();
        let router = router(&dir);
        let key = SessionKey::main("agent-a");
        router
            .last_route
            .set(key.as_str(), route_now("slack", "channel:C1"))
            .await
            .unwrap();

        let outcome = router
            .deliver(DeliveryRequest {
                session_key: &key,
                channel: None,
                to: None,
                text: "OUT",
            })
            .await
            .unwrap();
        assert_eq!(outcome.channel, "slack");
        assert_eq!(outcome.target, "channel:C1");
    }

    #[tokio::test]
    async fn no_route_and_no_explicit_target_errors() {
        let dir = TempDir::new().unwrap();
        let router = router(&dir);
        let key = SessionKey::main("agent-a");
        let err = router
            .deliver(DeliveryRequest {
                session_key: &key,
                channel: None,
                to: None,
                text: "OUT",
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::NoRoute(_)));
    }

    #[tokio::test]
    async fn send_failure_is_reported_not_raised() {
        let dir = TempDir::new().unwrap();
        let router = router(&dir);
        let key = SessionKey::main("agent-a");
        let outcome = router
            .deliver(DeliveryRequest {
                session_key: &key,
                channel: Some("flaky"),
                to: Some("channel:C1"),
                text: "OUT",
            })
            .await
            .unwrap();
        assert_eq!(outcome.status, Outcome::Failed);
    }
}
