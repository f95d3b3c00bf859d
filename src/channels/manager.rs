//! Registry of active channel drivers.
//!
//! Grounded on `channels::manager::ChannelManager`; the teacher's
//! `RwLock<HashMap<String, Arc<dyn Channel>>>` is replaced with `DashMap`
//! (already pulled in for the Lane Dispatcher) for lock-free reads on the
//! hot `send` path.

use std::sync::Arc;

use dashmap::DashMap;

use super::{Channel, ChannelError, InboundCallback, SendOptions, SendResult};

#[derive(Default)]
pub struct ChannelManager {
    channels: DashMap<String, Arc<dyn Channel>>,
}

impl ChannelManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, channel: Arc<dyn Channel>) {
        self.channels.insert(channel.name().to_string(), channel);
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.channels.remove(name).is_some()
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.channels.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Channel>> {
        self.channels.get(name).map(|e| e.value().clone())
    }

    pub async fn send(&self, channel: &str, target: &str, text: &str, options: SendOptions) -> SendResult {
        match self.get(channel) {
            Some(c) => c.send(target, text, options).await,
            None => SendResult::failed(format!("channel `{channel}` is not registered")),
        }
    }

    /// Health-check every registered channel concurrently.
    pub async fn health_all(&self) -> Vec<(String, bool)> {
        let channels: Vec<Arc<dyn Channel>> = self.channels.iter().map(|e| e.value().clone()).collect();
        let checks = channels.iter().map(|c| async { (c.name().to_string(), c.health_check().await) });
        futures::future::join_all(checks).await
    }

    /// Spawn every registered channel's `listen` loop, each forwarding
    /// inbound messages to `on_message`.
    pub fn start_all(&self, on_message: InboundCallback) -> Vec<tokio::task::JoinHandle<Result<(), ChannelError>>> {
        self.channels
            .iter()
            .map(|e| {
                let channel = e.value().clone();
                let cb = on_message.clone();
                tokio::spawn(async move { channel.listen(cb).await })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::fake::FakeChannel;

    #[tokio::test]
    async fn register_then_send_routes_to_channel() {
        let manager = ChannelManager::new();
        let fake = Arc::new(FakeChannel::new("telegram"));
        manager.register(fake.clone());

        let result = manager.send("telegram", "555", "hi", SendOptions::default()).await;
        assert!(result.ok);
        assert_eq!(fake.sent().len(), 1);
    }

    #[tokio::test]
    async fn send_to_unregistered_channel_fails() {
        let manager = ChannelManager::new();
        let result = manager.send("telegram", "555", "hi", SendOptions::default()).await;
        assert!(!result.ok);
    }

    #[tokio::test]
    async fn unregister_removes_channel() {
        let manager = ChannelManager::new();
        manager.register(Arc::new(FakeChannel::new("telegram")));
        assert_eq!(manager.len(), 1);
        assert!(manager.unregister("telegram"));
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn health_all_reports_each_channel() {
        let manager = ChannelManager::new();
        manager.register(Arc::new(FakeChannel::new("telegram")));
        manager.register(Arc::new(FakeChannel::with_health("slack", false)));

        let mut results = manager.health_all().await;
        results.sort();
        assert_eq!(
            results,
            vec![("slack".to_string(), false), ("telegram".to_string(), true)]
        );
    }
}
