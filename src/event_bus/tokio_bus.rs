//! Grounded near-verbatim on `event_bus::tokio_bus::TokioBroadcastBus`.

use tokio::sync::broadcast;

use super::traits::{AppEvent, EventBus};

const DEFAULT_CAPACITY: usize = 1024;

pub struct TokioBroadcastBus {
    sender: broadcast::Sender<AppEvent>,
}

impl TokioBroadcastBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }
}

impl Default for TokioBroadcastBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus for TokioBroadcastBus {
    fn publish(&self, event: AppEvent) -> Result<(), String> {
        self.sender.send(event).map(|_| ()).map_err(|e| e.to_string())
    }

    fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_then_receive() {
        let bus = TokioBroadcastBus::new();
        let mut rx = bus.subscribe();
        bus.publish(AppEvent::SystemReady).unwrap();
        assert!(matches!(rx.recv().await.unwrap(), AppEvent::SystemReady));
    }

    #[tokio::test]
    async fn multiple_subscribers_all_receive() {
        let bus = TokioBroadcastBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        bus.publish(AppEvent::CronFired {
            job_id: "j1".into(),
            run_id: "r1".into(),
        })
        .unwrap();
        assert!(matches!(rx1.recv().await.unwrap(), AppEvent::CronFired { .. }));
        assert!(matches!(rx2.recv().await.unwrap(), AppEvent::CronFired { .. }));
    }

    #[tokio::test]
    async fn lagged_receiver_reports_error() {
        let bus = TokioBroadcastBus::with_capacity(1);
        let mut slow_rx = bus.subscribe();
        bus.publish(AppEvent::SystemReady).unwrap();
        bus.publish(AppEvent::SystemError {
            message: "overflow".into(),
        })
        .unwrap();
        let result = slow_rx.recv().await;
        assert!(matches!(result, Err(broadcast::error::RecvError::Lagged(_))));
    }
}
