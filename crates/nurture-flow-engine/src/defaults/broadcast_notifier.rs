//! Lifecycle events fanned out over a tokio broadcast channel.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::traits::NotificationSink;
use crate::types::ExecutionEvent;

/// Default channel capacity. Slow subscribers lag and lose the oldest
/// events rather than blocking the step loop.
pub const DEFAULT_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<ExecutionEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl NotificationSink for BroadcastNotifier {
    async fn notify(&self, event: ExecutionEvent) {
        // No receivers is not an error.
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_events() {
        let notifier = BroadcastNotifier::default();
        let mut rx = notifier.subscribe();
        notifier
            .notify(ExecutionEvent::Cancelled {
                execution_id: "e1".into(),
                flow_id: "f1".into(),
            })
            .await;
        let event = rx.recv().await.unwrap();
        assert_eq!(event.execution_id(), "e1");
    }

    #[tokio::test]
    async fn notify_without_subscribers_is_fine() {
        BroadcastNotifier::new(4)
            .notify(ExecutionEvent::Resumed {
                execution_id: "e1".into(),
                flow_id: "f1".into(),
            })
            .await;
    }
}
