//! Status fan-out. Pushes registry changes to observers.
//!
//! [`StatusHub`] is a thin wrapper around [`tokio::sync::broadcast`].
//! Publishing never blocks: each subscriber has its own cursor into a
//! shared bounded buffer. A subscriber that falls more than `capacity`
//! messages behind observes `RecvError::Lagged` and skips the oldest
//! messages. Dropping a receiver unsubscribes it.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use crate::types::{HealthSample, RequestLogEntry, WorkerId, WorkerRecord};

/// A message on the push channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StatusEvent {
    /// Full table after a mutation or a health tick.
    StatusSnapshot { workers: Vec<WorkerRecord> },
    /// A probe sample was appended for one worker.
    HistoryUpdate { id: WorkerId, sample: HealthSample },
    /// A routed request was appended to one worker's audit log.
    RequestLogged { id: WorkerId, entry: RequestLogEntry },
}

impl StatusEvent {
    /// Event name used on the SSE stream.
    pub fn kind(&self) -> &'static str {
        match self {
            StatusEvent::StatusSnapshot { .. } => "status-snapshot",
            StatusEvent::HistoryUpdate { .. } => "history-update",
            StatusEvent::RequestLogged { .. } => "request-logged",
        }
    }
}

/// Best-effort broadcaster of [`StatusEvent`]s. Cheap to clone.
#[derive(Clone, Debug)]
pub struct StatusHub {
    tx: broadcast::Sender<StatusEvent>,
}

impl StatusHub {
    /// The minimum capacity is 1 (clamped).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Send to every current subscriber. Dropped when nobody listens.
    pub fn publish(&self, event: StatusEvent) {
        let kind = event.kind();
        match self.tx.send(event) {
            Ok(receivers) => trace!(kind, receivers, "status event published"),
            Err(_) => trace!(kind, "status event dropped, no subscribers"),
        }
    }

    /// A receiver that observes events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for StatusHub {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::RecvError;

    fn snapshot(n: usize) -> StatusEvent {
        StatusEvent::StatusSnapshot {
            workers: Vec::with_capacity(n),
        }
    }

    #[test]
    fn publish_without_subscribers_does_not_block() {
        let hub = StatusHub::new(4);
        for i in 0..100 {
            hub.publish(snapshot(i));
        }
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn subscriber_receives_in_order() {
        let hub = StatusHub::new(8);
        let mut rx = hub.subscribe();

        hub.publish(snapshot(0));
        hub.publish(StatusEvent::HistoryUpdate {
            id: "a".to_string(),
            sample: HealthSample {
                status: crate::HealthStatus::Healthy,
                response_time_ms: 3,
                timestamp: chrono::Utc::now(),
            },
        });

        assert_eq!(rx.recv().await.unwrap().kind(), "status-snapshot");
        assert_eq!(rx.recv().await.unwrap().kind(), "history-update");
    }

    #[tokio::test]
    async fn slow_subscriber_lags_instead_of_blocking() {
        let hub = StatusHub::new(2);
        let mut rx = hub.subscribe();

        for i in 0..5 {
            hub.publish(snapshot(i));
        }

        match rx.recv().await {
            Err(RecvError::Lagged(skipped)) => assert_eq!(skipped, 3),
            other => panic!("expected lag, got {other:?}"),
        }
        assert!(rx.recv().await.is_ok());
    }

    #[test]
    fn dropping_receiver_unsubscribes() {
        let hub = StatusHub::new(2);
        let rx = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 1);
        drop(rx);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn events_serialize_with_kind_tag() {
        let json = serde_json::to_value(snapshot(0)).unwrap();
        assert_eq!(json["type"], "status-snapshot");
        assert!(json["workers"].as_array().unwrap().is_empty());
    }
}
