use tokio::sync::broadcast;

use crate::types::WorkflowEvent;

/// Events buffered per subscriber before the slowest one starts losing them.
///
/// A run publishes a handful of events per task, so this covers a
/// fan-out of a few hundred lineage copies between two reads.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Fan-out of [`WorkflowEvent`]s from the scheduler to any observers.
///
/// Publishing never blocks the scheduler and never fails: with no
/// subscribers the event is dropped. A subscriber that falls more than
/// the capacity behind gets `RecvError::Lagged` with the number of events
/// it missed, then resumes from the oldest one still buffered. Task state
/// lives in the workflow graph, so a lagging observer can always re-read
/// it there.
pub struct EventBus {
    tx: broadcast::Sender<WorkflowEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: WorkflowEvent) {
        let _ = self.tx.send(event);
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new(4);
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish(WorkflowEvent::TaskStarted { node_id: 1 });
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        bus.publish(WorkflowEvent::TaskCompleted { node_id: 7 });
        match rx.recv().await.unwrap() {
            WorkflowEvent::TaskCompleted { node_id } => assert_eq!(node_id, 7),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_slow_subscriber_lags_then_resumes() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for node_id in 1..=4 {
            bus.publish(WorkflowEvent::TaskStarted { node_id });
        }
        assert!(matches!(rx.recv().await, Err(broadcast::error::RecvError::Lagged(2))));
        match rx.recv().await.unwrap() {
            WorkflowEvent::TaskStarted { node_id } => assert_eq!(node_id, 3),
            other => panic!("unexpected event {:?}", other),
        }
    }
}
