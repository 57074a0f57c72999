//! Event collector: folds incoming events into a shared [`ClusterState`].

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::{ClusterState, Event};
use crate::ports::SnapshotSource;

#[derive(Debug, Default)]
struct CollectorState {
    cluster: ClusterState,
    events: u64,
    closed: bool,
}

/// In-process aggregator. Producers call [`EventCollector::push`]; the
/// shutter loop reads it through [`SnapshotSource`].
#[derive(Debug, Default)]
pub struct EventCollector {
    state: Mutex<CollectorState>,
}

impl EventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: &Event) {
        let mut state = self.state.lock();
        state.cluster.apply(event);
        state.events += 1;
    }

    /// Events folded so far.
    pub fn events_seen(&self) -> u64 {
        self.state.lock().events
    }

    /// After closing, `capture` returns `None` and the shutter loop stops.
    pub fn close(&self) {
        self.state.lock().closed = true;
    }

    pub fn snapshot(&self) -> ClusterState {
        self.state.lock().cluster.clone()
    }
}

#[async_trait]
impl SnapshotSource for EventCollector {
    async fn capture(&self) -> Option<ClusterState> {
        let state = self.state.lock();
        (!state.closed).then(|| state.cluster.clone())
    }

    async fn clear(&self) {
        self.state.lock().cluster.clear_ready();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EventKind;

    #[tokio::test]
    async fn capture_reflects_pushed_events_until_closed() {
        let collector = EventCollector::new();
        collector.push(&Event::task(EventKind::Received, "t1", 1.0).with_field("name", "a"));
        collector.push(&Event::task(EventKind::Success, "t2", 2.0).with_field("name", "b"));

        let state = collector.capture().await.unwrap();
        assert_eq!(state.tasks.len(), 2);
        assert_eq!(collector.events_seen(), 2);

        collector.clear().await;
        assert_eq!(collector.snapshot().tasks.len(), 1);

        collector.close();
        assert!(collector.capture().await.is_none());
    }
}
