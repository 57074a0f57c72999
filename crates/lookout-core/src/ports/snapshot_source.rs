//! SnapshotSource port - the event aggregator seen from the shutter loop.

use async_trait::async_trait;

use crate::domain::ClusterState;

/// Hands out the current cluster state at each shutter.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Current state, or `None` once the source is closed.
    async fn capture(&self) -> Option<ClusterState>;

    /// Forget finished tasks after they were persisted.
    async fn clear(&self) {}
}
