//! MonitorBuilder - wiring the monitor from its configuration
//!
//! # 起動時検証（Fail-fast）
//! - the configuration is validated before anything is built
//! - a store must be supplied; there is no implicit default
//! - a SQLite store opened in the other timestamp mode is refused at open

use std::sync::Arc;

use crate::config::{ConfigError, MonitorConfig};
use crate::domain::{
    ClusterState, Hostname, MonitorError, Normalizer, StateGroup, TaskId, TaskRecord, TaskState,
    TaskUpdate, Timestamp, WorkerRecord,
};
use crate::ports::{Clock, MonitorStore, SnapshotSource, SystemClock};

use super::dispatcher::{SnapshotDispatcher, SnapshotReport};
use super::liveness::{LivenessPolicy, LivenessTracker};
use super::reconciler::Reconciler;
use super::retention::{RetentionEngine, RetentionPolicy};
use super::shutter_loop::{ShutterLoop, ShutterOptions};
use super::status::StatusView;

/// BuildError はモニター構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("no store configured; call MonitorBuilder::store() before build()")]
    MissingStore,
}

/// Builds a [`Monitor`].
///
/// # 使用例
/// ```ignore
/// let monitor = MonitorBuilder::new(MonitorConfig::default())
///     .store(Arc::new(InMemoryStore::new()))
///     .build()?;
/// ```
pub struct MonitorBuilder<S: ?Sized> {
    config: MonitorConfig,
    store: Option<Arc<S>>,
    clock: Arc<dyn Clock>,
}

impl<S: MonitorStore + ?Sized + 'static> MonitorBuilder<S> {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            store: None,
            clock: Arc::new(SystemClock::new()),
        }
    }

    pub fn store(mut self, store: Arc<S>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> Result<Monitor<S>, BuildError> {
        self.config.validate()?;
        let store = self.store.ok_or(BuildError::MissingStore)?;
        let config = self.config;

        let normalizer = Normalizer::new(config.use_aware_timestamps, config.local_offset()?, self.clock);
        let liveness_policy = LivenessPolicy {
            write_interval: config.heartbeat_write_interval(),
            expected_interval: config.expected_heartbeat_interval(),
        };
        let retention_policy = RetentionPolicy {
            succeeded: config.retention(StateGroup::Succeeded),
            failed: config.retention(StateGroup::Failed),
            pending: config.retention(StateGroup::Pending),
        };

        let liveness = Arc::new(LivenessTracker::new(
            Arc::clone(&store),
            normalizer.clone(),
            liveness_policy,
        ));
        let dispatcher = Arc::new(SnapshotDispatcher::new(
            normalizer.clone(),
            Reconciler::new(Arc::clone(&store)),
            Arc::clone(&liveness),
            RetentionEngine::new(Arc::clone(&store), normalizer.clone(), retention_policy),
            config.conflict_retry.clone(),
        ));

        Ok(Monitor {
            reconciler: Reconciler::new(Arc::clone(&store)),
            retention: RetentionEngine::new(Arc::clone(&store), normalizer.clone(), retention_policy),
            status: StatusView::new(Arc::clone(&store), normalizer.clone(), liveness_policy),
            normalizer,
            liveness,
            dispatcher,
            store,
            config,
        })
    }
}

/// A wired monitor: one store, one clock, one timestamp mode.
pub struct Monitor<S: ?Sized> {
    config: MonitorConfig,
    normalizer: Normalizer,
    store: Arc<S>,
    reconciler: Reconciler<S>,
    liveness: Arc<LivenessTracker<S>>,
    retention: RetentionEngine<S>,
    dispatcher: Arc<SnapshotDispatcher<S>>,
    status: StatusView<S>,
}

impl<S: MonitorStore + ?Sized + 'static> Monitor<S> {
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn status(&self) -> &StatusView<S> {
        &self.status
    }

    pub fn reconcile(
        &self,
        task_id: &TaskId,
        state: &TaskState,
        update: &TaskUpdate,
    ) -> Result<Option<TaskRecord>, MonitorError> {
        self.reconciler.reconcile(task_id, state, update)
    }

    /// `None` records that the worker has no heartbeat (it went offline).
    pub fn handle_heartbeat(
        &self,
        hostname: &Hostname,
        heartbeat: Option<Timestamp>,
    ) -> Result<WorkerRecord, MonitorError> {
        self.liveness.handle_heartbeat(hostname, heartbeat)
    }

    pub fn is_alive(&self, record: &WorkerRecord) -> bool {
        self.liveness.is_alive(record, &self.normalizer.now())
    }

    pub fn cleanup(&self) -> Result<usize, MonitorError> {
        self.retention.cleanup()
    }

    pub fn on_snapshot(&self, state: &ClusterState) -> SnapshotReport {
        self.dispatcher.on_snapshot(state)
    }

    /// Start persisting snapshots from `source` every `snapshot_interval`.
    pub fn spawn_shutter(&self, source: Arc<dyn SnapshotSource>, clear_after: bool) -> ShutterLoop {
        ShutterLoop::spawn(
            source,
            Arc::clone(&self.dispatcher),
            ShutterOptions {
                period: self.config.snapshot_period(),
                clear_after,
            },
        )
    }
}
