//! Snapshot dispatcher: persists one cluster snapshot.
//!
//! Order per pass: workers, then tasks, then retention. Each entity is
//! written on its own; a failure on one task is logged and counted and the
//! pass carries on. Replaying the same snapshot writes nothing new.

use std::sync::Arc;
use std::thread;

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::ConflictRetry;
use crate::domain::{
    ClusterState, MonitorError, Normalizer, RawTimestamp, TaskSnapshot, TaskUpdate, Timestamp,
    WorkerSnapshot,
};
use crate::ports::MonitorStore;

use super::liveness::LivenessTracker;
use super::reconciler::Reconciler;
use super::retention::RetentionEngine;

/// Outcome of one dispatch pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SnapshotReport {
    pub workers: usize,
    pub workers_failed: usize,
    pub tasks_written: usize,
    /// Unseen tasks whose events did not carry a name.
    pub tasks_skipped: usize,
    pub tasks_failed: usize,
    /// Records hidden by the retention run at the end of the pass.
    pub expired: usize,
}

pub struct SnapshotDispatcher<S: ?Sized> {
    normalizer: Normalizer,
    reconciler: Reconciler<S>,
    liveness: Arc<LivenessTracker<S>>,
    retention: RetentionEngine<S>,
    retry: ConflictRetry,
}

impl<S: MonitorStore + ?Sized> SnapshotDispatcher<S> {
    pub fn new(
        normalizer: Normalizer,
        reconciler: Reconciler<S>,
        liveness: Arc<LivenessTracker<S>>,
        retention: RetentionEngine<S>,
        retry: ConflictRetry,
    ) -> Self {
        Self {
            normalizer,
            reconciler,
            liveness,
            retention,
            retry,
        }
    }

    pub fn on_snapshot(&self, state: &ClusterState) -> SnapshotReport {
        let mut report = SnapshotReport::default();

        for worker in state.workers.values() {
            match self.with_conflict_retry(|| self.store_worker(worker)) {
                Ok(()) => report.workers += 1,
                Err(err) => {
                    warn!(hostname = %worker.hostname, error = %err, "failed to store worker");
                    report.workers_failed += 1;
                }
            }
        }

        for task in state.tasks.values() {
            match self.with_conflict_retry(|| self.store_task(task)) {
                Ok(true) => report.tasks_written += 1,
                Ok(false) => report.tasks_skipped += 1,
                Err(err) => {
                    warn!(task_id = %task.task_id, error = %err, "failed to store task");
                    report.tasks_failed += 1;
                }
            }
        }

        match self.with_conflict_retry(|| self.retention.cleanup()) {
            Ok(expired) => report.expired = expired,
            Err(err) => warn!(error = %err, "retention cleanup failed"),
        }

        debug!(
            workers = report.workers,
            tasks_written = report.tasks_written,
            tasks_skipped = report.tasks_skipped,
            tasks_failed = report.tasks_failed,
            expired = report.expired,
            "snapshot dispatched"
        );
        report
    }

    fn store_worker(&self, worker: &WorkerSnapshot) -> Result<(), MonitorError> {
        let heartbeat = worker
            .last_heartbeat()
            .map(|secs| self.normalizer.normalize_value(&RawTimestamp::Epoch(secs)))
            .transpose()?;
        self.liveness.handle_heartbeat(&worker.hostname, heartbeat)?;
        Ok(())
    }

    /// `Ok(false)` when the task was skipped for lack of a name.
    fn store_task(&self, task: &TaskSnapshot) -> Result<bool, MonitorError> {
        let update = self.task_update(task)?;
        if let Some(worker) = &update.worker {
            self.liveness.touch(worker)?;
        }
        let stored = self
            .reconciler
            .reconcile(&task.task_id, &task.state, &update)?;
        Ok(stored.is_some())
    }

    fn task_update(&self, task: &TaskSnapshot) -> Result<TaskUpdate, MonitorError> {
        let received_at = self
            .normalizer
            .normalize_value(&RawTimestamp::Epoch(task.timestamp))?;
        let mut update = TaskUpdate::new(received_at);
        update.name = task.name.clone();
        update.args = task.args.clone();
        update.kwargs = task.kwargs.clone();
        update.eta = self.optional_timestamp(task.eta.as_ref())?;
        update.expires = self.optional_timestamp(task.expires.as_ref())?;
        update.result = task.result_or_exception().map(str::to_string);
        update.traceback = task.traceback.clone();
        update.runtime = task.runtime;
        update.retries = task.retries;
        update.worker = task.worker.clone();
        Ok(update)
    }

    fn optional_timestamp(&self, value: Option<&serde_json::Value>) -> Result<Option<Timestamp>, MonitorError> {
        match value {
            Some(value) => Ok(self.normalizer.normalize_json(value)?),
            None => Ok(None),
        }
    }

    /// Run `op`, retrying transient failures with backoff.
    fn with_conflict_retry<T>(
        &self,
        mut op: impl FnMut() -> Result<T, MonitorError>,
    ) -> Result<T, MonitorError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match op() {
                Err(err) if err.is_transient() && attempts < self.retry.max_attempts => {
                    let delay = self.retry.next_delay(attempts);
                    debug!(attempts, ?delay, error = %err, "write conflict, retrying");
                    thread::sleep(delay);
                }
                other => return other,
            }
        }
    }
}
