//! Status queries over the stored records.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::domain::{Hostname, MonitorError, Normalizer, TaskRecord, TaskState, WorkerRecord};
use crate::ports::{MonitorStore, TaskFilter};

use super::liveness::LivenessPolicy;

/// Visible tasks per state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskCounts {
    pub received: usize,
    pub started: usize,
    pub retry: usize,
    pub success: usize,
    pub failure: usize,
    pub revoked: usize,
    /// States outside the known lifecycle, by name.
    pub other: BTreeMap<String, usize>,
}

impl TaskCounts {
    fn add(&mut self, state: &TaskState) {
        match state {
            TaskState::Received => self.received += 1,
            TaskState::Started => self.started += 1,
            TaskState::Retry => self.retry += 1,
            TaskState::Success => self.success += 1,
            TaskState::Failure => self.failure += 1,
            TaskState::Revoked => self.revoked += 1,
            TaskState::Other(name) => *self.other.entry(name.clone()).or_default() += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.received
            + self.started
            + self.retry
            + self.success
            + self.failure
            + self.revoked
            + self.other.values().sum::<usize>()
    }
}

/// A worker together with its online status at query time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerStatus {
    #[serde(flatten)]
    pub record: WorkerRecord,
    pub alive: bool,
}

/// Read-only queries for dashboards and the CLI.
pub struct StatusView<S: ?Sized> {
    store: Arc<S>,
    normalizer: Normalizer,
    liveness: LivenessPolicy,
}

impl<S: MonitorStore + ?Sized> StatusView<S> {
    pub fn new(store: Arc<S>, normalizer: Normalizer, liveness: LivenessPolicy) -> Self {
        Self {
            store,
            normalizer,
            liveness,
        }
    }

    /// Tasks not yet past retention, newest first.
    pub fn active_tasks(&self, limit: Option<usize>) -> Result<Vec<TaskRecord>, MonitorError> {
        let mut filter = TaskFilter::active();
        filter.limit = limit;
        Ok(self.store.find_tasks(&filter)?)
    }

    pub fn tasks_in_state(&self, state: TaskState) -> Result<Vec<TaskRecord>, MonitorError> {
        Ok(self
            .store
            .find_tasks(&TaskFilter::active().with_state(state))?)
    }

    pub fn tasks_on_worker(&self, hostname: &Hostname) -> Result<Vec<TaskRecord>, MonitorError> {
        Ok(self
            .store
            .find_tasks(&TaskFilter::active().with_worker(hostname.clone()))?)
    }

    /// Workers ordered by latest stored heartbeat.
    pub fn latest_heartbeats(&self) -> Result<Vec<WorkerRecord>, MonitorError> {
        Ok(self.store.list_workers()?)
    }

    pub fn counts(&self) -> Result<TaskCounts, MonitorError> {
        let mut counts = TaskCounts::default();
        for task in self.store.find_tasks(&TaskFilter::active())? {
            counts.add(&task.state);
        }
        Ok(counts)
    }

    pub fn workers(&self) -> Result<Vec<WorkerStatus>, MonitorError> {
        let now = self.normalizer.now();
        Ok(self
            .store
            .list_workers()?
            .into_iter()
            .map(|record| WorkerStatus {
                alive: self.liveness.is_alive(&record, &now),
                record,
            })
            .collect())
    }
}
