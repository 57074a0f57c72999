//! TaskStore port - task records の正本（source of truth）
//!
//! # 設計原則
//! - Every write to one task_id happens under an exclusive row scope: the
//!   store reads the current row, asks the caller what to write, and applies
//!   it before anyone else can touch that row.
//! - Hiding is monotonic. Stores never reset `hidden`.
//! - Purge is a single transaction.

use crate::domain::{Hostname, StateGroup, StoreError, TaskId, TaskRecord, TaskState, TaskWrite, Timestamp};

/// Query filter for task listings. Unset fields match everything.
/// Results are ordered newest `received_at` first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskFilter {
    pub hidden: Option<bool>,
    pub state: Option<TaskState>,
    pub worker: Option<Hostname>,
    pub limit: Option<usize>,
}

impl TaskFilter {
    /// Records not yet past retention.
    pub fn active() -> Self {
        Self {
            hidden: Some(false),
            ..Self::default()
        }
    }

    pub fn with_state(mut self, state: TaskState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_worker(mut self, worker: Hostname) -> Self {
        self.worker = Some(worker);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, record: &TaskRecord) -> bool {
        self.hidden.is_none_or(|h| record.hidden == h)
            && self.state.as_ref().is_none_or(|s| &record.state == s)
            && self
                .worker
                .as_ref()
                .is_none_or(|w| record.worker.as_ref() == Some(w))
    }
}

pub trait TaskStore: Send + Sync {
    /// Lock the row for `task_id`, pass the current record (if any) to
    /// `decide`, apply the write it returns, and return the stored result.
    /// `TaskWrite::Skip` leaves the row untouched and yields `None`.
    fn write_task(
        &self,
        task_id: &TaskId,
        decide: &mut dyn FnMut(Option<&TaskRecord>) -> TaskWrite,
    ) -> Result<Option<TaskRecord>, StoreError>;

    fn get_task(&self, task_id: &TaskId) -> Result<Option<TaskRecord>, StoreError>;

    fn find_tasks(&self, filter: &TaskFilter) -> Result<Vec<TaskRecord>, StoreError>;

    /// Mark visible records in `group` received at or before `cutoff` as
    /// hidden. Returns how many were newly hidden.
    fn hide_expired(&self, group: StateGroup, cutoff: Timestamp) -> Result<usize, StoreError>;

    /// Delete every hidden record in one transaction. Returns rows deleted.
    fn purge_hidden(&self) -> Result<usize, StoreError>;
}
