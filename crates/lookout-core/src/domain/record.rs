//! Persisted records and the partial updates folded into them.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Hostname, OriginField, TaskId, TaskState, Timestamp};

/// Stored view of one task.
///
/// Design:
/// - `task_id` is unique across all records.
/// - `hidden` marks a record past retention, pending purge. It is never reset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: TaskId,
    pub state: TaskState,
    pub name: Option<String>,
    pub args: Option<String>,
    pub kwargs: Option<String>,
    pub eta: Option<Timestamp>,
    pub expires: Option<Timestamp>,
    pub result: Option<String>,
    pub traceback: Option<String>,
    /// Execution time in seconds, only reported on success.
    pub runtime: Option<f64>,
    pub retries: i64,
    pub worker: Option<Hostname>,
    /// When the event was received ("tstamp").
    pub received_at: Timestamp,
    pub hidden: bool,
}

impl TaskRecord {
    /// Build a fresh record from an update. Returns `None` when the update
    /// has no task name, since a nameless record is unusable.
    pub fn create(task_id: TaskId, state: TaskState, update: &TaskUpdate) -> Option<Self> {
        let name = update.name.as_ref().filter(|n| !n.is_empty())?.clone();
        Some(Self {
            task_id,
            state,
            name: Some(name),
            args: update.args.clone(),
            kwargs: update.kwargs.clone(),
            eta: update.eta,
            expires: update.expires,
            result: update.result.clone(),
            traceback: update.traceback.clone(),
            runtime: update.runtime,
            retries: update.retries.unwrap_or(0),
            worker: update.worker.clone(),
            received_at: update.received_at,
            hidden: false,
        })
    }

    /// Apply every field present in `patch`. Absent fields are untouched.
    pub fn apply(&mut self, patch: &TaskPatch) {
        if let Some(state) = &patch.state {
            self.state = state.clone();
        }
        let u = &patch.fields;
        if let Some(v) = &u.name {
            self.name = Some(v.clone());
        }
        if let Some(v) = &u.args {
            self.args = Some(v.clone());
        }
        if let Some(v) = &u.kwargs {
            self.kwargs = Some(v.clone());
        }
        if let Some(v) = u.eta {
            self.eta = Some(v);
        }
        if let Some(v) = u.expires {
            self.expires = Some(v);
        }
        if let Some(v) = &u.result {
            self.result = Some(v.clone());
        }
        if let Some(v) = &u.traceback {
            self.traceback = Some(v.clone());
        }
        if let Some(v) = u.runtime {
            self.runtime = Some(v);
        }
        if let Some(v) = u.retries {
            self.retries = v;
        }
        if let Some(v) = &u.worker {
            self.worker = Some(v.clone());
        }
        self.received_at = u.received_at;
    }
}

impl fmt::Display for TaskRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.name.as_deref().unwrap_or("UNKNOWN");
        write!(f, "{:<10} {:<36} {}", self.state.as_str(), self.task_id.as_str(), name)?;
        if let Some(eta) = &self.eta {
            write!(f, " eta:{eta}")?;
        }
        Ok(())
    }
}

/// Partial attribute set carried by one task event. `None` means "not
/// supplied", so the column is left alone on update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskUpdate {
    pub name: Option<String>,
    pub args: Option<String>,
    pub kwargs: Option<String>,
    pub eta: Option<Timestamp>,
    pub expires: Option<Timestamp>,
    pub result: Option<String>,
    pub traceback: Option<String>,
    pub runtime: Option<f64>,
    pub retries: Option<i64>,
    pub worker: Option<Hostname>,
    /// Always present: every event carries a timestamp.
    pub received_at: Timestamp,
}

impl TaskUpdate {
    pub fn new(received_at: Timestamp) -> Self {
        Self {
            name: None,
            args: None,
            kwargs: None,
            eta: None,
            expires: None,
            result: None,
            traceback: None,
            runtime: None,
            retries: None,
            worker: None,
            received_at,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_eta(mut self, eta: Timestamp) -> Self {
        self.eta = Some(eta);
        self
    }

    pub fn with_result(mut self, result: impl Into<String>) -> Self {
        self.result = Some(result.into());
        self
    }

    pub fn with_worker(mut self, worker: Hostname) -> Self {
        self.worker = Some(worker);
        self
    }

    /// Drop one origin field from the update.
    pub fn strip(&mut self, field: OriginField) {
        match field {
            OriginField::Name => self.name = None,
            OriginField::Args => self.args = None,
            OriginField::Kwargs => self.kwargs = None,
            OriginField::Eta => self.eta = None,
        }
    }
}

/// Field-level change to an existing record. `state` is `None` when the
/// stored state must be kept.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskPatch {
    pub state: Option<TaskState>,
    pub fields: TaskUpdate,
}

/// What a store should do with the row it holds locked.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskWrite {
    Insert(TaskRecord),
    Update(TaskPatch),
    Skip,
}

/// Stored view of one worker node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub hostname: Hostname,
    pub last_heartbeat: Option<Timestamp>,
    /// Set on every write.
    pub last_update: Timestamp,
}

impl fmt::Display for WorkerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.hostname, f)
    }
}
