//! In-memory cluster snapshot.
//!
//! The event aggregator folds every event into a [`ClusterState`]; at each
//! shutter the dispatcher reads the whole state and persists it. Folding
//! here applies the same precedence rule the reconciler does, so the
//! snapshot never shows a task further back than an event already seen.

use std::collections::BTreeMap;

use serde_json::Value;

use super::{Event, EventKind, Hostname, TaskId, TaskState};

/// Heartbeats kept per worker. Only the latest matters for liveness.
const HEARTBEAT_HISTORY: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerSnapshot {
    pub hostname: Hostname,
    /// Epoch seconds, ascending.
    pub heartbeats: Vec<f64>,
}

impl WorkerSnapshot {
    pub fn new(hostname: Hostname) -> Self {
        Self {
            hostname,
            heartbeats: Vec::new(),
        }
    }

    pub fn last_heartbeat(&self) -> Option<f64> {
        self.heartbeats.last().copied()
    }

    fn record_heartbeat(&mut self, timestamp: f64) {
        if !timestamp.is_finite() {
            return;
        }
        let at = self.heartbeats.partition_point(|t| *t <= timestamp);
        self.heartbeats.insert(at, timestamp);
        if self.heartbeats.len() > HEARTBEAT_HISTORY {
            let excess = self.heartbeats.len() - HEARTBEAT_HISTORY;
            self.heartbeats.drain(..excess);
        }
    }
}

/// Everything known about one task, merged across its events.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSnapshot {
    pub task_id: TaskId,
    pub state: TaskState,
    pub name: Option<String>,
    pub args: Option<String>,
    pub kwargs: Option<String>,
    /// Raw ETA as delivered (epoch or ISO text); normalized on dispatch.
    pub eta: Option<Value>,
    pub expires: Option<Value>,
    pub result: Option<String>,
    pub exception: Option<String>,
    pub traceback: Option<String>,
    pub runtime: Option<f64>,
    pub retries: Option<i64>,
    pub worker: Option<Hostname>,
    /// Epoch seconds of the last applied event.
    pub timestamp: f64,
}

impl TaskSnapshot {
    fn new(task_id: TaskId, state: TaskState, timestamp: f64) -> Self {
        Self {
            task_id,
            state,
            name: None,
            args: None,
            kwargs: None,
            eta: None,
            expires: None,
            result: None,
            exception: None,
            traceback: None,
            runtime: None,
            retries: None,
            worker: None,
            timestamp,
        }
    }

    /// Merge one event. A stale event only fills origin fields still missing.
    fn apply(&mut self, state: TaskState, event: &Event) {
        let text = |key: &str| event.field(key).map(opaque_text);

        if state.is_stale_against(&self.state) {
            self.name = self.name.take().or_else(|| text("name"));
            self.args = self.args.take().or_else(|| text("args"));
            self.kwargs = self.kwargs.take().or_else(|| text("kwargs"));
            self.eta = self.eta.take().or_else(|| event.field("eta").cloned());
            return;
        }

        self.state = state;
        self.timestamp = event.timestamp;
        if let Some(v) = text("name") {
            self.name = Some(v);
        }
        if let Some(v) = text("args") {
            self.args = Some(v);
        }
        if let Some(v) = text("kwargs") {
            self.kwargs = Some(v);
        }
        if let Some(v) = event.field("eta") {
            self.eta = Some(v.clone());
        }
        if let Some(v) = event.field("expires") {
            self.expires = Some(v.clone());
        }
        if let Some(v) = text("result") {
            self.result = Some(v);
        }
        if let Some(v) = text("exception") {
            self.exception = Some(v);
        }
        if let Some(v) = text("traceback") {
            self.traceback = Some(v);
        }
        if let Some(v) = event.field("runtime").and_then(Value::as_f64) {
            self.runtime = Some(v);
        }
        if let Some(v) = event.field("retries").and_then(Value::as_i64) {
            self.retries = Some(v);
        }
        if let Some(host) = event.hostname.as_ref().filter(|h| !h.is_blank()) {
            self.worker = Some(host.clone());
        }
    }

    /// The stored result: the return value, or the exception on failure.
    pub fn result_or_exception(&self) -> Option<&str> {
        self.result.as_deref().or(self.exception.as_deref())
    }
}

/// Point-in-time view of all known workers and tasks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterState {
    pub workers: BTreeMap<Hostname, WorkerSnapshot>,
    pub tasks: BTreeMap<TaskId, TaskSnapshot>,
}

impl ClusterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into the state.
    pub fn apply(&mut self, event: &Event) {
        if event.kind.is_worker_event() {
            self.apply_worker_event(event);
            return;
        }

        let Some(task_id) = event.task_id.clone().filter(|id| !id.is_blank()) else {
            tracing::debug!(kind = %event.kind, "dropping task event without task id");
            return;
        };
        let state = task_state_for(&event.kind);

        // A task event is also a sign of life from the worker that sent it.
        if let Some(host) = event.hostname.as_ref().filter(|h| !h.is_blank()) {
            self.workers
                .entry(host.clone())
                .or_insert_with(|| WorkerSnapshot::new(host.clone()))
                .record_heartbeat(event.timestamp);
        }

        match self.tasks.get_mut(&task_id) {
            Some(task) => task.apply(state, event),
            None => {
                let mut task = TaskSnapshot::new(task_id.clone(), state.clone(), event.timestamp);
                task.apply(state, event);
                self.tasks.insert(task_id, task);
            }
        }
    }

    /// Drop finished tasks after a shutter; in-flight tasks stay so their
    /// later events still merge with what is already known.
    pub fn clear_ready(&mut self) {
        self.tasks.retain(|_, task| !task.state.is_terminal());
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty() && self.tasks.is_empty()
    }

    fn apply_worker_event(&mut self, event: &Event) {
        let Some(host) = event.hostname.clone().filter(|h| !h.is_blank()) else {
            tracing::debug!(kind = %event.kind, "dropping worker event without hostname");
            return;
        };
        let worker = self
            .workers
            .entry(host.clone())
            .or_insert_with(|| WorkerSnapshot::new(host));
        match event.kind {
            EventKind::WorkerOffline => worker.heartbeats.clear(),
            _ => worker.record_heartbeat(event.timestamp),
        }
    }
}

impl FromIterator<Event> for ClusterState {
    fn from_iter<I: IntoIterator<Item = Event>>(iter: I) -> Self {
        let mut state = ClusterState::new();
        for event in iter {
            state.apply(&event);
        }
        state
    }
}

fn task_state_for(kind: &EventKind) -> TaskState {
    kind.task_state().unwrap_or_else(|| {
        let name = kind.as_str();
        let bare = name.strip_prefix("task-").unwrap_or(name);
        TaskState::Other(bare.to_ascii_uppercase())
    })
}

/// Opaque payloads are stored as text; strings are kept as-is.
fn opaque_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
