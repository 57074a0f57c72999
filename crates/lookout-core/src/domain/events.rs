//! Events - クラスタから届くイベント
//!
//! One event describes one lifecycle transition or heartbeat. Only the
//! fields relevant to that transition are present; everything else must be
//! taken from earlier events for the same task.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use super::{Hostname, TaskId, TaskState};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    Received,
    Started,
    Retry,
    Success,
    Failure,
    Revoked,
    Heartbeat,
    WorkerOnline,
    WorkerOffline,
    /// Event types the monitor does not know (task-sent, task-rejected, ...).
    Other(String),
}

impl EventKind {
    /// Accepts bare names (`received`) as well as wire names
    /// (`task-received`, `task-succeeded`, `worker-heartbeat`).
    pub fn parse(name: &str) -> Self {
        let lowered = name.trim().to_ascii_lowercase();
        let bare = lowered
            .strip_prefix("task-")
            .or_else(|| lowered.strip_prefix("worker-").filter(|s| *s == "heartbeat"))
            .unwrap_or(&lowered);
        match bare {
            "received" => EventKind::Received,
            "started" => EventKind::Started,
            "retry" | "retried" => EventKind::Retry,
            "success" | "succeeded" => EventKind::Success,
            "failure" | "failed" => EventKind::Failure,
            "revoked" => EventKind::Revoked,
            "heartbeat" => EventKind::Heartbeat,
            "worker-online" | "online" => EventKind::WorkerOnline,
            "worker-offline" | "offline" => EventKind::WorkerOffline,
            _ => EventKind::Other(name.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Received => "received",
            EventKind::Started => "started",
            EventKind::Retry => "retry",
            EventKind::Success => "success",
            EventKind::Failure => "failure",
            EventKind::Revoked => "revoked",
            EventKind::Heartbeat => "heartbeat",
            EventKind::WorkerOnline => "worker-online",
            EventKind::WorkerOffline => "worker-offline",
            EventKind::Other(name) => name,
        }
    }

    /// The lifecycle state a task event moves the task into.
    pub fn task_state(&self) -> Option<TaskState> {
        match self {
            EventKind::Received => Some(TaskState::Received),
            EventKind::Started => Some(TaskState::Started),
            EventKind::Retry => Some(TaskState::Retry),
            EventKind::Success => Some(TaskState::Success),
            EventKind::Failure => Some(TaskState::Failure),
            EventKind::Revoked => Some(TaskState::Revoked),
            _ => None,
        }
    }

    pub fn is_worker_event(&self) -> bool {
        matches!(
            self,
            EventKind::Heartbeat | EventKind::WorkerOnline | EventKind::WorkerOffline
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(|s| EventKind::parse(&s))
    }
}

/// One notification from the cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type", alias = "kind")]
    pub kind: EventKind,
    #[serde(default, alias = "uuid", skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<Hostname>,
    /// Unix epoch seconds.
    pub timestamp: f64,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Event {
    pub fn task(kind: EventKind, task_id: impl Into<TaskId>, timestamp: f64) -> Self {
        Self {
            kind,
            task_id: Some(task_id.into()),
            hostname: None,
            timestamp,
            fields: Map::new(),
        }
    }

    pub fn worker(kind: EventKind, hostname: impl Into<Hostname>, timestamp: f64) -> Self {
        Self {
            kind,
            task_id: None,
            hostname: Some(hostname.into()),
            timestamp,
            fields: Map::new(),
        }
    }

    pub fn with_hostname(mut self, hostname: impl Into<Hostname>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key).filter(|v| !v.is_null())
    }
}
