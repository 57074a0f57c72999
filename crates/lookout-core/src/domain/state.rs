//! Task lifecycle states and their precedence.
//!
//! Events are delivered out of order, so the stored state is never chosen by
//! arrival time. Each state has a precedence rank describing how far along
//! the task is:
//!
//! | state    | rank |
//! |----------|------|
//! | received | 0    |
//! | started  | 1    |
//! | retry    | 2    |
//! | success  | 3    |
//! | failure  | 3    |
//! | revoked  | 3    |
//!
//! State names outside this table are kept verbatim as [`TaskState::Other`]
//! and rank below every known state.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Precedence rank. `Rank::UNRANKED` sorts below every known state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rank(Option<u8>);

impl Rank {
    pub const UNRANKED: Rank = Rank(None);

    pub const fn known(value: u8) -> Self {
        Rank(Some(value))
    }

    pub fn value(self) -> Option<u8> {
        self.0
    }
}

/// Fields that only the first `received` event is authoritative for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OriginField {
    Name,
    Args,
    Kwargs,
    Eta,
}

impl OriginField {
    pub const ALL: [OriginField; 4] = [
        OriginField::Name,
        OriginField::Args,
        OriginField::Kwargs,
        OriginField::Eta,
    ];
}

/// Task lifecycle state.
///
/// State transitions (as seen by the cluster, not by us):
/// - Received -> Started -> Success
/// - Received -> Started -> Retry -> Started -> ... -> Success | Failure
/// - any -> Revoked
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskState {
    Received,
    Started,
    Retry,
    Success,
    Failure,
    Revoked,
    /// A state name we have no rank for (PENDING, REJECTED, custom states...).
    Other(String),
}

impl TaskState {
    pub const KNOWN: [TaskState; 6] = [
        TaskState::Received,
        TaskState::Started,
        TaskState::Retry,
        TaskState::Success,
        TaskState::Failure,
        TaskState::Revoked,
    ];

    /// Parse a state name. Accepts both `SUCCESS` and `success`; anything
    /// else is preserved as `Other`.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "RECEIVED" => TaskState::Received,
            "STARTED" => TaskState::Started,
            "RETRY" => TaskState::Retry,
            "SUCCESS" => TaskState::Success,
            "FAILURE" => TaskState::Failure,
            "REVOKED" => TaskState::Revoked,
            _ => TaskState::Other(name.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TaskState::Received => "RECEIVED",
            TaskState::Started => "STARTED",
            TaskState::Retry => "RETRY",
            TaskState::Success => "SUCCESS",
            TaskState::Failure => "FAILURE",
            TaskState::Revoked => "REVOKED",
            TaskState::Other(name) => name,
        }
    }

    pub fn rank(&self) -> Rank {
        match self {
            TaskState::Received => Rank::known(0),
            TaskState::Started => Rank::known(1),
            TaskState::Retry => Rank::known(2),
            TaskState::Success | TaskState::Failure | TaskState::Revoked => Rank::known(3),
            TaskState::Other(_) => Rank::UNRANKED,
        }
    }

    /// Origin fields dropped from an update carrying this state when the
    /// stored record is already further along.
    pub fn protected_if_stale(&self) -> &'static [OriginField] {
        &OriginField::ALL
    }

    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Success | TaskState::Failure | TaskState::Revoked
        )
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, TaskState::Other(_))
    }

    /// True when an event in `self` arrives after the record reached `stored`.
    pub fn is_stale_against(&self, stored: &TaskState) -> bool {
        self.rank() < stored.rank()
    }

    pub fn retention_group(&self) -> StateGroup {
        match self {
            TaskState::Success => StateGroup::Succeeded,
            TaskState::Failure | TaskState::Revoked => StateGroup::Failed,
            _ => StateGroup::Pending,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for TaskState {
    fn from(value: &str) -> Self {
        TaskState::parse(value)
    }
}

impl Serialize for TaskState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TaskState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(|s| TaskState::parse(&s))
    }
}

/// Disjoint state groups, each with its own retention duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateGroup {
    /// {success}
    Succeeded,
    /// {failure, revoked}
    Failed,
    /// Every non-terminal state, unknown names included.
    Pending,
}

impl StateGroup {
    pub const ALL: [StateGroup; 3] = [StateGroup::Succeeded, StateGroup::Failed, StateGroup::Pending];

    pub fn contains(self, state: &TaskState) -> bool {
        state.retention_group() == self
    }

    /// The terminal states listed in this group. `Pending` is defined by
    /// exclusion, so stores query it as "not terminal".
    pub fn terminal_members(self) -> &'static [TaskState] {
        const SUCCEEDED: &[TaskState] = &[TaskState::Success];
        const FAILED: &[TaskState] = &[TaskState::Failure, TaskState::Revoked];
        match self {
            StateGroup::Succeeded => SUCCEEDED,
            StateGroup::Failed => FAILED,
            StateGroup::Pending => &[],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StateGroup::Succeeded => "success",
            StateGroup::Failed => "failure",
            StateGroup::Pending => "pending",
        }
    }
}
