//! Domain identifiers (strongly-typed keys).
//!
//! Task ids and worker hostnames are both plain strings on the wire, so they
//! share one generic `Key<T>` whose marker type keeps them apart at compile
//! time. The marker is `PhantomData` and costs nothing at runtime.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::marker::PhantomData;

/// Marker trait for each key kind.
pub trait KeyMarker: Send + Sync + 'static {
    /// Human readable kind, used in error messages ("task_id", "hostname").
    fn kind() -> &'static str;
}

/// Generic string key.
///
/// # Example
/// ```ignore
/// let task: TaskId = Key::new("d9078da5-9915-40a0-bfa1-392c7bde42ed");
/// let host: Hostname = Key::new("worker1.example.com");
/// // task and host are different types and cannot be mixed up
/// ```
pub struct Key<T: KeyMarker> {
    value: String,
    _marker: PhantomData<T>,
}

impl<T: KeyMarker> Key<T> {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            _marker: PhantomData,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn into_string(self) -> String {
        self.value
    }

    /// Empty keys never identify a row; snapshot folding drops them.
    pub fn is_blank(&self) -> bool {
        self.value.trim().is_empty()
    }
}

// Manual impls: derive would put bounds on `T`, which is an uninhabited marker.
impl<T: KeyMarker> Clone for Key<T> {
    fn clone(&self) -> Self {
        Self::new(self.value.clone())
    }
}

impl<T: KeyMarker> PartialEq for Key<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T: KeyMarker> Eq for Key<T> {}

impl<T: KeyMarker> std::hash::Hash for Key<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<T: KeyMarker> PartialOrd for Key<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: KeyMarker> Ord for Key<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.value.cmp(&other.value)
    }
}

impl<T: KeyMarker> fmt::Debug for Key<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:?})", T::kind(), self.value)
    }
}

impl<T: KeyMarker> fmt::Display for Key<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value.fmt(f)
    }
}

impl<T: KeyMarker> From<&str> for Key<T> {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl<T: KeyMarker> From<String> for Key<T> {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl<T: KeyMarker> Serialize for Key<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.value)
    }
}

impl<'de, T: KeyMarker> Deserialize<'de> for Key<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

// ========================================
// Marker types
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Task {}

impl KeyMarker for Task {
    fn kind() -> &'static str {
        "task_id"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Worker {}

impl KeyMarker for Worker {
    fn kind() -> &'static str {
        "hostname"
    }
}

/// Globally unique task identifier (usually a UUID string).
pub type TaskId = Key<Task>;

/// Worker node hostname, unique per worker record.
pub type Hostname = Key<Worker>;
