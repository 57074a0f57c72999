//! Domain model (ids, states, records, events, timestamps, errors).

pub mod errors;
pub mod events;
pub mod ids;
pub mod record;
pub mod snapshot;
pub mod state;
pub mod timestamp;

pub use self::errors::{ErrorKind, MonitorError, StoreError};
pub use self::events::{Event, EventKind};
pub use self::ids::{Hostname, Key, KeyMarker, TaskId};
pub use self::record::{TaskPatch, TaskRecord, TaskUpdate, TaskWrite, WorkerRecord};
pub use self::snapshot::{ClusterState, TaskSnapshot, WorkerSnapshot};
pub use self::state::{OriginField, Rank, StateGroup, TaskState};
pub use self::timestamp::{Normalizer, RawTimestamp, Timestamp, TimestampError};
