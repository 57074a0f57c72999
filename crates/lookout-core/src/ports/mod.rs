//! Ports - 抽象化レイヤー
//!
//! Each trait is a seam to something outside the core: the relational store
//! (tasks, workers), the wall/monotonic clock, and the event aggregator that
//! hands out snapshots.
//!
//! # 設計原則
//! - The store is the source of truth; in-memory caches may only lag it.
//! - Core calls are synchronous; only the snapshot source is async.

pub mod clock;
pub mod snapshot_source;
pub mod task_store;
pub mod worker_store;

// 主要な trait を再エクスポート
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::snapshot_source::SnapshotSource;
pub use self::task_store::{TaskFilter, TaskStore};
pub use self::worker_store::WorkerStore;

/// Both tables behind one handle, so a store can be chosen at runtime.
pub trait MonitorStore: TaskStore + WorkerStore {}

impl<T: TaskStore + WorkerStore + ?Sized> MonitorStore for T {}
