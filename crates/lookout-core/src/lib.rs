//! lookout-core
//!
//! Persists the state of a distributed task queue from its event stream:
//! task records reconciled across duplicated and out-of-order events,
//! worker heartbeats with write coalescing, and retention of old records.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, state, record, events, snapshot, timestamp, errors）
//! - **ports**: 抽象化レイヤー（TaskStore, WorkerStore, Clock, SnapshotSource）
//! - **app**: アプリケーションロジック（reconciler, liveness, dispatcher, retention, shutter_loop, status, builder）
//! - **impls**: 実装（InMemoryStore, SqliteStore, EventCollector）
//! - **config**: MonitorConfig（TOML）

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;

pub use self::app::{Monitor, MonitorBuilder};
pub use self::config::MonitorConfig;
