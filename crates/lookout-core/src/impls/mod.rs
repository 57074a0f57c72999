//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **InMemoryStore**: テスト用・DB なしで動かすための store
//! - **SqliteStore**: 永続 store（bundled SQLite）
//! - **EventCollector**: プロセス内の SnapshotSource

pub mod collector;
pub mod memory;
pub mod sqlite;

// 主要な型を再エクスポート
pub use self::collector::EventCollector;
pub use self::memory::InMemoryStore;
pub use self::sqlite::SqliteStore;
