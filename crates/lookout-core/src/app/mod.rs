//! App - アプリケーション層
//!
//! ports を組み合わせてモニターのロジックを実装します。
//!
//! # 主要コンポーネント
//! - **Reconciler**: task event を stored record に畳み込む
//! - **LivenessTracker**: heartbeat の書き込み間引きと生存判定
//! - **SnapshotDispatcher**: cluster snapshot の永続化
//! - **RetentionEngine**: 期限切れ record の hide → purge
//! - **ShutterLoop**: 定期 snapshot ループ
//! - **StatusView**: ステータスクエリ
//! - **MonitorBuilder**: 構築とワイヤリング

pub mod builder;
pub mod dispatcher;
pub mod liveness;
pub mod reconciler;
pub mod retention;
pub mod shutter_loop;
pub mod status;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, Monitor, MonitorBuilder};
pub use self::dispatcher::{SnapshotDispatcher, SnapshotReport};
pub use self::liveness::{LivenessPolicy, LivenessTracker};
pub use self::reconciler::{Reconciler, merge};
pub use self::retention::{RetentionEngine, RetentionPolicy};
pub use self::shutter_loop::{ShutterLoop, ShutterOptions, ShutterSummary};
pub use self::status::{StatusView, TaskCounts, WorkerStatus};
