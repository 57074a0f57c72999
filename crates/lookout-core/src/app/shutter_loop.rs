//! ShutterLoop - periodic snapshot persistence
//!
//! Every `period` the loop captures the cluster state from a
//! [`SnapshotSource`] and hands it to the dispatcher. Store calls are
//! blocking, so each pass runs on the blocking pool.
//!
//! # 停止
//! - `request_shutdown()` stops the timer; one last shutter flushes what the
//!   source collected since the previous tick.
//! - The loop also ends on its own when the source is closed.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{info, warn};

use crate::ports::{MonitorStore, SnapshotSource};

use super::dispatcher::{SnapshotDispatcher, SnapshotReport};

/// Totals over the life of one loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutterSummary {
    pub shutters: usize,
    pub tasks_written: usize,
    pub tasks_skipped: usize,
    pub tasks_failed: usize,
    pub expired: usize,
}

impl ShutterSummary {
    fn add(&mut self, report: &SnapshotReport) {
        self.shutters += 1;
        self.tasks_written += report.tasks_written;
        self.tasks_skipped += report.tasks_skipped;
        self.tasks_failed += report.tasks_failed;
        self.expired += report.expired;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShutterOptions {
    pub period: Duration,
    /// Forget finished tasks in the source after each shutter.
    pub clear_after: bool,
}

impl Default for ShutterOptions {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(1),
            clear_after: false,
        }
    }
}

/// Shutter loop handle.
/// - `shutdown_tx` を drop してもループは止まる
/// - `shutdown_and_join()` で最後の shutter まで待てる
pub struct ShutterLoop {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<ShutterSummary>,
}

impl ShutterLoop {
    pub fn spawn<S>(
        source: Arc<dyn SnapshotSource>,
        dispatcher: Arc<SnapshotDispatcher<S>>,
        options: ShutterOptions,
    ) -> Self
    where
        S: MonitorStore + ?Sized + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(shutter_loop(source, dispatcher, options, shutdown_rx));
        Self { shutdown_tx, join }
    }

    pub fn request_shutdown(&self) {
        // receiver may already be gone if the source closed
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) -> ShutterSummary {
        self.request_shutdown();
        match self.join.await {
            Ok(summary) => summary,
            Err(err) => {
                warn!(error = %err, "shutter loop task failed");
                ShutterSummary::default()
            }
        }
    }
}

async fn shutter_loop<S>(
    source: Arc<dyn SnapshotSource>,
    dispatcher: Arc<SnapshotDispatcher<S>>,
    options: ShutterOptions,
    mut shutdown_rx: watch::Receiver<bool>,
) -> ShutterSummary
where
    S: MonitorStore + ?Sized + 'static,
{
    info!(period = ?options.period, clear_after = options.clear_after, "shutter loop started");
    let mut summary = ShutterSummary::default();
    let mut ticker = time::interval(options.period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let stopping = tokio::select! {
            changed = shutdown_rx.changed() => changed.is_err() || *shutdown_rx.borrow(),
            _ = ticker.tick() => false,
        };
        if !shutter(&source, &dispatcher, options.clear_after, &mut summary).await || stopping {
            break;
        }
    }

    info!(shutters = summary.shutters, tasks_written = summary.tasks_written, "shutter loop stopped");
    summary
}

/// One capture-and-dispatch pass. Returns false once the source is closed.
async fn shutter<S>(
    source: &Arc<dyn SnapshotSource>,
    dispatcher: &Arc<SnapshotDispatcher<S>>,
    clear_after: bool,
    summary: &mut ShutterSummary,
) -> bool
where
    S: MonitorStore + ?Sized + 'static,
{
    let Some(state) = source.capture().await else {
        return false;
    };
    let dispatcher = Arc::clone(dispatcher);
    match tokio::task::spawn_blocking(move || dispatcher.on_snapshot(&state)).await {
        Ok(report) => summary.add(&report),
        Err(err) => warn!(error = %err, "snapshot dispatch panicked"),
    }
    if clear_after {
        source.clear().await;
    }
    true
}
