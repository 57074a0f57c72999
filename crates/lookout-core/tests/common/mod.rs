#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use lookout_core::domain::{TaskId, TaskRecord, TaskState, TaskUpdate, Timestamp};
use lookout_core::impls::{InMemoryStore, SqliteStore};
use lookout_core::ports::{FixedClock, MonitorStore};
use lookout_core::{Monitor, MonitorBuilder, MonitorConfig};
use tempfile::TempDir;

pub enum Backend {
    Memory,
    Sqlite,
}

/// A monitor on a fixed clock. Keeps the temp dir alive for SQLite.
pub struct Harness {
    pub monitor: Monitor<dyn MonitorStore>,
    pub clock: Arc<FixedClock>,
    _dir: Option<TempDir>,
}

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2016, 6, 1, 12, 0, 0).unwrap()
}

pub fn at_secs(secs: i64) -> Timestamp {
    Timestamp::Aware(start() + chrono::TimeDelta::seconds(secs))
}

pub fn harness(backend: Backend, config: MonitorConfig) -> Harness {
    let (store, dir): (Arc<dyn MonitorStore>, Option<TempDir>) = match backend {
        Backend::Memory => (Arc::new(InMemoryStore::new()), None),
        Backend::Sqlite => {
            let dir = tempfile::tempdir().unwrap();
            let store = SqliteStore::open(dir.path().join("monitor.db"), config.use_aware_timestamps).unwrap();
            (Arc::new(store), Some(dir))
        }
    };
    let clock = Arc::new(FixedClock::new(start()));
    let monitor = MonitorBuilder::<dyn MonitorStore>::new(config)
        .store(store)
        .clock(clock.clone())
        .build()
        .unwrap();
    Harness {
        monitor,
        clock,
        _dir: dir,
    }
}

/// A monitor on its own connection to the SQLite file at `path`.
pub fn sqlite_monitor(
    path: &Path,
    clock: Arc<FixedClock>,
    busy_timeout: Duration,
) -> Monitor<dyn MonitorStore> {
    let store: Arc<dyn MonitorStore> = Arc::new(SqliteStore::with_busy_timeout(path, true, busy_timeout).unwrap());
    MonitorBuilder::<dyn MonitorStore>::new(MonitorConfig::default())
        .store(store)
        .clock(clock)
        .build()
        .unwrap()
}

impl Harness {
    pub fn apply(&self, id: &str, state: TaskState, update: TaskUpdate) -> Option<TaskRecord> {
        self.monitor
            .reconcile(&TaskId::new(id), &state, &update)
            .unwrap()
    }

    pub fn task(&self, id: &str) -> Option<TaskRecord> {
        self.monitor.store().get_task(&TaskId::new(id)).unwrap()
    }
}
