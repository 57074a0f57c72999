mod common;

use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::{Backend, at_secs, harness, sqlite_monitor, start};
use lookout_core::domain::{
    ClusterState, ErrorKind, Event, EventKind, MonitorError, StateGroup, StoreError, TaskId, TaskState,
    TaskUpdate,
};
use lookout_core::ports::{FixedClock, MonitorStore, TaskFilter};
use lookout_core::{Monitor, MonitorConfig};
use rusqlite::Connection;

const SHORT_WAIT: Duration = Duration::from_millis(50);
const LONG_WAIT: Duration = Duration::from_secs(10);

/// Another process's write transaction. Released on drop.
struct WriteLock(Connection);

impl WriteLock {
    fn take(path: &Path) -> Self {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch("BEGIN IMMEDIATE").unwrap();
        Self(conn)
    }
}

fn named(secs: i64) -> TaskUpdate {
    TaskUpdate::new(at_secs(secs)).with_name("tasks.add")
}

/// Every writer replays the full lifecycle of one task in its own order.
fn race_on_one_task(monitors: &[&Monitor<dyn MonitorStore>]) {
    use TaskState::{Received, Retry, Started, Success};
    let orders = [
        [Received, Started, Retry, Success],
        [Success, Retry, Started, Received],
        [Started, Success, Received, Retry],
        [Retry, Received, Success, Started],
    ];
    thread::scope(|scope| {
        for (n, order) in orders.iter().enumerate() {
            let monitor = monitors[n % monitors.len()];
            scope.spawn(move || {
                for _ in 0..10 {
                    for (i, state) in order.iter().enumerate() {
                        monitor
                            .reconcile(&TaskId::new("shared"), state, &named(i as i64))
                            .unwrap();
                    }
                }
            });
        }
    });
}

#[test]
fn held_write_lock_surfaces_as_transient_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("monitor.db");
    let monitor = sqlite_monitor(&path, Arc::new(FixedClock::new(start())), SHORT_WAIT);
    let id = TaskId::new("t1");

    let lock = WriteLock::take(&path);
    let err = monitor.reconcile(&id, &TaskState::Received, &named(0)).unwrap_err();
    assert!(err.is_transient());
    assert!(matches!(err, MonitorError::Store(StoreError::Conflict(_))));
    assert!(monitor.store().get_task(&id).unwrap().is_none());

    drop(lock);
    let stored = monitor.reconcile(&id, &TaskState::Received, &named(0)).unwrap();
    assert_eq!(stored.unwrap().state, TaskState::Received);
}

#[test]
fn dispatcher_waits_out_a_briefly_held_lock() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("monitor.db");
    let monitor = sqlite_monitor(&path, Arc::new(FixedClock::new(start())), SHORT_WAIT);
    let t0 = start().timestamp() as f64;
    let state: ClusterState = vec![
        Event::task(EventKind::Received, "t1", t0)
            .with_hostname("w1")
            .with_field("name", "tasks.add"),
    ]
    .into_iter()
    .collect();

    let lock = WriteLock::take(&path);
    let report = thread::scope(|scope| {
        scope.spawn(move || {
            thread::sleep(Duration::from_millis(120));
            drop(lock);
        });
        monitor.on_snapshot(&state)
    });

    assert_eq!(report.workers, 1);
    assert_eq!(report.tasks_written, 1);
    assert_eq!(report.tasks_failed, 0);
    assert!(monitor.store().get_task(&TaskId::new("t1")).unwrap().is_some());
}

#[test]
fn writers_on_separate_connections_serialize() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("monitor.db");
    let clock = Arc::new(FixedClock::new(start()));
    let monitors: Vec<_> = (0..4)
        .map(|_| sqlite_monitor(&path, clock.clone(), LONG_WAIT))
        .collect();
    let refs: Vec<&Monitor<dyn MonitorStore>> = monitors.iter().collect();

    race_on_one_task(&refs);

    let store = monitors[0].store();
    let task = store.get_task(&TaskId::new("shared")).unwrap().unwrap();
    assert_eq!(task.state, TaskState::Success);
    assert_eq!(task.name.as_deref(), Some("tasks.add"));
    assert_eq!(store.find_tasks(&TaskFilter::default()).unwrap().len(), 1);
}

#[test]
fn writers_sharing_the_memory_store_serialize() {
    let h = harness(Backend::Memory, MonitorConfig::default());

    race_on_one_task(&[&h.monitor]);

    let task = h.task("shared").unwrap();
    assert_eq!(task.state, TaskState::Success);
    assert_eq!(task.name.as_deref(), Some("tasks.add"));
}

#[test]
fn failed_purge_leaves_hidden_rows_for_the_next_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("monitor.db");
    let monitor = sqlite_monitor(&path, Arc::new(FixedClock::new(start())), SHORT_WAIT);
    let store = monitor.store();
    for id in ["a", "b"] {
        monitor.reconcile(&TaskId::new(id), &TaskState::Success, &named(0)).unwrap();
    }
    assert_eq!(store.hide_expired(StateGroup::Succeeded, at_secs(10)).unwrap(), 2);

    let lock = WriteLock::take(&path);
    let err = store.purge_hidden().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transient);
    drop(lock);

    let hidden = TaskFilter {
        hidden: Some(true),
        ..TaskFilter::default()
    };
    assert_eq!(store.find_tasks(&hidden).unwrap().len(), 2);
    assert_eq!(store.purge_hidden().unwrap(), 2);
    assert!(store.find_tasks(&TaskFilter::default()).unwrap().is_empty());
}
