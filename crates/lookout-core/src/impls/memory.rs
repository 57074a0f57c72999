//! In-memory store implementation.
//!
//! One mutex guards both tables, so every row write is serialized; that is
//! at least as strong as the per-row scope the ports require.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::domain::{
    Hostname, StateGroup, StoreError, TaskId, TaskRecord, TaskWrite, Timestamp, WorkerRecord,
};
use crate::ports::{TaskFilter, TaskStore, WorkerStore};

/// In-memory store state.
#[derive(Default)]
struct InMemoryState {
    /// All task records (single source of truth for tasks).
    tasks: HashMap<TaskId, TaskRecord>,

    /// All worker records.
    workers: HashMap<Hostname, WorkerRecord>,

    /// Row writes performed, for observing write amplification in tests.
    worker_writes: u64,

    /// Timestamp mode, pinned by the first stored timestamp.
    aware: Option<bool>,
}

impl InMemoryState {
    fn check_mode(&self, ts: &Timestamp) -> Result<(), StoreError> {
        match self.aware {
            Some(aware) if aware != ts.is_aware() => {
                Err(StoreError::InvalidInput("timestamp mode does not match the store"))
            }
            _ => Ok(()),
        }
    }

    fn pin_mode(&mut self, ts: &Timestamp) -> Result<(), StoreError> {
        self.check_mode(ts)?;
        self.aware = Some(ts.is_aware());
        Ok(())
    }
}

/// Store for tests and for running without a database.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<InMemoryState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of worker row writes since creation.
    pub fn worker_writes(&self) -> u64 {
        self.state.lock().worker_writes
    }

    /// Administrative worker removal. Tasks referencing it cascade.
    pub fn remove_worker(&self, hostname: &Hostname) -> bool {
        let mut state = self.state.lock();
        let removed = state.workers.remove(hostname).is_some();
        if removed {
            state
                .tasks
                .retain(|_, task| task.worker.as_ref() != Some(hostname));
        }
        removed
    }
}

impl TaskStore for InMemoryStore {
    fn write_task(
        &self,
        task_id: &TaskId,
        decide: &mut dyn FnMut(Option<&TaskRecord>) -> TaskWrite,
    ) -> Result<Option<TaskRecord>, StoreError> {
        let mut state = self.state.lock();
        match decide(state.tasks.get(task_id)) {
            TaskWrite::Skip => Ok(None),
            TaskWrite::Insert(record) => {
                if record.task_id != *task_id {
                    return Err(StoreError::InvalidInput("inserted task_id does not match the locked row"));
                }
                state.pin_mode(&record.received_at)?;
                state.tasks.insert(task_id.clone(), record.clone());
                Ok(Some(record))
            }
            TaskWrite::Update(patch) => {
                state.check_mode(&patch.fields.received_at)?;
                let Some(record) = state.tasks.get_mut(task_id) else {
                    return Err(StoreError::InvalidInput("update for a task that does not exist"));
                };
                record.apply(&patch);
                Ok(Some(record.clone()))
            }
        }
    }

    fn get_task(&self, task_id: &TaskId) -> Result<Option<TaskRecord>, StoreError> {
        Ok(self.state.lock().tasks.get(task_id).cloned())
    }

    fn find_tasks(&self, filter: &TaskFilter) -> Result<Vec<TaskRecord>, StoreError> {
        let state = self.state.lock();
        let mut found: Vec<TaskRecord> = state
            .tasks
            .values()
            .filter(|task| filter.matches(task))
            .cloned()
            .collect();
        found.sort_by(|a, b| {
            b.received_at
                .to_micros()
                .cmp(&a.received_at.to_micros())
                .then_with(|| a.task_id.cmp(&b.task_id))
        });
        if let Some(limit) = filter.limit {
            found.truncate(limit);
        }
        Ok(found)
    }

    fn hide_expired(&self, group: StateGroup, cutoff: Timestamp) -> Result<usize, StoreError> {
        let mut state = self.state.lock();
        state.check_mode(&cutoff)?;
        let mut hidden = 0;
        for task in state.tasks.values_mut() {
            if !task.hidden && group.contains(&task.state) && task.received_at <= cutoff {
                task.hidden = true;
                hidden += 1;
            }
        }
        Ok(hidden)
    }

    fn purge_hidden(&self) -> Result<usize, StoreError> {
        let mut state = self.state.lock();
        let before = state.tasks.len();
        state.tasks.retain(|_, task| !task.hidden);
        Ok(before - state.tasks.len())
    }
}

impl WorkerStore for InMemoryStore {
    fn upsert_worker(
        &self,
        hostname: &Hostname,
        last_heartbeat: Option<Timestamp>,
        now: Timestamp,
    ) -> Result<WorkerRecord, StoreError> {
        let mut state = self.state.lock();
        state.pin_mode(&now)?;
        if let Some(beat) = &last_heartbeat {
            state.check_mode(beat)?;
        }
        let record = WorkerRecord {
            hostname: hostname.clone(),
            last_heartbeat,
            last_update: now,
        };
        state.workers.insert(hostname.clone(), record.clone());
        state.worker_writes += 1;
        Ok(record)
    }

    fn get_worker(&self, hostname: &Hostname) -> Result<Option<WorkerRecord>, StoreError> {
        Ok(self.state.lock().workers.get(hostname).cloned())
    }

    fn list_workers(&self) -> Result<Vec<WorkerRecord>, StoreError> {
        let state = self.state.lock();
        let mut workers: Vec<WorkerRecord> = state.workers.values().cloned().collect();
        // newest heartbeat first, then never-seen workers by name
        workers.sort_by(|a, b| {
            let key = |w: &WorkerRecord| w.last_heartbeat.map(|t| t.to_micros());
            key(b)
                .cmp(&key(a))
                .then_with(|| a.hostname.cmp(&b.hostname))
        });
        Ok(workers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TaskPatch, TaskState, TaskUpdate};
    use chrono::{TimeZone, Utc};

    fn at(h: u32) -> Timestamp {
        Timestamp::Aware(Utc.with_ymd_and_hms(2016, 6, 1, h, 0, 0).unwrap())
    }

    fn at_naive(h: u32) -> chrono::NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2016, 6, 1).unwrap().and_hms_opt(h, 0, 0).unwrap()
    }

    fn insert(store: &InMemoryStore, id: &str, state: TaskState, h: u32) {
        let update = TaskUpdate::new(at(h)).with_name("tasks.add");
        let record = TaskRecord::create(id.into(), state, &update).unwrap();
        store
            .write_task(&id.into(), &mut |_| TaskWrite::Insert(record.clone()))
            .unwrap();
    }

    #[test]
    fn write_task_sees_current_row() {
        let store = InMemoryStore::new();
        insert(&store, "t1", TaskState::Received, 1);

        let mut seen = None;
        let stored = store
            .write_task(&"t1".into(), &mut |current| {
                seen = current.map(|r| r.state.clone());
                TaskWrite::Update(TaskPatch {
                    state: Some(TaskState::Started),
                    fields: TaskUpdate::new(at(2)),
                })
            })
            .unwrap()
            .unwrap();

        assert_eq!(seen, Some(TaskState::Received));
        assert_eq!(stored.state, TaskState::Started);
        assert_eq!(stored.name.as_deref(), Some("tasks.add"));
    }

    #[test]
    fn skip_writes_nothing() {
        let store = InMemoryStore::new();
        let out = store.write_task(&"t1".into(), &mut |_| TaskWrite::Skip).unwrap();
        assert!(out.is_none());
        assert!(store.get_task(&"t1".into()).unwrap().is_none());
    }

    #[test]
    fn update_of_missing_row_is_rejected() {
        let store = InMemoryStore::new();
        let err = store
            .write_task(&"t1".into(), &mut |_| {
                TaskWrite::Update(TaskPatch {
                    state: None,
                    fields: TaskUpdate::new(at(1)),
                })
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput(_)));
    }

    #[test]
    fn hide_then_purge() {
        let store = InMemoryStore::new();
        insert(&store, "old", TaskState::Success, 1);
        insert(&store, "new", TaskState::Success, 5);
        insert(&store, "failed", TaskState::Failure, 1);

        assert_eq!(store.hide_expired(StateGroup::Succeeded, at(2)).unwrap(), 1);
        // already hidden rows are not counted twice
        assert_eq!(store.hide_expired(StateGroup::Succeeded, at(2)).unwrap(), 0);
        assert_eq!(store.find_tasks(&TaskFilter::active()).unwrap().len(), 2);

        assert_eq!(store.purge_hidden().unwrap(), 1);
        assert!(store.get_task(&"old".into()).unwrap().is_none());
        assert!(store.get_task(&"failed".into()).unwrap().is_some());
    }

    #[test]
    fn find_tasks_orders_newest_first() {
        let store = InMemoryStore::new();
        insert(&store, "a", TaskState::Received, 1);
        insert(&store, "b", TaskState::Received, 3);
        insert(&store, "c", TaskState::Started, 2);

        let ids: Vec<String> = store
            .find_tasks(&TaskFilter::default())
            .unwrap()
            .into_iter()
            .map(|t| t.task_id.into_string())
            .collect();
        assert_eq!(ids, vec!["b", "c", "a"]);

        let started = store
            .find_tasks(&TaskFilter::default().with_state(TaskState::Started))
            .unwrap();
        assert_eq!(started.len(), 1);
    }

    #[test]
    fn removing_a_worker_cascades_to_its_tasks() {
        let store = InMemoryStore::new();
        store.upsert_worker(&"w1".into(), Some(at(1)), at(1)).unwrap();
        let update = TaskUpdate::new(at(1)).with_name("a").with_worker("w1".into());
        let record = TaskRecord::create("t1".into(), TaskState::Received, &update).unwrap();
        store
            .write_task(&"t1".into(), &mut |_| TaskWrite::Insert(record.clone()))
            .unwrap();

        assert!(store.remove_worker(&"w1".into()));
        assert!(store.get_task(&"t1".into()).unwrap().is_none());
    }

    #[test]
    fn workers_list_latest_heartbeat_first() {
        let store = InMemoryStore::new();
        store.upsert_worker(&"idle".into(), None, at(1)).unwrap();
        store.upsert_worker(&"old".into(), Some(at(1)), at(1)).unwrap();
        store.upsert_worker(&"fresh".into(), Some(at(4)), at(4)).unwrap();

        let names: Vec<String> = store
            .list_workers()
            .unwrap()
            .into_iter()
            .map(|w| w.hostname.into_string())
            .collect();
        assert_eq!(names, vec!["fresh", "old", "idle"]);
        assert_eq!(store.worker_writes(), 3);
    }

    #[test]
    fn mixed_timestamp_modes_are_rejected() {
        let store = InMemoryStore::new();
        insert(&store, "t1", TaskState::Success, 1);
        let naive = Timestamp::Naive(at_naive(2));

        let err = store.hide_expired(StateGroup::Succeeded, naive).unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput(_)));
        let err = store.upsert_worker(&"w1".into(), None, naive).unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput(_)));
        // nothing was hidden by the refused call
        assert_eq!(store.find_tasks(&TaskFilter::active()).unwrap().len(), 1);
    }
}
