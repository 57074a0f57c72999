//! State reconciler: folds one task event into the stored record.
//!
//! Events can arrive duplicated and out of order. The merge rules keep the
//! stored record consistent regardless:
//!
//! - a task is created only when the event names it;
//! - an event whose state ranks below the stored one is stale, so it may
//!   not overwrite the origin fields (name, args, kwargs, eta);
//! - the stored state never moves to a lower rank.

use std::sync::Arc;

use tracing::warn;

use crate::domain::{MonitorError, TaskId, TaskPatch, TaskRecord, TaskState, TaskUpdate, TaskWrite};
use crate::ports::TaskStore;

/// Decide what to do with the locked row.
///
/// Pure function of the current row and the incoming event; the store
/// applies the result under its per-row exclusive scope.
pub fn merge(
    task_id: &TaskId,
    existing: Option<&TaskRecord>,
    state: &TaskState,
    update: &TaskUpdate,
) -> TaskWrite {
    let Some(existing) = existing else {
        return match TaskRecord::create(task_id.clone(), state.clone(), update) {
            Some(record) => TaskWrite::Insert(record),
            None => TaskWrite::Skip,
        };
    };

    let stale = state.is_stale_against(&existing.state);
    let mut fields = update.clone();
    if stale {
        for field in state.protected_if_stale() {
            fields.strip(*field);
        }
    }
    TaskWrite::Update(TaskPatch {
        state: (!stale).then(|| state.clone()),
        fields,
    })
}

/// Applies task events to a [`TaskStore`].
pub struct Reconciler<S: ?Sized> {
    store: Arc<S>,
}

impl<S: TaskStore + ?Sized> Reconciler<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Fold one event into the record for `task_id`.
    ///
    /// Returns `Ok(None)` when the task was never seen and the event does
    /// not name it. Never deletes.
    pub fn reconcile(
        &self,
        task_id: &TaskId,
        state: &TaskState,
        update: &TaskUpdate,
    ) -> Result<Option<TaskRecord>, MonitorError> {
        if task_id.is_blank() {
            return Err(MonitorError::InvalidField {
                field: "task_id",
                message: "must not be empty".to_string(),
            });
        }
        if !state.is_known() {
            warn!(task_id = %task_id, state = %state, "unknown task state, ranked lowest");
        }
        let stored = self
            .store
            .write_task(task_id, &mut |current| merge(task_id, current, state, update))?;
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Timestamp;
    use crate::impls::InMemoryStore;
    use chrono::{TimeZone, Utc};
    use rstest::rstest;

    fn at(m: u32) -> Timestamp {
        Timestamp::Aware(Utc.with_ymd_and_hms(2016, 6, 1, 12, m, 0).unwrap())
    }

    fn reconciler() -> Reconciler<InMemoryStore> {
        Reconciler::new(Arc::new(InMemoryStore::new()))
    }

    fn named(m: u32, name: &str) -> TaskUpdate {
        let mut update = TaskUpdate::new(at(m)).with_name(name).with_eta(at(30));
        update.args = Some("(1,)".into());
        update.kwargs = Some("{}".into());
        update
    }

    #[test]
    fn unseen_task_without_name_is_skipped() {
        let r = reconciler();
        let out = r
            .reconcile(&"t1".into(), &TaskState::Started, &TaskUpdate::new(at(1)))
            .unwrap();
        assert!(out.is_none());
        assert!(r.store().get_task(&"t1".into()).unwrap().is_none());
    }

    #[test]
    fn empty_name_counts_as_absent() {
        let r = reconciler();
        let out = r
            .reconcile(&"t1".into(), &TaskState::Received, &TaskUpdate::new(at(1)).with_name(""))
            .unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn started_then_late_received_keeps_started() {
        let r = reconciler();
        let id = TaskId::new("t1");
        r.reconcile(&id, &TaskState::Started, &named(2, "tasks.add")).unwrap();

        let late = r
            .reconcile(&id, &TaskState::Received, &named(1, "tasks.other"))
            .unwrap()
            .unwrap();

        assert_eq!(late.state, TaskState::Started);
        assert_eq!(late.name.as_deref(), Some("tasks.add"));
        assert_eq!(late.received_at, at(1));
    }

    #[test]
    fn stale_event_still_applies_non_origin_fields() {
        let r = reconciler();
        let id = TaskId::new("t1");
        r.reconcile(&id, &TaskState::Success, &named(2, "tasks.add")).unwrap();

        let mut retry = TaskUpdate::new(at(3)).with_name("renamed");
        retry.retries = Some(2);
        retry.traceback = Some("boom".into());
        let stored = r.reconcile(&id, &TaskState::Retry, &retry).unwrap().unwrap();

        assert_eq!(stored.state, TaskState::Success);
        assert_eq!(stored.name.as_deref(), Some("tasks.add"));
        assert_eq!(stored.retries, 2);
        assert_eq!(stored.traceback.as_deref(), Some("boom"));
    }

    #[test]
    fn unknown_state_is_stale_against_everything_ranked() {
        let r = reconciler();
        let id = TaskId::new("t1");
        r.reconcile(&id, &TaskState::Received, &named(1, "tasks.add")).unwrap();
        let stored = r
            .reconcile(&id, &TaskState::Other("PENDING".into()), &named(2, "x"))
            .unwrap()
            .unwrap();
        assert_eq!(stored.state, TaskState::Received);
        assert_eq!(stored.name.as_deref(), Some("tasks.add"));
    }

    #[test]
    fn unknown_state_can_create_a_named_task() {
        let r = reconciler();
        let stored = r
            .reconcile(&"t1".into(), &TaskState::Other("PENDING".into()), &named(1, "tasks.add"))
            .unwrap()
            .unwrap();
        assert_eq!(stored.state.as_str(), "PENDING");
        // any ranked state then moves it forward
        let next = r
            .reconcile(&"t1".into(), &TaskState::Received, &TaskUpdate::new(at(2)))
            .unwrap()
            .unwrap();
        assert_eq!(next.state, TaskState::Received);
    }

    #[test]
    fn blank_task_id_is_rejected() {
        let r = reconciler();
        let err = r
            .reconcile(&"  ".into(), &TaskState::Received, &named(1, "a"))
            .unwrap_err();
        assert!(matches!(err, MonitorError::InvalidField { field: "task_id", .. }));
    }

    #[rstest]
    #[case(TaskState::Received, TaskState::Started, true)]
    #[case(TaskState::Started, TaskState::Received, false)]
    #[case(TaskState::Retry, TaskState::Started, false)]
    #[case(TaskState::Success, TaskState::Failure, true)]
    #[case(TaskState::Failure, TaskState::Revoked, true)]
    #[case(TaskState::Success, TaskState::Retry, false)]
    fn merge_moves_state_only_forward(
        #[case] stored: TaskState,
        #[case] incoming: TaskState,
        #[case] moves: bool,
    ) {
        let id = TaskId::new("t1");
        let existing = TaskRecord::create(id.clone(), stored, &named(1, "a")).unwrap();
        let TaskWrite::Update(patch) = merge(&id, Some(&existing), &incoming, &named(2, "b")) else {
            panic!("existing rows are always updated");
        };
        assert_eq!(patch.state.is_some(), moves);
        assert_eq!(patch.fields.name.is_some(), moves);
        assert_eq!(patch.fields.eta.is_some(), moves);
    }
}
