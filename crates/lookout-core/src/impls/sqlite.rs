//! SQLite store implementation.
//!
//! Every row write runs in a `BEGIN IMMEDIATE` transaction, which takes the
//! database write lock before the row is read, so two writers on the same
//! task serialize instead of interleaving. A writer that cannot get the lock
//! within the busy timeout gets `StoreError::Conflict`.

use std::path::Path;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior, params, params_from_iter};

use crate::domain::{
    Hostname, StateGroup, StoreError, TaskId, TaskPatch, TaskRecord, TaskState, TaskWrite,
    Timestamp, WorkerRecord,
};
use crate::ports::{TaskFilter, TaskStore, WorkerStore};

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS meta (
      key TEXT PRIMARY KEY,
      value TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS workers (
      hostname TEXT PRIMARY KEY,
      last_heartbeat_us INTEGER,
      last_update_us INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS workers_by_last_heartbeat
      ON workers(last_heartbeat_us);

    -- Timestamps are microseconds on the store's timestamp axis (UTC when
    -- the store is aware, local wall time when naive).
    CREATE TABLE IF NOT EXISTS tasks (
      task_id TEXT PRIMARY KEY,
      state TEXT NOT NULL,
      name TEXT,
      args TEXT,
      kwargs TEXT,
      eta_us INTEGER,
      expires_us INTEGER,
      result TEXT,
      traceback TEXT,
      runtime REAL,
      retries INTEGER NOT NULL DEFAULT 0,
      worker TEXT REFERENCES workers(hostname) ON DELETE CASCADE,
      received_at_us INTEGER NOT NULL,
      hidden INTEGER NOT NULL DEFAULT 0
    );

    CREATE INDEX IF NOT EXISTS tasks_by_state ON tasks(state);
    CREATE INDEX IF NOT EXISTS tasks_by_name ON tasks(name);
    CREATE INDEX IF NOT EXISTS tasks_by_received_at ON tasks(received_at_us);
    CREATE INDEX IF NOT EXISTS tasks_by_hidden ON tasks(hidden);
    CREATE INDEX IF NOT EXISTS tasks_by_worker ON tasks(worker);
"#;

const TASK_COLUMNS: &str = "task_id, state, name, args, kwargs, eta_us, expires_us, result, \
                            traceback, runtime, retries, worker, received_at_us, hidden";

/// Raw row as stored; timestamps still in microseconds.
struct TaskRow {
    task_id: String,
    state: String,
    name: Option<String>,
    args: Option<String>,
    kwargs: Option<String>,
    eta_us: Option<i64>,
    expires_us: Option<i64>,
    result: Option<String>,
    traceback: Option<String>,
    runtime: Option<f64>,
    retries: i64,
    worker: Option<String>,
    received_at_us: i64,
    hidden: bool,
}

fn read_task_row(row: &rusqlite::Row<'_>) -> Result<TaskRow, rusqlite::Error> {
    Ok(TaskRow {
        task_id: row.get(0)?,
        state: row.get(1)?,
        name: row.get(2)?,
        args: row.get(3)?,
        kwargs: row.get(4)?,
        eta_us: row.get(5)?,
        expires_us: row.get(6)?,
        result: row.get(7)?,
        traceback: row.get(8)?,
        runtime: row.get(9)?,
        retries: row.get(10)?,
        worker: row.get(11)?,
        received_at_us: row.get(12)?,
        hidden: row.get(13)?,
    })
}

struct WorkerRow {
    hostname: String,
    last_heartbeat_us: Option<i64>,
    last_update_us: i64,
}

fn read_worker_row(row: &rusqlite::Row<'_>) -> Result<WorkerRow, rusqlite::Error> {
    Ok(WorkerRow {
        hostname: row.get(0)?,
        last_heartbeat_us: row.get(1)?,
        last_update_us: row.get(2)?,
    })
}

/// Durable store backed by one SQLite database file.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    aware: bool,
}

impl SqliteStore {
    /// Open (or create) the database at `path`. `aware` must match the mode
    /// the file was created with.
    pub fn open(path: impl AsRef<Path>, aware: bool) -> Result<Self, StoreError> {
        Self::with_busy_timeout(path, aware, DEFAULT_BUSY_TIMEOUT)
    }

    /// Like [`open`](Self::open), giving up on a held write lock after
    /// `timeout` with `StoreError::Conflict`.
    pub fn with_busy_timeout(path: impl AsRef<Path>, aware: bool, timeout: Duration) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        Self::from_connection(Connection::open(path)?, aware, timeout)
    }

    pub fn open_in_memory(aware: bool) -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?, aware, DEFAULT_BUSY_TIMEOUT)
    }

    fn from_connection(conn: Connection, aware: bool, busy_timeout: Duration) -> Result<Self, StoreError> {
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA_SQL)?;
        check_timestamp_mode(&conn, aware)?;
        Ok(Self {
            conn: Mutex::new(conn),
            aware,
        })
    }

    /// Administrative worker removal. Tasks referencing it cascade.
    pub fn remove_worker(&self, hostname: &Hostname) -> Result<bool, StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let removed = tx.execute("DELETE FROM workers WHERE hostname=?1", params![hostname.as_str()])?;
        tx.commit()?;
        Ok(removed > 0)
    }

    fn timestamp(&self, column: &'static str, micros: i64) -> Result<Timestamp, StoreError> {
        Timestamp::from_micros(self.aware, micros).ok_or_else(|| StoreError::Corrupt {
            column,
            message: format!("{micros} is out of range"),
        })
    }

    fn optional_timestamp(&self, column: &'static str, micros: Option<i64>) -> Result<Option<Timestamp>, StoreError> {
        micros.map(|us| self.timestamp(column, us)).transpose()
    }

    fn task_record(&self, row: TaskRow) -> Result<TaskRecord, StoreError> {
        Ok(TaskRecord {
            task_id: TaskId::new(row.task_id),
            state: TaskState::parse(&row.state),
            name: row.name,
            args: row.args,
            kwargs: row.kwargs,
            eta: self.optional_timestamp("eta_us", row.eta_us)?,
            expires: self.optional_timestamp("expires_us", row.expires_us)?,
            result: row.result,
            traceback: row.traceback,
            runtime: row.runtime,
            retries: row.retries,
            worker: row.worker.map(Hostname::new),
            received_at: self.timestamp("received_at_us", row.received_at_us)?,
            hidden: row.hidden,
        })
    }

    fn worker_record(&self, row: WorkerRow) -> Result<WorkerRecord, StoreError> {
        Ok(WorkerRecord {
            hostname: Hostname::new(row.hostname),
            last_heartbeat: self.optional_timestamp("last_heartbeat_us", row.last_heartbeat_us)?,
            last_update: self.timestamp("last_update_us", row.last_update_us)?,
        })
    }

    fn check_mode(&self, ts: &Timestamp) -> Result<(), StoreError> {
        if ts.is_aware() != self.aware {
            return Err(StoreError::InvalidInput("timestamp mode does not match the store"));
        }
        Ok(())
    }
}

fn check_timestamp_mode(conn: &Connection, aware: bool) -> Result<(), StoreError> {
    let mode = if aware { "aware" } else { "naive" };
    conn.execute(
        "INSERT OR IGNORE INTO meta(key, value) VALUES ('timestamp_mode', ?1)",
        params![mode],
    )?;
    let stored: String = conn.query_row(
        "SELECT value FROM meta WHERE key='timestamp_mode'",
        [],
        |row| row.get(0),
    )?;
    if stored != mode {
        return Err(StoreError::InvalidInput(
            "store was created with a different timestamp mode",
        ));
    }
    Ok(())
}

/// Make sure a referenced worker row exists so the foreign key resolves.
fn ensure_worker_tx(tx: &Transaction<'_>, hostname: &Hostname, now: &Timestamp) -> Result<(), StoreError> {
    tx.execute(
        "INSERT OR IGNORE INTO workers(hostname, last_heartbeat_us, last_update_us) VALUES (?1, NULL, ?2)",
        params![hostname.as_str(), now.to_micros()],
    )?;
    Ok(())
}

fn insert_task_tx(tx: &Transaction<'_>, record: &TaskRecord) -> Result<(), StoreError> {
    if let Some(worker) = &record.worker {
        ensure_worker_tx(tx, worker, &record.received_at)?;
    }
    tx.execute(
        &format!("INSERT INTO tasks({TASK_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"),
        params![
            record.task_id.as_str(),
            record.state.as_str(),
            record.name,
            record.args,
            record.kwargs,
            record.eta.map(|t| t.to_micros()),
            record.expires.map(|t| t.to_micros()),
            record.result,
            record.traceback,
            record.runtime,
            record.retries,
            record.worker.as_ref().map(|w| w.as_str()),
            record.received_at.to_micros(),
            record.hidden,
        ],
    )?;
    Ok(())
}

/// Write only the columns present in the patch.
fn update_task_tx(tx: &Transaction<'_>, task_id: &TaskId, patch: &TaskPatch) -> Result<(), StoreError> {
    let u = &patch.fields;
    let mut columns: Vec<(&str, SqlValue)> = Vec::new();
    if let Some(state) = &patch.state {
        columns.push(("state", SqlValue::Text(state.as_str().to_string())));
    }
    if let Some(v) = &u.name {
        columns.push(("name", SqlValue::Text(v.clone())));
    }
    if let Some(v) = &u.args {
        columns.push(("args", SqlValue::Text(v.clone())));
    }
    if let Some(v) = &u.kwargs {
        columns.push(("kwargs", SqlValue::Text(v.clone())));
    }
    if let Some(v) = u.eta {
        columns.push(("eta_us", SqlValue::Integer(v.to_micros())));
    }
    if let Some(v) = u.expires {
        columns.push(("expires_us", SqlValue::Integer(v.to_micros())));
    }
    if let Some(v) = &u.result {
        columns.push(("result", SqlValue::Text(v.clone())));
    }
    if let Some(v) = &u.traceback {
        columns.push(("traceback", SqlValue::Text(v.clone())));
    }
    if let Some(v) = u.runtime {
        columns.push(("runtime", SqlValue::Real(v)));
    }
    if let Some(v) = u.retries {
        columns.push(("retries", SqlValue::Integer(v)));
    }
    if let Some(worker) = &u.worker {
        ensure_worker_tx(tx, worker, &u.received_at)?;
        columns.push(("worker", SqlValue::Text(worker.as_str().to_string())));
    }
    columns.push(("received_at_us", SqlValue::Integer(u.received_at.to_micros())));

    let assignments: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, (column, _))| format!("{column}=?{}", i + 1))
        .collect();
    let sql = format!(
        "UPDATE tasks SET {} WHERE task_id=?{}",
        assignments.join(", "),
        columns.len() + 1
    );
    let mut values: Vec<SqlValue> = columns.into_iter().map(|(_, v)| v).collect();
    values.push(SqlValue::Text(task_id.as_str().to_string()));
    tx.execute(&sql, params_from_iter(values))?;
    Ok(())
}

fn select_task_tx(tx: &Transaction<'_>, task_id: &TaskId) -> Result<Option<TaskRow>, StoreError> {
    Ok(tx
        .query_row(
            &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE task_id=?1"),
            params![task_id.as_str()],
            read_task_row,
        )
        .optional()?)
}

impl TaskStore for SqliteStore {
    fn write_task(
        &self,
        task_id: &TaskId,
        decide: &mut dyn FnMut(Option<&TaskRecord>) -> TaskWrite,
    ) -> Result<Option<TaskRecord>, StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let current = select_task_tx(&tx, task_id)?
            .map(|row| self.task_record(row))
            .transpose()?;

        let stored = match decide(current.as_ref()) {
            TaskWrite::Skip => None,
            TaskWrite::Insert(record) => {
                if record.task_id != *task_id {
                    return Err(StoreError::InvalidInput("inserted task_id does not match the locked row"));
                }
                self.check_mode(&record.received_at)?;
                insert_task_tx(&tx, &record)?;
                Some(record)
            }
            TaskWrite::Update(patch) => {
                let Some(mut record) = current else {
                    return Err(StoreError::InvalidInput("update for a task that does not exist"));
                };
                self.check_mode(&patch.fields.received_at)?;
                update_task_tx(&tx, task_id, &patch)?;
                record.apply(&patch);
                Some(record)
            }
        };
        tx.commit()?;
        Ok(stored)
    }

    fn get_task(&self, task_id: &TaskId) -> Result<Option<TaskRecord>, StoreError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE task_id=?1"),
                params![task_id.as_str()],
                read_task_row,
            )
            .optional()?;
        row.map(|row| self.task_record(row)).transpose()
    }

    fn find_tasks(&self, filter: &TaskFilter) -> Result<Vec<TaskRecord>, StoreError> {
        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<SqlValue> = Vec::new();
        if let Some(hidden) = filter.hidden {
            values.push(SqlValue::Integer(i64::from(hidden)));
            clauses.push(format!("hidden=?{}", values.len()));
        }
        if let Some(state) = &filter.state {
            values.push(SqlValue::Text(state.as_str().to_string()));
            clauses.push(format!("state=?{}", values.len()));
        }
        if let Some(worker) = &filter.worker {
            values.push(SqlValue::Text(worker.as_str().to_string()));
            clauses.push(format!("worker=?{}", values.len()));
        }
        let mut sql = format!("SELECT {TASK_COLUMNS} FROM tasks");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY received_at_us DESC, task_id ASC");
        if let Some(limit) = filter.limit {
            values.push(SqlValue::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
            sql.push_str(&format!(" LIMIT ?{}", values.len()));
        }

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), read_task_row)?;
        let mut found = Vec::new();
        for row in rows {
            found.push(self.task_record(row?)?);
        }
        Ok(found)
    }

    fn hide_expired(&self, group: StateGroup, cutoff: Timestamp) -> Result<usize, StoreError> {
        self.check_mode(&cutoff)?;
        let (operator, members): (&str, Vec<&TaskState>) = match group {
            StateGroup::Pending => (
                "NOT IN",
                StateGroup::Succeeded
                    .terminal_members()
                    .iter()
                    .chain(StateGroup::Failed.terminal_members())
                    .collect(),
            ),
            _ => ("IN", group.terminal_members().iter().collect()),
        };
        let placeholders: Vec<String> = (0..members.len()).map(|i| format!("?{}", i + 2)).collect();
        let sql = format!(
            "UPDATE tasks SET hidden=1 WHERE hidden=0 AND received_at_us <= ?1 AND state {operator} ({})",
            placeholders.join(", ")
        );
        let mut values = vec![SqlValue::Integer(cutoff.to_micros())];
        values.extend(members.iter().map(|s| SqlValue::Text(s.as_str().to_string())));

        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let hidden = tx.execute(&sql, params_from_iter(values))?;
        tx.commit()?;
        Ok(hidden)
    }

    fn purge_hidden(&self) -> Result<usize, StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let deleted = tx.execute("DELETE FROM tasks WHERE hidden=1", [])?;
        tx.commit()?;
        Ok(deleted)
    }
}

impl WorkerStore for SqliteStore {
    fn upsert_worker(
        &self,
        hostname: &Hostname,
        last_heartbeat: Option<Timestamp>,
        now: Timestamp,
    ) -> Result<WorkerRecord, StoreError> {
        if hostname.is_blank() {
            return Err(StoreError::InvalidInput("hostname must not be empty"));
        }
        self.check_mode(&now)?;
        if let Some(beat) = &last_heartbeat {
            self.check_mode(beat)?;
        }
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            r#"
            INSERT INTO workers(hostname, last_heartbeat_us, last_update_us)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(hostname) DO UPDATE SET
              last_heartbeat_us=excluded.last_heartbeat_us,
              last_update_us=excluded.last_update_us
            "#,
            params![
                hostname.as_str(),
                last_heartbeat.map(|t| t.to_micros()),
                now.to_micros(),
            ],
        )?;
        tx.commit()?;
        Ok(WorkerRecord {
            hostname: hostname.clone(),
            last_heartbeat,
            last_update: now,
        })
    }

    fn get_worker(&self, hostname: &Hostname) -> Result<Option<WorkerRecord>, StoreError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT hostname, last_heartbeat_us, last_update_us FROM workers WHERE hostname=?1",
                params![hostname.as_str()],
                read_worker_row,
            )
            .optional()?;
        row.map(|row| self.worker_record(row)).transpose()
    }

    fn list_workers(&self) -> Result<Vec<WorkerRecord>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"
            SELECT hostname, last_heartbeat_us, last_update_us
            FROM workers
            ORDER BY last_heartbeat_us IS NULL, last_heartbeat_us DESC, hostname ASC
            "#,
        )?;
        let rows = stmt.query_map([], read_worker_row)?;
        let mut workers = Vec::new();
        for row in rows {
            workers.push(self.worker_record(row?)?);
        }
        Ok(workers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskUpdate;
    use chrono::{TimeZone, Utc};

    fn at(h: u32) -> Timestamp {
        Timestamp::Aware(Utc.with_ymd_and_hms(2016, 6, 1, h, 0, 0).unwrap())
    }

    fn insert(store: &SqliteStore, id: &str, state: TaskState, h: u32) -> TaskRecord {
        let update = TaskUpdate::new(at(h)).with_name("tasks.add");
        let record = TaskRecord::create(id.into(), state, &update).unwrap();
        store
            .write_task(&id.into(), &mut |_| TaskWrite::Insert(record.clone()))
            .unwrap()
            .unwrap()
    }

    #[test]
    fn insert_and_read_back() {
        let store = SqliteStore::open_in_memory(true).unwrap();
        let mut update = TaskUpdate::new(at(1)).with_name("tasks.add").with_eta(at(9));
        update.args = Some("(2, 2)".into());
        update.worker = Some("w1".into());
        let record = TaskRecord::create("t1".into(), TaskState::Received, &update).unwrap();
        store
            .write_task(&"t1".into(), &mut |_| TaskWrite::Insert(record.clone()))
            .unwrap();

        let stored = store.get_task(&"t1".into()).unwrap().unwrap();
        assert_eq!(stored, record);
        // the referenced worker row was created for the foreign key
        assert!(store.get_worker(&"w1".into()).unwrap().is_some());
    }

    #[test]
    fn update_touches_only_present_columns() {
        let store = SqliteStore::open_in_memory(true).unwrap();
        insert(&store, "t1", TaskState::Received, 1);

        let patch = TaskPatch {
            state: Some(TaskState::Success),
            fields: TaskUpdate::new(at(2)).with_result("42"),
        };
        let returned = store
            .write_task(&"t1".into(), &mut |_| TaskWrite::Update(patch.clone()))
            .unwrap()
            .unwrap();
        let stored = store.get_task(&"t1".into()).unwrap().unwrap();

        assert_eq!(returned, stored);
        assert_eq!(stored.state, TaskState::Success);
        assert_eq!(stored.name.as_deref(), Some("tasks.add"));
        assert_eq!(stored.result.as_deref(), Some("42"));
        assert_eq!(stored.received_at, at(2));
    }

    #[test]
    fn hide_groups_and_purge() {
        let store = SqliteStore::open_in_memory(true).unwrap();
        insert(&store, "ok", TaskState::Success, 1);
        insert(&store, "failed", TaskState::Failure, 1);
        insert(&store, "revoked", TaskState::Revoked, 1);
        insert(&store, "pending", TaskState::Started, 1);
        insert(&store, "custom", TaskState::Other("PENDING".into()), 1);
        insert(&store, "fresh", TaskState::Success, 5);

        assert_eq!(store.hide_expired(StateGroup::Succeeded, at(2)).unwrap(), 1);
        assert_eq!(store.hide_expired(StateGroup::Failed, at(2)).unwrap(), 2);
        assert_eq!(store.hide_expired(StateGroup::Pending, at(2)).unwrap(), 2);
        assert_eq!(store.hide_expired(StateGroup::Pending, at(2)).unwrap(), 0);

        assert_eq!(store.purge_hidden().unwrap(), 5);
        let left = store.find_tasks(&TaskFilter::default()).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].task_id, TaskId::new("fresh"));
    }

    #[test]
    fn filters_and_limits() {
        let store = SqliteStore::open_in_memory(true).unwrap();
        insert(&store, "a", TaskState::Received, 1);
        insert(&store, "b", TaskState::Started, 2);
        insert(&store, "c", TaskState::Started, 3);

        let started = store
            .find_tasks(&TaskFilter::active().with_state(TaskState::Started))
            .unwrap();
        let ids: Vec<&str> = started.iter().map(|t| t.task_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b"]);

        let newest = store.find_tasks(&TaskFilter::default().with_limit(1)).unwrap();
        assert_eq!(newest[0].task_id, TaskId::new("c"));
    }

    #[test]
    fn worker_upsert_and_cascade() {
        let store = SqliteStore::open_in_memory(true).unwrap();
        store.upsert_worker(&"w1".into(), Some(at(1)), at(1)).unwrap();
        let again = store.upsert_worker(&"w1".into(), Some(at(2)), at(2)).unwrap();
        assert_eq!(again.last_heartbeat, Some(at(2)));
        assert_eq!(store.list_workers().unwrap().len(), 1);

        let update = TaskUpdate::new(at(2)).with_name("a").with_worker("w1".into());
        let record = TaskRecord::create("t1".into(), TaskState::Received, &update).unwrap();
        store
            .write_task(&"t1".into(), &mut |_| TaskWrite::Insert(record.clone()))
            .unwrap();
        let by_worker = store
            .find_tasks(&TaskFilter::default().with_worker("w1".into()))
            .unwrap();
        assert_eq!(by_worker.len(), 1);

        assert!(store.remove_worker(&"w1".into()).unwrap());
        assert!(store.get_task(&"t1".into()).unwrap().is_none());
    }

    #[test]
    fn reopening_with_another_mode_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.db");
        drop(SqliteStore::open(&path, true).unwrap());
        assert!(SqliteStore::open(&path, true).is_ok());
        let err = SqliteStore::open(&path, false).err().unwrap();
        assert!(matches!(err, StoreError::InvalidInput(_)));
    }

    #[test]
    fn naive_timestamps_round_trip() {
        let store = SqliteStore::open_in_memory(false).unwrap();
        let now = Timestamp::Naive(
            chrono::NaiveDate::from_ymd_opt(2016, 6, 1)
                .unwrap()
                .and_hms_micro_opt(18, 0, 0, 123456)
                .unwrap(),
        );
        store.upsert_worker(&"w1".into(), Some(now), now).unwrap();
        let worker = store.get_worker(&"w1".into()).unwrap().unwrap();
        assert_eq!(worker.last_heartbeat, Some(now));

        // aware values are refused by a naive store
        let err = store.upsert_worker(&"w2".into(), None, at(1)).unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput(_)));
    }
}
