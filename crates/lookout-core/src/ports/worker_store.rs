//! WorkerStore port - worker records

use crate::domain::{Hostname, StoreError, Timestamp, WorkerRecord};

pub trait WorkerStore: Send + Sync {
    /// Insert or update the worker row under an exclusive row scope.
    /// `last_update` is set to `now` on every write.
    fn upsert_worker(
        &self,
        hostname: &Hostname,
        last_heartbeat: Option<Timestamp>,
        now: Timestamp,
    ) -> Result<WorkerRecord, StoreError>;

    fn get_worker(&self, hostname: &Hostname) -> Result<Option<WorkerRecord>, StoreError>;

    /// All workers, latest heartbeat first; never-seen workers last.
    fn list_workers(&self) -> Result<Vec<WorkerRecord>, StoreError>;
}
