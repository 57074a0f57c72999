//! Worker liveness: heartbeat write coalescing and online checks.
//!
//! Workers heartbeat every couple of seconds. Storing each one would turn
//! the worker table into a write hot spot, so writes for one hostname are
//! spaced at least `write_interval` apart on the monotonic clock. Between
//! writes the cached record is returned with the newest heartbeat folded in;
//! the stored row may lag by at most one interval.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use parking_lot::Mutex;
use tracing::trace;

use crate::domain::{Hostname, MonitorError, Normalizer, Timestamp, WorkerRecord};
use crate::ports::WorkerStore;

/// When a worker counts as online.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LivenessPolicy {
    /// Minimum spacing between two stored heartbeats of one worker.
    pub write_interval: Duration,
    /// A worker is online while `now < last_heartbeat + expected_interval`.
    pub expected_interval: Duration,
}

impl Default for LivenessPolicy {
    fn default() -> Self {
        Self {
            write_interval: Duration::from_secs(60),
            expected_interval: Duration::from_secs(4),
        }
    }
}

impl LivenessPolicy {
    /// Online check against `now` in the same timestamp mode.
    pub fn is_alive(&self, record: &WorkerRecord, now: &Timestamp) -> bool {
        let Some(last) = record.last_heartbeat else {
            return false;
        };
        let Ok(window) = TimeDelta::from_std(self.expected_interval) else {
            return true;
        };
        match last.checked_add(window) {
            Some(deadline) => now.partial_cmp(&deadline) == Some(Ordering::Less),
            None => true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Sighting {
    Heartbeat(Timestamp),
    Offline,
    /// Seen through a task event; says nothing about heartbeats.
    Seen,
}

impl Sighting {
    /// Heartbeat to keep given the one known so far. Never moves backwards.
    fn fold(self, known: Option<Timestamp>) -> Option<Timestamp> {
        match self {
            Sighting::Heartbeat(beat) => match known {
                Some(prev) if prev.partial_cmp(&beat) == Some(Ordering::Greater) => Some(prev),
                _ => Some(beat),
            },
            Sighting::Offline => None,
            Sighting::Seen => known,
        }
    }
}

#[derive(Debug, Clone)]
struct CachedWorker {
    written_at: Duration,
    record: WorkerRecord,
}

/// Tracks worker heartbeats on top of a [`WorkerStore`].
pub struct LivenessTracker<S: ?Sized> {
    store: Arc<S>,
    normalizer: Normalizer,
    policy: LivenessPolicy,
    cache: Mutex<HashMap<Hostname, CachedWorker>>,
}

impl<S: WorkerStore + ?Sized> LivenessTracker<S> {
    pub fn new(store: Arc<S>, normalizer: Normalizer, policy: LivenessPolicy) -> Self {
        Self {
            store,
            normalizer,
            policy,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Record the worker's current heartbeat.
    ///
    /// `None` means the worker has no heartbeat any more (it went offline)
    /// and clears the stored value. Within the write interval the store is
    /// not touched and the cached record comes back with the newest value.
    pub fn handle_heartbeat(
        &self,
        hostname: &Hostname,
        heartbeat: Option<Timestamp>,
    ) -> Result<WorkerRecord, MonitorError> {
        let sighting = match heartbeat {
            Some(beat) => Sighting::Heartbeat(beat),
            None => Sighting::Offline,
        };
        self.observe(hostname, sighting)
    }

    /// Make sure a worker row exists, keeping its last known heartbeat.
    pub fn touch(&self, hostname: &Hostname) -> Result<WorkerRecord, MonitorError> {
        self.observe(hostname, Sighting::Seen)
    }

    fn observe(&self, hostname: &Hostname, sighting: Sighting) -> Result<WorkerRecord, MonitorError> {
        if hostname.is_blank() {
            return Err(MonitorError::InvalidField {
                field: "hostname",
                message: "must not be empty".to_string(),
            });
        }
        let tick = self.normalizer.clock().monotonic();

        let mut cache = self.cache.lock();
        if let Some(cached) = cache.get_mut(hostname) {
            if tick.saturating_sub(cached.written_at) < self.policy.write_interval {
                cached.record.last_heartbeat = sighting.fold(cached.record.last_heartbeat);
                trace!(hostname = %hostname, "heartbeat coalesced");
                return Ok(cached.record.clone());
            }
        }

        let known = match cache.get(hostname) {
            Some(cached) => cached.record.last_heartbeat,
            None if matches!(sighting, Sighting::Seen) => self
                .store
                .get_worker(hostname)?
                .and_then(|stored| stored.last_heartbeat),
            None => None,
        };
        let record = self
            .store
            .upsert_worker(hostname, sighting.fold(known), self.normalizer.now())?;
        cache.insert(
            hostname.clone(),
            CachedWorker {
                written_at: tick,
                record: record.clone(),
            },
        );
        Ok(record)
    }

    pub fn is_alive(&self, record: &WorkerRecord, now: &Timestamp) -> bool {
        self.policy.is_alive(record, now)
    }
}
