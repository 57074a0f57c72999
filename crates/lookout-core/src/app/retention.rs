//! Retention: hide records past their group's lifetime, then purge them.

use std::sync::Arc;

use chrono::TimeDelta;
use tracing::debug;

use crate::domain::{MonitorError, Normalizer, StateGroup};
use crate::ports::TaskStore;

/// Per-group lifetimes. `None` keeps a group forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub succeeded: Option<TimeDelta>,
    pub failed: Option<TimeDelta>,
    pub pending: Option<TimeDelta>,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            succeeded: Some(TimeDelta::days(1)),
            failed: Some(TimeDelta::days(3)),
            pending: Some(TimeDelta::days(5)),
        }
    }
}

impl RetentionPolicy {
    /// Keep everything.
    pub fn keep_all() -> Self {
        Self {
            succeeded: None,
            failed: None,
            pending: None,
        }
    }

    pub fn lifetime(&self, group: StateGroup) -> Option<TimeDelta> {
        match group {
            StateGroup::Succeeded => self.succeeded,
            StateGroup::Failed => self.failed,
            StateGroup::Pending => self.pending,
        }
    }
}

pub struct RetentionEngine<S: ?Sized> {
    store: Arc<S>,
    normalizer: Normalizer,
    policy: RetentionPolicy,
}

impl<S: TaskStore + ?Sized> RetentionEngine<S> {
    pub fn new(store: Arc<S>, normalizer: Normalizer, policy: RetentionPolicy) -> Self {
        Self {
            store,
            normalizer,
            policy,
        }
    }

    /// Hide every visible record whose group lifetime has passed and, if
    /// any were hidden, purge all hidden records in one transaction.
    ///
    /// Returns the number of records newly hidden by this run.
    pub fn cleanup(&self) -> Result<usize, MonitorError> {
        let now = self.normalizer.now();
        let mut hidden = 0;
        for group in StateGroup::ALL {
            let Some(lifetime) = self.policy.lifetime(group) else {
                continue;
            };
            // a lifetime reaching before the representable range keeps everything
            let Some(cutoff) = now.checked_sub(lifetime) else {
                continue;
            };
            let count = self.store.hide_expired(group, cutoff)?;
            debug!(group = group.as_str(), count, cutoff = %cutoff, "hid expired tasks");
            hidden += count;
        }
        if hidden > 0 {
            let purged = self.store.purge_hidden()?;
            debug!(hidden, purged, "purged hidden tasks");
        }
        Ok(hidden)
    }
}
