//! Clock port - 時刻の抽象化
//!
//! Wall-clock time drives retention cutoffs and liveness checks; the
//! monotonic reading drives heartbeat write coalescing, which must not jump
//! when the wall clock is adjusted.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;

/// Clock は現在時刻を提供
///
/// # テスト容易性
/// - trait により時刻を差し替え可能
/// - テストでは FixedClock を使用
pub trait Clock: Send + Sync {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;

    /// Time elapsed since an arbitrary, fixed origin. Never goes backwards.
    fn monotonic(&self) -> Duration;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }

    fn monotonic(&self) -> Duration {
        (**self).monotonic()
    }
}

/// Production clock.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn monotonic(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Manually driven clock for tests. `advance` moves both readings together.
#[derive(Debug)]
pub struct FixedClock {
    inner: Mutex<(DateTime<Utc>, Duration)>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            inner: Mutex::new((now, Duration::ZERO)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut inner = self.inner.lock();
        let delta = TimeDelta::from_std(by).unwrap_or(TimeDelta::MAX);
        inner.0 = inner.0.checked_add_signed(delta).unwrap_or(inner.0);
        inner.1 += by;
    }

    /// Jump the wall clock only; the monotonic reading is untouched.
    pub fn set_wall(&self, now: DateTime<Utc>) {
        self.inner.lock().0 = now;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.inner.lock().0
    }

    fn monotonic(&self) -> Duration {
        self.inner.lock().1
    }
}
