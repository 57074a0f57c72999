//! Timestamp normalization.
//!
//! Events carry time as Unix epoch floats, ISO-8601 strings, or already
//! structured values. Everything stored goes through [`Normalizer`], which
//! produces one canonical form chosen once at startup:
//!
//! - aware mode: a UTC instant. Naive inputs are taken to be UTC.
//! - naive mode: wall-clock time in the configured local offset. Aware
//!   inputs are converted to that offset and stripped; naive inputs pass
//!   through untouched.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, SecondsFormat, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ports::Clock;

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimestampError {
    #[error("invalid ISO-8601 timestamp: {0:?}")]
    InvalidIso(String),

    #[error("epoch timestamp out of range: {0}")]
    EpochOutOfRange(f64),

    #[error("unsupported timestamp value: {0}")]
    Unsupported(String),
}

/// A timestamp as it arrives from the cluster.
#[derive(Debug, Clone, PartialEq)]
pub enum RawTimestamp {
    /// Seconds since the Unix epoch.
    Epoch(f64),
    /// ISO-8601 text, with or without an offset.
    Iso(String),
    Aware(DateTime<FixedOffset>),
    Naive(NaiveDateTime),
}

impl RawTimestamp {
    /// Read a timestamp out of an event field. `null` yields `None`.
    pub fn from_json(value: &serde_json::Value) -> Result<Option<Self>, TimestampError> {
        match value {
            serde_json::Value::Null => Ok(None),
            serde_json::Value::Number(n) => n
                .as_f64()
                .map(|v| Some(Self::Epoch(v)))
                .ok_or_else(|| TimestampError::Unsupported(n.to_string())),
            serde_json::Value::String(s) => Ok(Some(Self::Iso(s.clone()))),
            other => Err(TimestampError::Unsupported(other.to_string())),
        }
    }
}

impl From<f64> for RawTimestamp {
    fn from(value: f64) -> Self {
        Self::Epoch(value)
    }
}

impl From<&str> for RawTimestamp {
    fn from(value: &str) -> Self {
        Self::Iso(value.to_string())
    }
}

impl From<DateTime<Utc>> for RawTimestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Aware(value.fixed_offset())
    }
}

impl From<NaiveDateTime> for RawTimestamp {
    fn from(value: NaiveDateTime) -> Self {
        Self::Naive(value)
    }
}

/// Canonical timestamp. Within one process every value has the same variant,
/// because the [`Normalizer`] mode never changes at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timestamp {
    Aware(DateTime<Utc>),
    Naive(NaiveDateTime),
}

impl Timestamp {
    pub fn is_aware(&self) -> bool {
        matches!(self, Timestamp::Aware(_))
    }

    pub fn checked_add(self, delta: TimeDelta) -> Option<Self> {
        match self {
            Timestamp::Aware(t) => t.checked_add_signed(delta).map(Timestamp::Aware),
            Timestamp::Naive(t) => t.checked_add_signed(delta).map(Timestamp::Naive),
        }
    }

    pub fn checked_sub(self, delta: TimeDelta) -> Option<Self> {
        match self {
            Timestamp::Aware(t) => t.checked_sub_signed(delta).map(Timestamp::Aware),
            Timestamp::Naive(t) => t.checked_sub_signed(delta).map(Timestamp::Naive),
        }
    }

    /// Microseconds on the variant's own axis (UTC for aware, wall time for naive).
    pub fn to_micros(&self) -> i64 {
        match self {
            Timestamp::Aware(t) => t.timestamp_micros(),
            Timestamp::Naive(t) => t.and_utc().timestamp_micros(),
        }
    }

    pub fn from_micros(aware: bool, micros: i64) -> Option<Self> {
        let utc = DateTime::<Utc>::from_timestamp_micros(micros)?;
        Some(if aware {
            Timestamp::Aware(utc)
        } else {
            Timestamp::Naive(utc.naive_utc())
        })
    }
}

impl PartialOrd for Timestamp {
    /// Aware and naive values are not comparable.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Timestamp::Aware(a), Timestamp::Aware(b)) => Some(a.cmp(b)),
            (Timestamp::Naive(a), Timestamp::Naive(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timestamp::Aware(t) => f.write_str(&t.to_rfc3339_opts(SecondsFormat::Micros, true)),
            Timestamp::Naive(t) => write!(f, "{}", t.format("%Y-%m-%d %H:%M:%S%.6f")),
        }
    }
}

/// Converts raw timestamps into the process-wide canonical form.
#[derive(Clone)]
pub struct Normalizer {
    aware: bool,
    local_offset: FixedOffset,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for Normalizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Normalizer")
            .field("aware", &self.aware)
            .field("local_offset", &self.local_offset)
            .finish_non_exhaustive()
    }
}

impl Normalizer {
    pub fn new(aware: bool, local_offset: FixedOffset, clock: Arc<dyn Clock>) -> Self {
        Self {
            aware,
            local_offset,
            clock,
        }
    }

    pub fn is_aware(&self) -> bool {
        self.aware
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// `None` in, `None` out.
    pub fn normalize(&self, raw: Option<&RawTimestamp>) -> Result<Option<Timestamp>, TimestampError> {
        raw.map(|raw| self.normalize_value(raw)).transpose()
    }

    pub fn normalize_value(&self, raw: &RawTimestamp) -> Result<Timestamp, TimestampError> {
        match raw {
            RawTimestamp::Epoch(secs) => self.convert_epoch(*secs),
            RawTimestamp::Iso(text) => match parse_iso8601(text)? {
                ParsedIso::Aware(dt) => Ok(self.convert_aware(dt)),
                ParsedIso::Naive(dt) => Ok(self.convert_naive(dt)),
            },
            RawTimestamp::Aware(dt) => Ok(self.convert_aware(*dt)),
            RawTimestamp::Naive(dt) => Ok(self.convert_naive(*dt)),
        }
    }

    /// Convenience for JSON event fields.
    pub fn normalize_json(&self, value: &serde_json::Value) -> Result<Option<Timestamp>, TimestampError> {
        let raw = RawTimestamp::from_json(value)?;
        self.normalize(raw.as_ref())
    }

    pub fn canonicalize_utc(&self, instant: DateTime<Utc>) -> Timestamp {
        if self.aware {
            Timestamp::Aware(instant)
        } else {
            Timestamp::Naive(instant.with_timezone(&self.local_offset).naive_local())
        }
    }

    pub fn now(&self) -> Timestamp {
        self.canonicalize_utc(self.clock.now())
    }

    /// True when `timestamp` is at or before now.
    pub fn is_due(&self, timestamp: &Timestamp) -> bool {
        matches!(
            timestamp.partial_cmp(&self.now()),
            Some(Ordering::Less | Ordering::Equal)
        )
    }

    fn convert_epoch(&self, secs: f64) -> Result<Timestamp, TimestampError> {
        if !secs.is_finite() {
            return Err(TimestampError::EpochOutOfRange(secs));
        }
        let micros = (secs * 1_000_000.0).round();
        if micros < i64::MIN as f64 || micros > i64::MAX as f64 {
            return Err(TimestampError::EpochOutOfRange(secs));
        }
        let instant = DateTime::<Utc>::from_timestamp_micros(micros as i64)
            .ok_or(TimestampError::EpochOutOfRange(secs))?;
        Ok(self.canonicalize_utc(instant))
    }

    fn convert_aware(&self, dt: DateTime<FixedOffset>) -> Timestamp {
        self.canonicalize_utc(dt.with_timezone(&Utc))
    }

    fn convert_naive(&self, dt: NaiveDateTime) -> Timestamp {
        if self.aware {
            Timestamp::Aware(dt.and_utc())
        } else {
            Timestamp::Naive(dt)
        }
    }
}

enum ParsedIso {
    Aware(DateTime<FixedOffset>),
    Naive(NaiveDateTime),
}

fn parse_iso8601(text: &str) -> Result<ParsedIso, TimestampError> {
    let trimmed = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(ParsedIso::Aware(dt));
    }
    // rfc3339 requires seconds and a 'T'; accept the space separator too.
    if let Ok(dt) = DateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Ok(ParsedIso::Aware(dt));
    }
    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(ParsedIso::Naive(dt));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(ParsedIso::Naive(date.and_time(chrono::NaiveTime::MIN)));
    }
    Err(TimestampError::InvalidIso(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::FixedClock;
    use chrono::{NaiveDate, TimeZone};

    // 2016-06-01T15:00:00Z
    const TSTAMP: f64 = 1464793200.0;

    fn helsinki_summer() -> FixedOffset {
        FixedOffset::east_opt(3 * 3600).unwrap()
    }

    fn normalizer(aware: bool) -> Normalizer {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2016, 6, 1, 15, 0, 0).unwrap());
        Normalizer::new(aware, helsinki_summer(), Arc::new(clock))
    }

    fn naive(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32, us: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_micro_opt(h, mi, s, us)
            .unwrap()
    }

    #[test]
    fn aware_mode_converts_everything_to_utc() {
        let n = normalizer(true);
        assert_eq!(
            n.normalize_value(&TSTAMP.into()).unwrap(),
            Timestamp::Aware(Utc.with_ymd_and_hms(2016, 6, 1, 15, 0, 0).unwrap())
        );
        assert_eq!(
            n.normalize_value(&"2016-06-01T15:16:17.654321+00:00".into()).unwrap(),
            Timestamp::Aware(naive(2016, 6, 1, 15, 16, 17, 654321).and_utc())
        );
        assert_eq!(
            n.normalize_value(&"2016-07-01T15:16:17.765432+03:00".into()).unwrap(),
            Timestamp::Aware(naive(2016, 7, 1, 12, 16, 17, 765432).and_utc())
        );
        // naive input is assumed to be UTC
        assert_eq!(
            n.normalize_value(&"2016-06-04T15:16:17.654321".into()).unwrap(),
            Timestamp::Aware(naive(2016, 6, 4, 15, 16, 17, 654321).and_utc())
        );
    }

    #[test]
    fn naive_mode_renders_local_wall_time() {
        let n = normalizer(false);
        assert_eq!(
            n.normalize_value(&TSTAMP.into()).unwrap(),
            Timestamp::Naive(naive(2016, 6, 1, 18, 0, 0, 0))
        );
        assert_eq!(
            n.normalize_value(&"2016-06-01T15:16:17.654321+00:00".into()).unwrap(),
            Timestamp::Naive(naive(2016, 6, 1, 18, 16, 17, 654321))
        );
        assert_eq!(
            n.normalize_value(&"2016-07-01T15:16:17.765432+03:00".into()).unwrap(),
            Timestamp::Naive(naive(2016, 7, 1, 15, 16, 17, 765432))
        );
        assert_eq!(
            n.normalize_value(&"2016-06-04T15:16:17.654321".into()).unwrap(),
            Timestamp::Naive(naive(2016, 6, 4, 15, 16, 17, 654321))
        );
    }

    #[test]
    fn null_stays_null() {
        assert_eq!(normalizer(true).normalize(None).unwrap(), None);
        assert_eq!(
            normalizer(true).normalize_json(&serde_json::Value::Null).unwrap(),
            None
        );
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let err = normalizer(true)
            .normalize_value(&"not a date".into())
            .unwrap_err();
        assert_eq!(err, TimestampError::InvalidIso("not a date".to_string()));

        let err = normalizer(true).normalize_value(&f64::NAN.into()).unwrap_err();
        assert!(matches!(err, TimestampError::EpochOutOfRange(_)));

        let err = normalizer(true)
            .normalize_json(&serde_json::json!({"at": 1}))
            .unwrap_err();
        assert!(matches!(err, TimestampError::Unsupported(_)));
    }

    #[test]
    fn is_due_compares_against_clock() {
        let n = normalizer(true);
        let now = n.now();
        assert!(n.is_due(&now));
        assert!(n.is_due(&now.checked_sub(TimeDelta::seconds(1)).unwrap()));
        assert!(!n.is_due(&now.checked_add(TimeDelta::seconds(1)).unwrap()));
    }

    #[test]
    fn aware_and_naive_do_not_compare() {
        let a = Timestamp::Aware(Utc.with_ymd_and_hms(2016, 6, 1, 15, 0, 0).unwrap());
        let b = Timestamp::Naive(naive(2016, 6, 1, 15, 0, 0, 0));
        assert_eq!(a.partial_cmp(&b), None);
    }

    #[test]
    fn micros_survive_storage_encoding() {
        let n = normalizer(false);
        let ts = n.normalize_value(&"2016-06-04T15:16:17.654321".into()).unwrap();
        assert_eq!(Timestamp::from_micros(false, ts.to_micros()), Some(ts));
    }
}
