use super::value::Value;
use serde::{Deserialize, Serialize};

/// Offset on the session timeline, microsecond resolution
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);

    pub const fn from_micros(micros: i64) -> Self {
        Self(micros)
    }

    pub const fn from_millis(millis: i64) -> Self {
        Self(millis * 1_000)
    }

    pub const fn from_secs(secs: i64) -> Self {
        Self(secs * 1_000_000)
    }

    pub fn from_secs_f64(secs: f64) -> Self {
        Self((secs * 1_000_000.0).round() as i64)
    }

    /// `None` when `secs` does not fit the microsecond range
    pub const fn checked_from_secs(secs: i64) -> Option<Self> {
        match secs.checked_mul(1_000_000) {
            Some(us) => Some(Self(us)),
            None => None,
        }
    }

    /// `None` for non-finite input or values outside the microsecond range
    pub fn checked_from_secs_f64(secs: f64) -> Option<Self> {
        let us = (secs * 1_000_000.0).round();
        // i64::MAX is not exactly representable, so compare against 2^63
        if us.is_finite() && us >= i64::MIN as f64 && us < i64::MAX as f64 {
            Some(Self(us as i64))
        } else {
            None
        }
    }

    pub const fn as_micros(self) -> i64 {
        self.0
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    /// Read a timestamp out of a record cell.
    ///
    /// `Timestamp` cells carry microseconds; plain numbers are seconds.
    /// Seconds that overflow the microsecond range yield `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Timestamp(us) => Some(Self(*us)),
            Value::Int64(secs) => Self::checked_from_secs(*secs),
            Value::Float64(secs) => Self::checked_from_secs_f64(*secs),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("duration does not fit in microseconds")]
pub struct DurationOutOfRange;

impl TryFrom<chrono::Duration> for Timestamp {
    type Error = DurationOutOfRange;

    fn try_from(d: chrono::Duration) -> Result<Self, Self::Error> {
        d.num_microseconds().map(Self).ok_or(DurationOutOfRange)
    }
}

impl From<Timestamp> for chrono::Duration {
    fn from(t: Timestamp) -> Self {
        chrono::Duration::microseconds(t.0)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6}s", self.as_secs_f64())
    }
}
