use crate::core::{CascadeError, Result, Value};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// End-of-time sentinel: 9999-12-31T23:59:59Z in epoch milliseconds. A row
/// whose `valid_to` equals this value is the currently active version; every
/// component compares against this one constant.
pub const END_OF_TIME: Timestamp = Timestamp(253_402_300_799_000);

/// Millisecond-precision point in time. Stored as an integer column; all
/// validity-interval arithmetic and fingerprint keys go through this type so
/// comparisons stay lossless at millisecond precision.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp_millis())
    }

    pub const fn from_millis(ms: i64) -> Self {
        Self(ms)
    }

    pub const fn as_millis(self) -> i64 {
        self.0
    }

    pub fn is_end_of_time(self) -> bool {
        self == END_OF_TIME
    }

    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.0).single()
    }

    /// Coerce a stored or payload-supplied value into a timestamp.
    ///
    /// Accepts integer/float epoch values (numeric seconds are normalized
    /// to milliseconds when below 1e12) and date/time strings (RFC 3339,
    /// `YYYY-MM-DD HH:MM:SS`, or a bare date). `Null` coerces to `None`.
    pub fn coerce(value: &Value) -> Result<Option<Timestamp>> {
        match value {
            Value::Null => Ok(None),
            Value::Integer(n) => Ok(Some(Self(normalize_epoch(*n)))),
            Value::Float(f) => {
                if f.abs() < 1e12 {
                    Ok(Some(Self((f * 1000.0) as i64)))
                } else {
                    Ok(Some(Self(*f as i64)))
                }
            }
            Value::Text(s) => parse_datetime(s).map(Some),
            other => Err(CascadeError::Validation(format!(
                "Cannot interpret {} as a timestamp",
                other.type_name()
            ))),
        }
    }

    /// Read back a stored cell. Stored timestamps are always raw epoch
    /// milliseconds, so no seconds normalization happens here; that belongs
    /// to payload ingestion through [`Timestamp::coerce`].
    pub fn from_value(value: &Value) -> Result<Option<Timestamp>> {
        match value {
            Value::Null => Ok(None),
            Value::Integer(ms) => Ok(Some(Self(*ms))),
            other => Err(CascadeError::Validation(format!(
                "Cannot interpret stored {} as a timestamp",
                other.type_name()
            ))),
        }
    }

    /// Stored representation: integer epoch milliseconds.
    pub fn value(self) -> Value {
        Value::Integer(self.0)
    }
}

fn normalize_epoch(n: i64) -> i64 {
    // Numeric seconds are below 1e12 until the year 33658; treat anything
    // smaller as seconds and scale to milliseconds.
    if n != 0 && n.abs() < 1_000_000_000_000 {
        n * 1000
    } else {
        n
    }
}

fn parse_datetime(s: &str) -> Result<Timestamp> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(Timestamp(dt.timestamp_millis()));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(Timestamp(naive.and_utc().timestamp_millis()));
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let naive = date.and_hms_opt(0, 0, 0).unwrap_or_default();
        return Ok(Timestamp(naive.and_utc().timestamp_millis()));
    }
    Err(CascadeError::Validation(format!(
        "Cannot parse '{s}' as a date/time string"
    )))
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "{}", dt.to_rfc3339()),
            None => write!(f, "{}ms", self.0),
        }
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl From<Timestamp> for Value {
    fn from(ts: Timestamp) -> Self {
        ts.value()
    }
}
