//! # Timestamps and Clocks
//!
//! Defines `Timestamp`, a UTC-only timestamp truncated to seconds precision,
//! and the [`Clock`] seam through which callers supply the current time.
//!
//! ## Security Invariant
//!
//! Timestamps are normalized to UTC at construction. Local offsets would
//! produce different canonical byte sequences for the same instant and
//! break signatures that cover a timestamp.
//!
//! ## Wire Forms
//!
//! - RFC 3339 with any offset (`2026-01-15T17:00:00+05:00`), normalized to UTC.
//! - The legacy XML form `2026-01-15 12:00:00 UTC`.
//!
//! Output is always `YYYY-MM-DDTHH:MM:SSZ`.

use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Legacy XML timestamp layout.
const LEGACY_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// An instant in UTC with whole-second precision.
///
/// Built with [`Timestamp::from_utc`], [`Timestamp::parse`] (strict, `Z`
/// only), [`Timestamp::parse_wire`] (anything a peer may send), or from a
/// [`Clock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Wrap `dt`, dropping any fractional second.
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(truncate_to_seconds(dt))
    }

    /// Parse a timestamp from an RFC 3339 string with the `Z` suffix.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidValue`] if the string is not RFC 3339
    /// or uses an explicit offset.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        if !s.ends_with('Z') {
            return Err(ValidationError::invalid(
                "timestamp",
                format!("must use Z suffix (UTC only), got {s:?}"),
            ));
        }
        Self::parse_lenient(s)
    }

    /// Parse a timestamp from an RFC 3339 string, accepting any offset and
    /// converting to UTC.
    pub fn parse_lenient(s: &str) -> Result<Self, ValidationError> {
        let dt = DateTime::parse_from_rfc3339(s).map_err(|e| {
            ValidationError::invalid("timestamp", format!("invalid RFC 3339 timestamp {s:?}: {e}"))
        })?;
        Ok(Self(truncate_to_seconds(dt.with_timezone(&Utc))))
    }

    /// Parse any timestamp form that appears on the wire: RFC 3339 with
    /// any offset, or the legacy `YYYY-MM-DD HH:MM:SS UTC` layout.
    pub fn parse_wire(s: &str) -> Result<Self, ValidationError> {
        let s = s.trim();
        if s.ends_with(" UTC") {
            let naive = NaiveDateTime::parse_from_str(s, LEGACY_FORMAT).map_err(|e| {
                ValidationError::invalid("timestamp", format!("invalid legacy timestamp {s:?}: {e}"))
            })?;
            return Ok(Self(naive.and_utc()));
        }
        Self::parse_lenient(s)
    }

    /// Seconds since the Unix epoch.
    pub fn from_epoch_secs(secs: i64) -> Result<Self, ValidationError> {
        let dt = DateTime::from_timestamp(secs, 0).ok_or_else(|| {
            ValidationError::invalid("timestamp", format!("invalid Unix timestamp: {secs}"))
        })?;
        Ok(Self(dt))
    }

    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    pub fn epoch_secs(&self) -> i64 {
        self.0.timestamp()
    }

    /// Seconds from `self` to `later`; negative when `later` is earlier.
    pub fn seconds_until(&self, later: &Timestamp) -> i64 {
        later.epoch_secs() - self.epoch_secs()
    }

    /// `YYYY-MM-DDTHH:MM:SSZ`, the only form fedwire writes outside legacy XML.
    pub fn to_iso8601(&self) -> String {
        self.0.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }

    /// Render in the legacy XML layout (e.g., `2026-01-15 12:00:00 UTC`).
    pub fn to_legacy_format(&self) -> String {
        self.0.format(LEGACY_FORMAT).to_string()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_iso8601())
    }
}

fn truncate_to_seconds(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.with_nanosecond(0).unwrap_or(dt)
}

// ─── Clock ───────────────────────────────────────────────────────────

/// Source of the current time.
///
/// The engine never reads the system clock on its own; callers hand it a
/// `Clock`, which keeps freshness checks deterministic under test.
pub trait Clock: Send + Sync {
    /// The current time.
    fn now(&self) -> Timestamp;
}

/// Reads the operating system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_utc(Utc::now())
    }
}

/// Always reports the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub Timestamp);

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        self.0
    }
}
