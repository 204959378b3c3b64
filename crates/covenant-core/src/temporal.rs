//! # Temporal Types — UTC-Only Timestamps
//!
//! Defines [`Timestamp`], a UTC-only timestamp truncated to seconds
//! precision. Every time gate in the engine (`unlock_at`,
//! `next_payment_at`, vesting elapsed time) compares whole seconds, so
//! sub-second components are discarded at construction and can never make
//! two comparisons of the same instant disagree.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CustodyError;

/// A UTC-only timestamp, truncated to seconds precision.
///
/// # Construction
///
/// - [`Timestamp::from_utc()`] — from a `DateTime<Utc>`, truncating
///   sub-seconds.
/// - [`Timestamp::from_epoch_secs()`] — from a Unix timestamp.
///
/// Production code obtains the current time through the
/// [`Clock`](crate::clock::Clock) port, never directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create a timestamp from a `chrono::DateTime<Utc>`, truncating
    /// sub-seconds.
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(truncate_to_seconds(dt))
    }

    /// Create a timestamp from a Unix epoch timestamp (seconds).
    ///
    /// # Errors
    ///
    /// Returns [`CustodyError::ArithmeticOverflow`] if `secs` is outside
    /// the representable range.
    pub fn from_epoch_secs(secs: i64) -> Result<Self, CustodyError> {
        DateTime::from_timestamp(secs, 0)
            .map(Self)
            .ok_or(CustodyError::ArithmeticOverflow("epoch timestamp"))
    }

    /// The Unix epoch timestamp in seconds.
    pub fn epoch_secs(&self) -> i64 {
        self.0.timestamp()
    }

    /// Access the inner `DateTime<Utc>`.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// This timestamp advanced by `secs` seconds.
    ///
    /// # Errors
    ///
    /// Returns [`CustodyError::ArithmeticOverflow`] if the result is not
    /// representable.
    pub fn plus_seconds(&self, secs: u64) -> Result<Timestamp, CustodyError> {
        let secs = i64::try_from(secs)
            .map_err(|_| CustodyError::ArithmeticOverflow("timestamp offset"))?;
        self.0
            .timestamp()
            .checked_add(secs)
            .and_then(|t| DateTime::from_timestamp(t, 0))
            .map(Self)
            .ok_or(CustodyError::ArithmeticOverflow("timestamp addition"))
    }

    /// Whole seconds elapsed since `earlier`, or zero if `earlier` is in
    /// the future relative to `self`.
    pub fn seconds_since(&self, earlier: Timestamp) -> u64 {
        let delta = self.0.timestamp() - earlier.0.timestamp();
        u64::try_from(delta).unwrap_or(0)
    }

    /// Render as ISO8601 with Z suffix (e.g. `2026-03-01T12:00:00Z`).
    pub fn to_iso8601(&self) -> String {
        self.0.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_iso8601())
    }
}

/// Truncate a `DateTime<Utc>` to seconds precision (discard nanoseconds).
fn truncate_to_seconds(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.with_nanosecond(0).unwrap_or(dt)
}
