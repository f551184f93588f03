//! Wall-clock countdown derivation.
//!
//! Remaining time is never decremented. It is recomputed from the record's
//! absolute timestamps and the current time on every call, which keeps the
//! result identical whether it runs right after a write, after the process
//! was suspended for hours, or from a surface repainting once a second.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::SessionRecord;

/// Source of the current wall-clock time.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Remaining time for a record at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Countdown {
    pub remaining_ms: i64,
    /// Remaining whole seconds, rounded up so `0` only appears at expiry.
    pub time_remaining_seconds: u64,
    /// A paused record never expires.
    pub is_expired: bool,
}

/// Computes the countdown for `record` at `now`.
pub fn countdown(record: &SessionRecord, now: DateTime<Utc>) -> Countdown {
    let reference = if record.paused {
        record.paused_at.unwrap_or(now)
    } else {
        now
    };
    let remaining_ms = (record.end_time - reference).num_milliseconds().max(0);
    let time_remaining_seconds = u64::try_from(remaining_ms).unwrap_or(0).div_ceil(1000);
    Countdown {
        remaining_ms,
        time_remaining_seconds,
        is_expired: !record.paused && remaining_ms == 0,
    }
}

/// Fraction of the nominal duration already elapsed, in `[0, 1]`.
#[expect(
    clippy::cast_precision_loss,
    reason = "millisecond counts for a single phase are far below f64 precision"
)]
pub fn progress(record: &SessionRecord, now: DateTime<Utc>) -> f64 {
    if record.duration_seconds == 0 {
        return 0.0;
    }
    let total_ms = record.duration_seconds.saturating_mul(1000) as f64;
    let remaining_ms = countdown(record, now).remaining_ms as f64;
    ((total_ms - remaining_ms) / total_ms).clamp(0.0, 1.0)
}

/// Formats whole seconds as `m:ss`.
pub fn format_clock(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Phase;

    fn at_ms(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_750_000_000_000 + ms).unwrap()
    }

    #[test]
    fn running_countdown_tracks_now() {
        let record = SessionRecord::begin(Phase::Work, 60, at_ms(0));
        let c = countdown(&record, at_ms(15_000));
        assert_eq!(c.remaining_ms, 45_000);
        assert_eq!(c.time_remaining_seconds, 45);
        assert!(!c.is_expired);
    }

    #[test]
    fn partial_seconds_round_up() {
        let record = SessionRecord::begin(Phase::Work, 60, at_ms(0));
        let c = countdown(&record, at_ms(59_001));
        assert_eq!(c.time_remaining_seconds, 1);
        assert!(!c.is_expired);
    }

    #[test]
    fn past_end_is_expired_and_clamped() {
        let record = SessionRecord::begin(Phase::Work, 10, at_ms(0));
        let c = countdown(&record, at_ms(3_600_000));
        assert_eq!(c.remaining_ms, 0);
        assert_eq!(c.time_remaining_seconds, 0);
        assert!(c.is_expired);
    }

    #[test]
    fn paused_countdown_is_frozen() {
        let record = SessionRecord::begin(Phase::Work, 60, at_ms(0))
            .pause(at_ms(20_000))
            .unwrap();
        let early = countdown(&record, at_ms(21_000));
        let late = countdown(&record, at_ms(10_000_000));
        assert_eq!(early, late);
        assert_eq!(late.time_remaining_seconds, 40);
        assert!(!late.is_expired);
    }

    #[test]
    fn countdown_is_pure() {
        let record = SessionRecord::begin(Phase::Rest, 300, at_ms(0));
        let now = at_ms(123_456);
        assert_eq!(countdown(&record, now), countdown(&record, now));
    }

    #[test]
    fn progress_spans_zero_to_one() {
        let record = SessionRecord::begin(Phase::Work, 100, at_ms(0));
        assert!(progress(&record, at_ms(0)).abs() < f64::EPSILON);
        assert!((progress(&record, at_ms(50_000)) - 0.5).abs() < 1e-9);
        assert!((progress(&record, at_ms(500_000)) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn format_clock_pads_seconds() {
        assert_eq!(format_clock(0), "0:00");
        assert_eq!(format_clock(65), "1:05");
        assert_eq!(format_clock(1500), "25:00");
    }
}
