//! Durable work/rest session records.
//!
//! A [`SessionRecord`] is the only representation of a running timer. It is
//! anchored to absolute wall-clock timestamps so that any process can pick it
//! up from the store and recompute the countdown, no matter how long the
//! previous owner was suspended.

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shortest phase the timer will run, in seconds.
pub const MIN_DURATION_SECONDS: u64 = 10;

/// Longest phase the timer will run (one day), in seconds.
pub const MAX_DURATION_SECONDS: u64 = 24 * 60 * 60;

/// Which kind of interval is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Work,
    Rest,
}

impl Phase {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Work => "work",
            Self::Rest => "rest",
        }
    }

    /// The phase that follows this one in the alternating cycle.
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::Work => Self::Rest,
            Self::Rest => Self::Work,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "work" => Ok(Self::Work),
            "rest" => Ok(Self::Rest),
            _ => Err(format!("invalid phase: {s}")),
        }
    }
}

/// Coarse state of the timer, derived from the stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "phase", rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Running(Phase),
    Paused(Phase),
}

impl SessionState {
    /// Derives the state from the (possibly absent) current record.
    #[must_use]
    pub fn of(record: Option<&SessionRecord>) -> Self {
        match record {
            None => Self::Idle,
            Some(record) if record.paused => Self::Paused(record.phase),
            Some(record) => Self::Running(record.phase),
        }
    }

    #[must_use]
    pub const fn phase(&self) -> Option<Phase> {
        match self {
            Self::Idle => None,
            Self::Running(phase) | Self::Paused(phase) => Some(*phase),
        }
    }

    /// True only while a work phase is counting down.
    #[must_use]
    pub const fn is_active_work(&self) -> bool {
        matches!(self, Self::Running(Phase::Work))
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Running(phase) => write!(f, "running ({phase})"),
            Self::Paused(phase) => write!(f, "paused ({phase})"),
        }
    }
}

/// Invalid pause/resume request against a record.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TransitionError {
    #[error("session is already paused")]
    AlreadyPaused,
    #[error("session is not paused")]
    NotPaused,
}

/// The durable representation of an in-progress phase.
///
/// `end_time` only ever moves on resume, where it is shifted forward by the
/// time spent paused. While `paused` is set, `end_time` is frozen and the
/// remaining time is measured against `paused_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub phase: Phase,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Nominal length of the phase. Only used for progress display.
    pub duration_seconds: u64,
    #[serde(default)]
    pub paused: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    /// Creates a fresh, running record that starts at `now`.
    ///
    /// Durations above [`MAX_DURATION_SECONDS`] are capped.
    pub fn begin(phase: Phase, duration_seconds: u64, now: DateTime<Utc>) -> Self {
        let duration_seconds = duration_seconds.min(MAX_DURATION_SECONDS);
        Self {
            phase,
            start_time: now,
            end_time: now + seconds(duration_seconds),
            duration_seconds,
            paused: false,
            paused_at: None,
        }
    }

    /// Returns the paused copy of this record.
    pub fn pause(&self, now: DateTime<Utc>) -> Result<Self, TransitionError> {
        if self.paused {
            return Err(TransitionError::AlreadyPaused);
        }
        Ok(Self {
            paused: true,
            // A clock that stepped backwards must not pause before the start.
            paused_at: Some(now.max(self.start_time)),
            ..self.clone()
        })
    }

    /// Returns the resumed copy of this record with `end_time` shifted by the
    /// paused interval, so the remaining time is exactly what it was at pause.
    pub fn resume(&self, now: DateTime<Utc>) -> Result<Self, TransitionError> {
        if !self.paused {
            return Err(TransitionError::NotPaused);
        }
        let paused_at = self.paused_at.unwrap_or(now);
        let delta = (now - paused_at).max(TimeDelta::zero());
        Ok(Self {
            end_time: self.end_time + delta,
            paused: false,
            paused_at: None,
            ..self.clone()
        })
    }
}

/// Clamps a requested duration into the accepted range.
///
/// The floor keeps a focus phase from being skipped trivially and keeps a
/// rest phase from chaining back into work in a tight loop.
#[must_use]
pub fn clamp_duration(requested_seconds: u64) -> u64 {
    requested_seconds.clamp(MIN_DURATION_SECONDS, MAX_DURATION_SECONDS)
}

fn seconds(value: u64) -> TimeDelta {
    // Bounded by MAX_DURATION_SECONDS, so the conversion cannot fail.
    TimeDelta::seconds(i64::try_from(value.min(MAX_DURATION_SECONDS)).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_750_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn begin_sets_end_from_duration() {
        let record = SessionRecord::begin(Phase::Work, 1500, at(0));
        assert_eq!(record.end_time - record.start_time, TimeDelta::seconds(1500));
        assert!(!record.paused);
        assert!(record.paused_at.is_none());
    }

    #[test]
    fn begin_caps_oversized_duration() {
        let record = SessionRecord::begin(Phase::Rest, u64::MAX, at(0));
        assert_eq!(record.duration_seconds, MAX_DURATION_SECONDS);
        assert!(record.end_time >= record.start_time);
    }

    #[test]
    fn pause_then_resume_preserves_remaining_time() {
        let record = SessionRecord::begin(Phase::Work, 600, at(0));
        let paused = record.pause(at(100)).unwrap();
        assert_eq!(paused.end_time, record.end_time);

        let resumed = paused.resume(at(400)).unwrap();
        let remaining_before = record.end_time - at(100);
        let remaining_after = resumed.end_time - at(400);
        assert_eq!(remaining_before, remaining_after);
        assert!(!resumed.paused);
        assert!(resumed.paused_at.is_none());
    }

    #[test]
    fn pause_twice_is_rejected() {
        let paused = SessionRecord::begin(Phase::Work, 60, at(0))
            .pause(at(5))
            .unwrap();
        assert_eq!(paused.pause(at(6)), Err(TransitionError::AlreadyPaused));
    }

    #[test]
    fn resume_when_running_is_rejected() {
        let record = SessionRecord::begin(Phase::Work, 60, at(0));
        assert_eq!(record.resume(at(6)), Err(TransitionError::NotPaused));
    }

    #[test]
    fn resume_with_backwards_clock_does_not_shorten() {
        let paused = SessionRecord::begin(Phase::Work, 60, at(0))
            .pause(at(30))
            .unwrap();
        let resumed = paused.resume(at(10)).unwrap();
        assert_eq!(resumed.end_time, at(60));
    }

    #[test]
    fn clamp_floors_short_requests() {
        assert_eq!(clamp_duration(0), MIN_DURATION_SECONDS);
        assert_eq!(clamp_duration(3), MIN_DURATION_SECONDS);
        assert_eq!(clamp_duration(10), 10);
        assert_eq!(clamp_duration(1500), 1500);
    }

    #[test]
    fn phase_alternates() {
        assert_eq!(Phase::Work.next(), Phase::Rest);
        assert_eq!(Phase::Rest.next(), Phase::Work);
        assert_eq!("rest".parse::<Phase>().unwrap(), Phase::Rest);
        assert!("nap".parse::<Phase>().is_err());
    }

    #[test]
    fn state_derives_from_record() {
        let record = SessionRecord::begin(Phase::Rest, 60, at(0));
        assert_eq!(SessionState::of(None), SessionState::Idle);
        assert_eq!(
            SessionState::of(Some(&record)),
            SessionState::Running(Phase::Rest)
        );
        let paused = record.pause(at(1)).unwrap();
        assert_eq!(
            SessionState::of(Some(&paused)),
            SessionState::Paused(Phase::Rest)
        );
    }

    #[test]
    fn record_uses_camel_case_keys() {
        let record = SessionRecord::begin(Phase::Work, 60, at(0));
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("startTime").is_some());
        assert!(json.get("endTime").is_some());
        assert!(json.get("durationSeconds").is_some());
        assert!(json.get("pausedAt").is_none());
        assert_eq!(json["phase"], "work");
    }
}
