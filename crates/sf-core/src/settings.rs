//! Timer and gating configuration persisted alongside the session.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::session::{Phase, SessionState, clamp_duration};

const DEFAULT_WORK_SECONDS: u64 = 25 * 60;
const DEFAULT_REST_SECONDS: u64 = 5 * 60;

/// Durable user timer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimerSettings {
    pub work_duration_seconds: u64,
    pub rest_duration_seconds: u64,
    pub notifications_enabled: bool,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            work_duration_seconds: DEFAULT_WORK_SECONDS,
            rest_duration_seconds: DEFAULT_REST_SECONDS,
            notifications_enabled: true,
        }
    }
}

impl TimerSettings {
    /// Returns a copy with both durations inside the accepted range.
    #[must_use]
    pub fn clamped(self) -> Self {
        Self {
            work_duration_seconds: clamp_duration(self.work_duration_seconds),
            rest_duration_seconds: clamp_duration(self.rest_duration_seconds),
            ..self
        }
    }

    /// Configured (clamped) duration for a phase.
    #[must_use]
    pub fn duration_for(&self, phase: Phase) -> u64 {
        match phase {
            Phase::Work => clamp_duration(self.work_duration_seconds),
            Phase::Rest => clamp_duration(self.rest_duration_seconds),
        }
    }
}

/// Gating mode. `normal` turns gating off; every other value turns it on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mode(String);

impl Mode {
    pub const NORMAL: &'static str = "normal";
    pub const FOCUS: &'static str = "focus";

    pub fn new(value: impl AsRef<str>) -> Self {
        Self(value.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_normal(&self) -> bool {
        self.0 == Self::NORMAL
    }
}

impl Default for Mode {
    fn default() -> Self {
        Self(Self::FOCUS.to_string())
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Process-wide flags consulted before every gating decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatingConfig {
    pub extension_enabled: bool,
    pub mode: Mode,
}

impl Default for GatingConfig {
    fn default() -> Self {
        Self {
            extension_enabled: true,
            mode: Mode::default(),
        }
    }
}

impl GatingConfig {
    pub fn gating_enabled(&self) -> bool {
        self.extension_enabled && !self.mode.is_normal()
    }
}

/// Which session states the distraction gate runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateScope {
    /// Only while a work phase is running (not paused, not resting).
    #[default]
    ActiveWork,
    /// Whenever gating is enabled, regardless of the timer.
    Always,
}

impl GateScope {
    pub const fn admits(self, state: SessionState) -> bool {
        match self {
            Self::ActiveWork => state.is_active_work(),
            Self::Always => true,
        }
    }
}
