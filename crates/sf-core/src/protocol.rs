//! Typed request/response boundary between the daemon and its surfaces.
//!
//! Every inbound [`Request`] maps to exactly one authority operation. Outbound
//! [`Notification`]s are broadcast so open surfaces can repaint without
//! polling. All values travel as single-line JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::{Countdown, countdown, progress};
use crate::gate::GateDecision;
use crate::session::{Phase, SessionRecord, SessionState};
use crate::settings::{GatingConfig, TimerSettings};

const WORK_COMPLETE_MESSAGES: &[&str] = &[
    "Great job! Time to recharge.",
    "Nice focus session, grab some water!",
    "You crushed it. Stretch time!",
    "Deep breath. Enjoy a short break.",
];

const REST_COMPLETE_MESSAGES: &[&str] = &[
    "Break's over. Let's dive back in!",
    "Refreshed? Back to it!",
    "You've got this. Time to focus.",
    "Small steps, big wins. Let's go!",
];

/// Picks the completion message for a finished phase.
///
/// Seeded by the session's start time so every surface shows the same line.
pub fn completion_message(phase: Phase, started: DateTime<Utc>) -> &'static str {
    let pool = match phase {
        Phase::Work => WORK_COMPLETE_MESSAGES,
        Phase::Rest => REST_COMPLETE_MESSAGES,
    };
    let len = i64::try_from(pool.len()).unwrap_or(1);
    let index = usize::try_from(started.timestamp().rem_euclid(len)).unwrap_or(0);
    pool.get(index).copied().unwrap_or("Session complete!")
}

/// Which browser event produced a tab notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TabEventKind {
    /// The user switched to the tab.
    Activated,
    /// A tab finished loading a new URL.
    Completed,
}

/// A tab focus or navigation event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabEvent {
    #[serde(default)]
    pub tab_id: u64,
    pub url: String,
    pub kind: TabEventKind,
    /// Whether the tab is in the foreground. Only meaningful for `completed`.
    #[serde(default = "default_active")]
    pub active: bool,
}

const fn default_active() -> bool {
    true
}

impl TabEvent {
    /// Activations always gate; load completions only for the foreground tab.
    pub const fn is_gateable(&self) -> bool {
        match self.kind {
            TabEventKind::Activated => true,
            TabEventKind::Completed => self.active,
        }
    }
}

/// Inbound messages the daemon responds to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum Request {
    StartSession {
        phase: Option<Phase>,
        duration_seconds: Option<u64>,
    },
    Pause,
    Resume,
    Stop,
    GetState,
    AddWorkDomain {
        domain: String,
    },
    RemoveWorkDomain {
        domain: String,
    },
    ClearWorkDomains,
    ListWorkDomains,
    /// "Yes, it's work" from the distraction prompt.
    ClassifyAsWork {
        tab_id: Option<u64>,
        domain: String,
    },
    /// "No" from the distraction prompt.
    RejectDomain {
        tab_id: Option<u64>,
    },
    TabEvent(TabEvent),
    GetSettings,
    UpdateSettings {
        settings: TimerSettings,
    },
    SetGating {
        extension_enabled: Option<bool>,
        mode: Option<String>,
    },
    AskStudyQuestion {
        question: String,
    },
    /// Switches the connection into a notification stream.
    Subscribe,
}

impl Request {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::StartSession { .. } => "start-session",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Stop => "stop",
            Self::GetState => "get-state",
            Self::AddWorkDomain { .. } => "add-work-domain",
            Self::RemoveWorkDomain { .. } => "remove-work-domain",
            Self::ClearWorkDomains => "clear-work-domains",
            Self::ListWorkDomains => "list-work-domains",
            Self::ClassifyAsWork { .. } => "classify-as-work",
            Self::RejectDomain { .. } => "reject-domain",
            Self::TabEvent(_) => "tab-event",
            Self::GetSettings => "get-settings",
            Self::UpdateSettings { .. } => "update-settings",
            Self::SetGating { .. } => "set-gating",
            Self::AskStudyQuestion { .. } => "ask-study-question",
            Self::Subscribe => "subscribe",
        }
    }
}

/// Category of a failed request, stable across the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidTransition,
    Storage,
    Validation,
    Chat,
    Protocol,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidTransition => "invalid_transition",
            Self::Storage => "storage",
            Self::Validation => "validation",
            Self::Chat => "chat",
            Self::Protocol => "protocol",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reply to a single request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Response {
    State {
        snapshot: StateSnapshot,
    },
    Domains {
        domains: Vec<String>,
    },
    Gate {
        decision: GateDecision,
    },
    Settings {
        settings: TimerSettings,
        gating: GatingConfig,
    },
    Answer {
        text: String,
    },
    Ack,
    Error {
        kind: ErrorKind,
        message: String,
    },
}

impl Response {
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Error {
            kind,
            message: message.into(),
        }
    }
}

/// Outbound notifications to open surfaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum Notification {
    StateChanged {
        snapshot: StateSnapshot,
    },
    ShowDistractionPrompt {
        tab_id: u64,
        domain: String,
    },
    OpenCompletionView {
        phase: Phase,
        message: String,
    },
    CloseTab {
        tab_id: Option<u64>,
    },
    DismissPrompt {
        tab_id: Option<u64>,
    },
    DomainsChanged {
        domains: Vec<String>,
    },
}

impl Notification {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::StateChanged { .. } => "state-changed",
            Self::ShowDistractionPrompt { .. } => "show-distraction-prompt",
            Self::OpenCompletionView { .. } => "open-completion-view",
            Self::CloseTab { .. } => "close-tab",
            Self::DismissPrompt { .. } => "dismiss-prompt",
            Self::DomainsChanged { .. } => "domains-changed",
        }
    }

    /// Notifications that need a user-visible surface, as opposed to repaint
    /// hints that can be dropped when nobody is listening.
    pub const fn requires_delivery(&self) -> bool {
        matches!(
            self,
            Self::ShowDistractionPrompt { .. } | Self::OpenCompletionView { .. } | Self::CloseTab { .. }
        )
    }
}

/// Everything a surface needs to render the timer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub state: SessionState,
    /// Current phase, or the phase a new session would start in.
    pub phase: Phase,
    pub session: Option<SessionRecord>,
    pub countdown: Option<Countdown>,
    pub progress: f64,
    pub settings: TimerSettings,
    pub gating: GatingConfig,
    pub observed_at: DateTime<Utc>,
}

impl StateSnapshot {
    pub fn build(
        session: Option<SessionRecord>,
        settings: TimerSettings,
        gating: GatingConfig,
        now: DateTime<Utc>,
    ) -> Self {
        let state = SessionState::of(session.as_ref());
        Self {
            state,
            phase: state.phase().unwrap_or_default(),
            countdown: session.as_ref().map(|record| countdown(record, now)),
            progress: session.as_ref().map_or(0.0, |record| progress(record, now)),
            session,
            settings,
            gating,
            observed_at: now,
        }
    }

    /// Re-derives the countdown at `now` from the carried record, so a view
    /// can repaint between notifications without holding its own timer state.
    pub fn countdown_at(&self, now: DateTime<Utc>) -> Option<Countdown> {
        self.session.as_ref().map(|record| countdown(record, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_use_action_tags() {
        let request: Request =
            serde_json::from_str(r#"{"action":"start-session","duration_seconds":5}"#).unwrap();
        assert_eq!(
            request,
            Request::StartSession {
                phase: None,
                duration_seconds: Some(5)
            }
        );

        let request: Request = serde_json::from_str(r#"{"action":"pause"}"#).unwrap();
        assert_eq!(request, Request::Pause);
    }

    #[test]
    fn tab_event_fields_are_inlined() {
        let request: Request = serde_json::from_str(
            r#"{"action":"tab-event","tab_id":7,"url":"https://reddit.com","kind":"completed","active":false}"#,
        )
        .unwrap();
        let Request::TabEvent(event) = request else {
            panic!("expected tab event");
        };
        assert_eq!(event.tab_id, 7);
        assert!(!event.is_gateable());
    }

    #[test]
    fn unknown_action_is_rejected() {
        assert!(serde_json::from_str::<Request>(r#"{"action":"self-destruct"}"#).is_err());
    }

    #[test]
    fn notification_serializes_with_event_tag() {
        let json = serde_json::to_string(&Notification::ShowDistractionPrompt {
            tab_id: 3,
            domain: "reddit.com".to_string(),
        })
        .unwrap();
        assert_eq!(
            json,
            r#"{"event":"show-distraction-prompt","tab_id":3,"domain":"reddit.com"}"#
        );
    }

    #[test]
    fn snapshot_without_session_is_idle_work() {
        let now = DateTime::from_timestamp(1_750_000_000, 0).unwrap();
        let snapshot =
            StateSnapshot::build(None, TimerSettings::default(), GatingConfig::default(), now);
        assert_eq!(snapshot.state, SessionState::Idle);
        assert_eq!(snapshot.phase, Phase::Work);
        assert!(snapshot.countdown.is_none());
        assert!(snapshot.countdown_at(now).is_none());
    }

    #[test]
    fn completion_message_is_stable_per_session() {
        let started = DateTime::from_timestamp(1_750_000_003, 0).unwrap();
        let first = completion_message(Phase::Work, started);
        assert_eq!(first, completion_message(Phase::Work, started));
        assert!(WORK_COMPLETE_MESSAGES.contains(&first));
        assert!(REST_COMPLETE_MESSAGES.contains(&completion_message(Phase::Rest, started)));
    }
}
