//! Core domain logic for studyfocus.
//!
//! This crate contains the fundamental types and logic for:
//! - Sessions: the durable work/rest record and its pause/resume rules
//! - Clock: remaining time derived purely from wall-clock timestamps
//! - Gating: deciding whether a tab needs a distraction prompt
//! - Authority: the single writer that drives phase transitions
//! - Protocol: typed requests, responses and notifications between surfaces

pub mod authority;
pub mod clock;
pub mod domain;
pub mod gate;
pub mod protocol;
pub mod session;
pub mod settings;
pub mod store;

pub use authority::{Authority, AuthorityError, BootReport, ExpireOutcome};
pub use clock::{Clock, Countdown, SystemClock, countdown, format_clock, progress};
pub use domain::{
    ValidationError, WorkDomain, WorkDomainSet, hostname_from_url, is_restricted_url,
    normalize_hostname,
};
pub use gate::{GateDecision, IgnoreReason};
pub use protocol::{
    ErrorKind, Notification, Request, Response, StateSnapshot, TabEvent, TabEventKind,
    completion_message,
};
pub use session::{
    MAX_DURATION_SECONDS, MIN_DURATION_SECONDS, Phase, SessionRecord, SessionState, clamp_duration,
};
pub use settings::{GateScope, GatingConfig, Mode, TimerSettings};
pub use store::{DeliveryFailure, Notifier, SchedulingFailure, StateStore, StoreError, WakeScheduler};
