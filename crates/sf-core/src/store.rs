//! Seams between the authority and the outside world.
//!
//! The persistent store is the single source of truth. The wake scheduler and
//! notifier are best-effort: their failures are logged by the authority and
//! covered by periodic reconciliation, never treated as fatal.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::WorkDomainSet;
use crate::protocol::Notification;
use crate::session::SessionRecord;
use crate::settings::{GatingConfig, TimerSettings};

/// A store read or write was rejected.
#[derive(Debug, Error)]
#[error("storage failure on {key}: {source}")]
pub struct StoreError {
    pub key: &'static str,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

impl StoreError {
    pub fn new(key: &'static str, source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self {
            key,
            source: source.into(),
        }
    }
}

/// A wake could not be armed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("could not arm wake for {at}: {reason}")]
pub struct SchedulingFailure {
    pub at: DateTime<Utc>,
    pub reason: String,
}

/// A notification could not be shown on any surface.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("could not deliver {kind}: {reason}")]
pub struct DeliveryFailure {
    pub kind: &'static str,
    pub reason: String,
}

/// Durable key-value state shared by every surface.
pub trait StateStore {
    fn current_session(&self) -> Result<Option<SessionRecord>, StoreError>;
    /// Writes the session record; `None` clears it.
    fn set_current_session(&mut self, record: Option<&SessionRecord>) -> Result<(), StoreError>;
    fn timer_settings(&self) -> Result<TimerSettings, StoreError>;
    fn set_timer_settings(&mut self, settings: &TimerSettings) -> Result<(), StoreError>;
    fn work_domains(&self) -> Result<WorkDomainSet, StoreError>;
    fn set_work_domains(&mut self, domains: &WorkDomainSet) -> Result<(), StoreError>;
    fn gating_config(&self) -> Result<GatingConfig, StoreError>;
    fn set_gating_config(&mut self, gating: &GatingConfig) -> Result<(), StoreError>;
}

/// One-shot wake source. Arming replaces any previously armed wake.
pub trait WakeScheduler {
    fn arm(&mut self, at: DateTime<Utc>) -> Result<(), SchedulingFailure>;
    fn cancel(&mut self);
}

/// Outbound channel to the UI surfaces.
pub trait Notifier {
    fn notify(&mut self, notification: Notification) -> Result<(), DeliveryFailure>;
}
