//! The single writer of session state.
//!
//! [`Authority`] owns every transition of the session record:
//!
//! ```text
//! Idle --start--> Running(p) --pause--> Paused(p) --resume--> Running(p)
//! Running(p) --expire--> Running(p.next())      (chained automatically)
//! Running(p) | Paused(p) --stop--> Idle
//! ```
//!
//! It keeps no cached copy of the session. Each operation reads the store,
//! computes the next record, and writes it back before touching the wake
//! scheduler or notifying surfaces. A failed write aborts the operation and
//! is returned to the caller; the stored record stays the ground truth.

use thiserror::Error;

use crate::clock::{Clock, countdown};
use crate::domain::{ValidationError, WorkDomain, WorkDomainSet, normalize_hostname};
use crate::gate::{self, GateDecision, IgnoreReason};
use crate::protocol::{
    ErrorKind, Notification, Request, Response, StateSnapshot, TabEvent, completion_message,
};
use crate::session::{Phase, SessionRecord, SessionState, clamp_duration};
use crate::settings::{GateScope, GatingConfig, Mode, TimerSettings};
use crate::store::{Notifier, StateStore, StoreError, WakeScheduler};

/// Authority operation errors.
#[derive(Debug, Error)]
pub enum AuthorityError {
    /// The operation is not valid in the current session state.
    #[error("cannot {operation} while {state}")]
    InvalidTransition {
        operation: &'static str,
        state: SessionState,
    },
    #[error(transparent)]
    Storage(#[from] StoreError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl AuthorityError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::Storage(_) => ErrorKind::Storage,
            Self::Validation(_) => ErrorKind::Validation,
        }
    }
}

/// Result of attempting to expire a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpireOutcome {
    /// The phase completed and the next phase was started.
    Chained {
        completed: Phase,
        next: SessionRecord,
    },
    /// Nothing to do: no record, a different record, paused, or not yet due.
    Stale,
}

/// What startup reconciliation found in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootReport {
    Idle,
    /// A running session was found and its wake re-armed.
    Rearmed { record: SessionRecord },
    /// A paused session was found; no wake is armed until resume.
    Paused { record: SessionRecord },
    /// The stored session was overdue and has been expired.
    Expired(ExpireOutcome),
}

/// Single state holder for the timer, the gate and the domain list.
pub struct Authority<S, W, N, C> {
    store: S,
    scheduler: W,
    notifier: N,
    clock: C,
    scope: GateScope,
    booted: bool,
}

impl<S, W, N, C> Authority<S, W, N, C>
where
    S: StateStore,
    W: WakeScheduler,
    N: Notifier,
    C: Clock,
{
    /// Creates an authority. Session operations reconcile with the store
    /// first if [`Authority::boot`] has not yet succeeded.
    pub fn new(store: S, scheduler: W, notifier: N, clock: C, scope: GateScope) -> Self {
        Self {
            store,
            scheduler,
            notifier,
            clock,
            scope,
            booted: false,
        }
    }

    /// Reconciles the stored session against the current time.
    ///
    /// An overdue running session is expired right here, before any other
    /// session operation is accepted, instead of waiting for a wake that
    /// should already have fired.
    pub fn boot(&mut self) -> Result<BootReport, AuthorityError> {
        let now = self.clock.now();
        let report = match self.store.current_session()? {
            None => {
                self.scheduler.cancel();
                BootReport::Idle
            }
            Some(record) if record.paused => {
                self.scheduler.cancel();
                BootReport::Paused { record }
            }
            Some(record) if countdown(&record, now).is_expired => {
                tracing::info!(phase = %record.phase, end_time = %record.end_time, "stored session overdue at boot");
                BootReport::Expired(self.complete(&record)?)
            }
            Some(record) => {
                self.arm(&record);
                BootReport::Rearmed { record }
            }
        };
        self.booted = true;
        tracing::debug!(?report, "reconciled session state");
        Ok(report)
    }

    fn ensure_booted(&mut self) -> Result<(), AuthorityError> {
        if !self.booted {
            self.boot()?;
        }
        Ok(())
    }

    pub const fn scope(&self) -> GateScope {
        self.scope
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    pub const fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub const fn scheduler(&self) -> &W {
        &self.scheduler
    }

    pub const fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Consumes the authority, handing back its store.
    pub fn into_store(self) -> S {
        self.store
    }

    // ── Session operations ──────────────────────────────────────────

    /// Starts a phase, replacing any existing session.
    ///
    /// `requested_seconds` defaults to the configured duration for the phase
    /// and is clamped to the minimum floor either way.
    pub fn start(
        &mut self,
        phase: Phase,
        requested_seconds: Option<u64>,
    ) -> Result<SessionRecord, AuthorityError> {
        self.ensure_booted()?;
        self.begin(phase, requested_seconds)
    }

    fn begin(
        &mut self,
        phase: Phase,
        requested_seconds: Option<u64>,
    ) -> Result<SessionRecord, AuthorityError> {
        let record = self.write_start(phase, requested_seconds)?;
        self.arm(&record);
        self.broadcast_state();
        Ok(record)
    }

    /// Persists a fresh record for `phase` without arming or announcing it.
    fn write_start(
        &mut self,
        phase: Phase,
        requested_seconds: Option<u64>,
    ) -> Result<SessionRecord, AuthorityError> {
        let settings = self.store.timer_settings()?;
        let duration = clamp_duration(requested_seconds.unwrap_or_else(|| settings.duration_for(phase)));
        let record = SessionRecord::begin(phase, duration, self.clock.now());
        self.store.set_current_session(Some(&record))?;
        tracing::info!(%phase, duration_seconds = duration, "session started");
        Ok(record)
    }

    /// Pauses the running session. The wake is cancelled and re-armed on
    /// resume at the shifted end time.
    pub fn pause(&mut self) -> Result<SessionRecord, AuthorityError> {
        self.ensure_booted()?;
        self.poll()?;
        let current = self.store.current_session()?;
        let Some(record) = current.as_ref().filter(|record| !record.paused) else {
            return Err(AuthorityError::InvalidTransition {
                operation: "pause",
                state: SessionState::of(current.as_ref()),
            });
        };
        let paused = record
            .pause(self.clock.now())
            .map_err(|_| AuthorityError::InvalidTransition {
                operation: "pause",
                state: SessionState::of(Some(record)),
            })?;
        self.store.set_current_session(Some(&paused))?;
        self.scheduler.cancel();
        tracing::info!(phase = %paused.phase, "session paused");
        self.broadcast_state();
        Ok(paused)
    }

    /// Resumes a paused session, preserving its remaining time exactly.
    pub fn resume(&mut self) -> Result<SessionRecord, AuthorityError> {
        self.ensure_booted()?;
        let current = self.store.current_session()?;
        let Some(record) = current.as_ref().filter(|record| record.paused) else {
            return Err(AuthorityError::InvalidTransition {
                operation: "resume",
                state: SessionState::of(current.as_ref()),
            });
        };
        let resumed = record
            .resume(self.clock.now())
            .map_err(|_| AuthorityError::InvalidTransition {
                operation: "resume",
                state: SessionState::of(Some(record)),
            })?;
        self.store.set_current_session(Some(&resumed))?;
        self.arm(&resumed);
        tracing::info!(phase = %resumed.phase, end_time = %resumed.end_time, "session resumed");
        self.broadcast_state();
        Ok(resumed)
    }

    /// Ends the alternating cycle and clears the session.
    pub fn stop(&mut self) -> Result<(), AuthorityError> {
        self.ensure_booted()?;
        if self.store.current_session()?.is_none() {
            return Err(AuthorityError::InvalidTransition {
                operation: "stop",
                state: SessionState::Idle,
            });
        }
        self.scheduler.cancel();
        self.store.set_current_session(None)?;
        tracing::info!("session stopped");
        self.broadcast_state();
        Ok(())
    }

    /// Expires the session that started at `expected_start`.
    ///
    /// Safe to call repeatedly: once the session has been chained, the stored
    /// record has a different start time and later calls are stale no-ops.
    pub fn expire(
        &mut self,
        expected_start: chrono::DateTime<chrono::Utc>,
    ) -> Result<ExpireOutcome, AuthorityError> {
        self.ensure_booted()?;
        let Some(record) = self.store.current_session()? else {
            tracing::debug!("expire with no active session");
            return Ok(ExpireOutcome::Stale);
        };
        if record.start_time != expected_start
            || record.paused
            || !countdown(&record, self.clock.now()).is_expired
        {
            tracing::debug!(%expected_start, stored_start = %record.start_time, "stale expire ignored");
            return Ok(ExpireOutcome::Stale);
        }
        self.complete(&record)
    }

    /// Handles a fired wake. The wake may be arbitrarily late or early.
    pub fn on_wake(&mut self) -> Result<Option<ExpireOutcome>, AuthorityError> {
        self.ensure_booted()?;
        self.catch_up(true)
    }

    /// Periodic reconciliation: expires an overdue session if the wake was
    /// lost. Does not touch the armed wake otherwise.
    pub fn poll(&mut self) -> Result<Option<ExpireOutcome>, AuthorityError> {
        self.ensure_booted()?;
        self.catch_up(false)
    }

    fn catch_up(&mut self, rearm: bool) -> Result<Option<ExpireOutcome>, AuthorityError> {
        let Some(record) = self.store.current_session()? else {
            return Ok(None);
        };
        if record.paused {
            return Ok(None);
        }
        if countdown(&record, self.clock.now()).is_expired {
            return self.expire(record.start_time).map(Some);
        }
        if rearm {
            tracing::debug!(end_time = %record.end_time, "early wake, re-arming");
            self.arm(&record);
        }
        Ok(None)
    }

    /// Chains into the next phase, then announces the finished one.
    ///
    /// The completion view is only opened once the next record is stored, so
    /// a failed write leaves the expired record in place to be retried
    /// without a completion having been shown for it.
    fn complete(&mut self, record: &SessionRecord) -> Result<ExpireOutcome, AuthorityError> {
        let completed = record.phase;
        let next = self.write_start(completed.next(), None)?;
        tracing::info!(%completed, "phase complete");
        let notification = Notification::OpenCompletionView {
            phase: completed,
            message: completion_message(completed, record.start_time).to_string(),
        };
        if let Err(err) = self.notifier.notify(notification) {
            tracing::warn!(%err, "completion view not shown");
        }
        self.arm(&next);
        self.broadcast_state();
        Ok(ExpireOutcome::Chained { completed, next })
    }

    fn arm(&mut self, record: &SessionRecord) {
        match self.scheduler.arm(record.end_time) {
            Ok(()) => tracing::debug!(at = %record.end_time, "wake armed"),
            Err(err) => tracing::warn!(%err, "wake not armed, relying on periodic reconciliation"),
        }
    }

    /// Current state, after expiring an overdue session.
    pub fn snapshot(&mut self) -> Result<StateSnapshot, AuthorityError> {
        self.poll()?;
        self.read_snapshot()
    }

    fn read_snapshot(&self) -> Result<StateSnapshot, AuthorityError> {
        Ok(StateSnapshot::build(
            self.store.current_session()?,
            self.store.timer_settings()?,
            self.store.gating_config()?,
            self.clock.now(),
        ))
    }

    fn broadcast_state(&mut self) {
        let snapshot = match self.read_snapshot() {
            Ok(snapshot) => snapshot,
            Err(err) => {
                tracing::warn!(%err, "state snapshot unavailable for broadcast");
                return;
            }
        };
        self.broadcast(Notification::StateChanged { snapshot });
    }

    fn broadcast(&mut self, notification: Notification) {
        let kind = notification.kind();
        if let Err(err) = self.notifier.notify(notification) {
            tracing::debug!(kind, %err, "notification not delivered");
        }
    }

    /// Picks up a session, settings or gating write made by another process.
    ///
    /// Reconciles again so the wake follows whatever session is now stored,
    /// then announces the new state.
    pub fn reload_session(&mut self) -> Result<BootReport, AuthorityError> {
        let report = self.boot()?;
        // An expiry already announced the chained session.
        if !matches!(report, BootReport::Expired(_)) {
            self.broadcast_state();
        }
        Ok(report)
    }

    /// Announces a domain list written by another process.
    pub fn reload_domains(&mut self) -> Result<(), AuthorityError> {
        let domains = self.store.work_domains()?.to_vec();
        self.broadcast(Notification::DomainsChanged { domains });
        Ok(())
    }

    // ── Settings ────────────────────────────────────────────────────

    pub fn settings(&self) -> Result<(TimerSettings, GatingConfig), AuthorityError> {
        Ok((self.store.timer_settings()?, self.store.gating_config()?))
    }

    /// Stores new timer settings, clamped. The running session keeps its
    /// duration; the new values apply from the next phase.
    pub fn update_settings(&mut self, settings: TimerSettings) -> Result<TimerSettings, AuthorityError> {
        let settings = settings.clamped();
        self.store.set_timer_settings(&settings)?;
        self.broadcast_state();
        Ok(settings)
    }

    pub fn set_gating(
        &mut self,
        extension_enabled: Option<bool>,
        mode: Option<&str>,
    ) -> Result<GatingConfig, AuthorityError> {
        let mut gating = self.store.gating_config()?;
        if let Some(enabled) = extension_enabled {
            gating.extension_enabled = enabled;
        }
        if let Some(mode) = mode {
            gating.mode = Mode::new(mode);
        }
        self.store.set_gating_config(&gating)?;
        tracing::info!(enabled = gating.extension_enabled, mode = %gating.mode, "gating updated");
        self.broadcast_state();
        Ok(gating)
    }

    // ── Work domains ────────────────────────────────────────────────

    pub fn work_domains(&self) -> Result<Vec<String>, AuthorityError> {
        Ok(self.store.work_domains()?.to_vec())
    }

    pub fn add_work_domain(&mut self, input: &str) -> Result<Vec<String>, AuthorityError> {
        let domain = WorkDomain::parse(input)?;
        let mut domains = self.store.work_domains()?;
        if domains.insert(domain) {
            self.save_domains(&domains)?;
        }
        Ok(domains.to_vec())
    }

    pub fn remove_work_domain(&mut self, input: &str) -> Result<Vec<String>, AuthorityError> {
        let host = WorkDomain::parse(input)
            .map(String::from)
            .unwrap_or_else(|_| normalize_hostname(input));
        let mut domains = self.store.work_domains()?;
        if domains.remove(&host) {
            self.save_domains(&domains)?;
        }
        Ok(domains.to_vec())
    }

    pub fn clear_work_domains(&mut self) -> Result<(), AuthorityError> {
        self.save_domains(&WorkDomainSet::new())
    }

    fn save_domains(&mut self, domains: &WorkDomainSet) -> Result<(), AuthorityError> {
        self.store.set_work_domains(domains)?;
        tracing::info!(count = domains.len(), "work domains updated");
        self.broadcast(Notification::DomainsChanged {
            domains: domains.to_vec(),
        });
        Ok(())
    }

    /// The user answered "yes, it's work" on a distraction prompt.
    pub fn classify_as_work(
        &mut self,
        tab_id: Option<u64>,
        input: &str,
    ) -> Result<Vec<String>, AuthorityError> {
        let domains = self.add_work_domain(input)?;
        self.broadcast(Notification::DismissPrompt { tab_id });
        Ok(domains)
    }

    /// The user answered "no" on a distraction prompt: leave the tab.
    pub fn reject_domain(&mut self, tab_id: Option<u64>) {
        if let Err(err) = self.notifier.notify(Notification::CloseTab { tab_id }) {
            tracing::warn!(%err, ?tab_id, "close-tab request not delivered");
        }
    }

    // ── Gate ────────────────────────────────────────────────────────

    /// Gates a tab event and prompts the tab if its domain is not work.
    ///
    /// Every read is fresh. A failure here only affects this event.
    pub fn tab_event(&mut self, event: &TabEvent) -> Result<GateDecision, AuthorityError> {
        if !event.is_gateable() {
            return Ok(GateDecision::ignored(IgnoreReason::InactiveTab));
        }
        let gating = self.store.gating_config()?;
        let domains = self.store.work_domains()?;
        let state = SessionState::of(self.store.current_session()?.as_ref());
        let decision = gate::evaluate(&event.url, &gating, &domains, state, self.scope);
        if let GateDecision::Prompt { domain } = &decision {
            tracing::info!(tab_id = event.tab_id, %domain, "distraction prompt");
            let prompt = Notification::ShowDistractionPrompt {
                tab_id: event.tab_id,
                domain: domain.clone(),
            };
            if let Err(err) = self.notifier.notify(prompt) {
                tracing::warn!(%err, tab_id = event.tab_id, "distraction prompt skipped");
            }
        }
        Ok(decision)
    }

    // ── Dispatch ────────────────────────────────────────────────────

    /// Maps a request onto exactly one operation.
    ///
    /// `ask-study-question` and `subscribe` belong to the transport layer and
    /// are answered with a protocol error here.
    pub fn handle(&mut self, request: &Request) -> Response {
        let name = request.name();
        let result = match request {
            Request::StartSession {
                phase,
                duration_seconds,
            } => self
                .start(phase.unwrap_or_default(), *duration_seconds)
                .and_then(|_| self.read_snapshot())
                .map(|snapshot| Response::State { snapshot }),
            Request::Pause => self
                .pause()
                .and_then(|_| self.read_snapshot())
                .map(|snapshot| Response::State { snapshot }),
            Request::Resume => self
                .resume()
                .and_then(|_| self.read_snapshot())
                .map(|snapshot| Response::State { snapshot }),
            Request::Stop => self
                .stop()
                .and_then(|()| self.read_snapshot())
                .map(|snapshot| Response::State { snapshot }),
            Request::GetState => self.snapshot().map(|snapshot| Response::State { snapshot }),
            Request::AddWorkDomain { domain } => self
                .add_work_domain(domain)
                .map(|domains| Response::Domains { domains }),
            Request::RemoveWorkDomain { domain } => self
                .remove_work_domain(domain)
                .map(|domains| Response::Domains { domains }),
            Request::ClearWorkDomains => self.clear_work_domains().map(|()| Response::Domains {
                domains: Vec::new(),
            }),
            Request::ListWorkDomains => self
                .work_domains()
                .map(|domains| Response::Domains { domains }),
            Request::ClassifyAsWork { tab_id, domain } => self
                .classify_as_work(*tab_id, domain)
                .map(|domains| Response::Domains { domains }),
            Request::RejectDomain { tab_id } => {
                self.reject_domain(*tab_id);
                Ok(Response::Ack)
            }
            Request::TabEvent(event) => self
                .tab_event(event)
                .map(|decision| Response::Gate { decision }),
            Request::GetSettings => self
                .settings()
                .map(|(settings, gating)| Response::Settings { settings, gating }),
            Request::UpdateSettings { settings } => self
                .update_settings(*settings)
                .and_then(|_| self.settings())
                .map(|(settings, gating)| Response::Settings { settings, gating }),
            Request::SetGating {
                extension_enabled,
                mode,
            } => self
                .set_gating(*extension_enabled, mode.as_deref())
                .and_then(|_| self.settings())
                .map(|(settings, gating)| Response::Settings { settings, gating }),
            Request::AskStudyQuestion { .. } | Request::Subscribe => {
                return Response::error(
                    ErrorKind::Protocol,
                    format!("{name} is not a session operation"),
                );
            }
        };
        result.unwrap_or_else(|err| {
            if matches!(err, AuthorityError::Storage(_)) {
                tracing::error!(request = name, %err, "request failed");
            } else {
                tracing::debug!(request = name, %err, "request rejected");
            }
            Response::error(err.kind(), err.to_string())
        })
    }
}
