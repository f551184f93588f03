//! Distraction gate.
//!
//! Stateless per call: every decision is made from fresh snapshots of the
//! gating flags, the work-domain set and the session state.

use serde::{Deserialize, Serialize};

use crate::domain::{WorkDomainSet, hostname_from_url, is_restricted_url};
use crate::session::SessionState;
use crate::settings::{GateScope, GatingConfig};

/// Why a tab event produced no prompt without looking at the domain list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    /// Internal browser page.
    RestrictedPage,
    /// URL had no usable hostname.
    UnparseableUrl,
    ExtensionDisabled,
    NormalMode,
    /// Session state is outside the configured gate scope.
    OutsideScope,
    /// Load-complete event for a tab that is not in the foreground.
    InactiveTab,
}

/// Outcome of gating a single tab event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GateDecision {
    Ignored { reason: IgnoreReason },
    /// The domain is on the work list.
    Allowed { domain: String },
    /// The domain is not on the work list; the user must classify it.
    Prompt { domain: String },
}

impl GateDecision {
    pub const fn ignored(reason: IgnoreReason) -> Self {
        Self::Ignored { reason }
    }

    pub const fn is_prompt(&self) -> bool {
        matches!(self, Self::Prompt { .. })
    }
}

/// Classifies the destination of a tab event.
pub fn evaluate(
    url: &str,
    gating: &GatingConfig,
    domains: &WorkDomainSet,
    state: SessionState,
    scope: GateScope,
) -> GateDecision {
    if is_restricted_url(url) {
        return GateDecision::ignored(IgnoreReason::RestrictedPage);
    }
    if !gating.gating_enabled() {
        let reason = if gating.extension_enabled {
            IgnoreReason::NormalMode
        } else {
            IgnoreReason::ExtensionDisabled
        };
        return GateDecision::ignored(reason);
    }
    if !scope.admits(state) {
        return GateDecision::ignored(IgnoreReason::OutsideScope);
    }
    let Some(domain) = hostname_from_url(url) else {
        return GateDecision::ignored(IgnoreReason::UnparseableUrl);
    };
    if domains.contains(&domain) {
        GateDecision::Allowed { domain }
    } else {
        GateDecision::Prompt { domain }
    }
}
