//! Shared rendering and reply helpers for CLI commands.

use std::io::{self, Write};

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use sf_core::{GatingConfig, Notification, Response, StateSnapshot, TimerSettings, format_clock, progress};

/// Renders the timer the way every command prints it.
pub fn render_snapshot<W: Write>(
    writer: &mut W,
    snapshot: &StateSnapshot,
    now: DateTime<Utc>,
) -> io::Result<()> {
    writeln!(writer, "State: {}", snapshot.state)?;
    match (&snapshot.session, snapshot.countdown_at(now)) {
        (Some(record), Some(countdown)) => {
            writeln!(
                writer,
                "Remaining: {}",
                format_clock(countdown.time_remaining_seconds)
            )?;
            writeln!(writer, "Progress: {:.0}%", progress(record, now) * 100.0)?;
        }
        _ => {
            let next = snapshot.phase;
            writeln!(
                writer,
                "Next: {next} ({})",
                format_clock(snapshot.settings.duration_for(next))
            )?;
        }
    }
    writeln!(writer, "Gating: {}", gating_label(&snapshot.gating))
}

pub fn render_settings<W: Write>(
    writer: &mut W,
    settings: &TimerSettings,
    gating: &GatingConfig,
) -> io::Result<()> {
    writeln!(writer, "Work: {}", format_clock(settings.work_duration_seconds))?;
    writeln!(writer, "Rest: {}", format_clock(settings.rest_duration_seconds))?;
    writeln!(
        writer,
        "Notifications: {}",
        if settings.notifications_enabled { "on" } else { "off" }
    )?;
    writeln!(writer, "Gating: {}", gating_label(gating))
}

pub fn render_domains<W: Write>(writer: &mut W, domains: &[String]) -> io::Result<()> {
    if domains.is_empty() {
        return writeln!(writer, "No work domains.");
    }
    for domain in domains {
        writeln!(writer, "- {domain}")?;
    }
    Ok(())
}

fn gating_label(gating: &GatingConfig) -> String {
    if !gating.extension_enabled {
        "off".to_string()
    } else if gating.mode.is_normal() {
        "off (normal mode)".to_string()
    } else {
        format!("on ({} mode)", gating.mode)
    }
}

/// One line describing a notification for the terminal, or `None` for
/// repaint hints.
pub fn describe_notification(notification: &Notification) -> Option<String> {
    match notification {
        Notification::StateChanged { .. } => None,
        Notification::ShowDistractionPrompt { tab_id, domain } => Some(format!(
            "Is {domain} part of your work? Answer with `sf classify work {domain} --tab-id {tab_id}` \
             or `sf classify reject --tab-id {tab_id}`"
        )),
        Notification::OpenCompletionView { phase, message } => {
            Some(format!("{phase} session complete! {message}"))
        }
        Notification::CloseTab { tab_id: Some(tab_id) } => Some(format!("Closing tab {tab_id}")),
        Notification::CloseTab { tab_id: None } => Some("Closing the distracting tab".to_string()),
        Notification::DismissPrompt { .. } => Some("Prompt dismissed".to_string()),
        Notification::DomainsChanged { domains } => {
            Some(format!("Work domains: {}", domains.join(", ")))
        }
    }
}

pub fn expect_state(response: Response) -> Result<StateSnapshot> {
    match response {
        Response::State { snapshot } => Ok(snapshot),
        other => bail!("unexpected reply from daemon: {other:?}"),
    }
}

pub fn expect_domains(response: Response) -> Result<Vec<String>> {
    match response {
        Response::Domains { domains } => Ok(domains),
        other => bail!("unexpected reply from daemon: {other:?}"),
    }
}

pub fn expect_settings(response: Response) -> Result<(TimerSettings, GatingConfig)> {
    match response {
        Response::Settings { settings, gating } => Ok((settings, gating)),
        other => bail!("unexpected reply from daemon: {other:?}"),
    }
}
