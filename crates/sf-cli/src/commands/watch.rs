//! Terminal surface: follows the timer and prints prompts as they arrive.
//!
//! Subscribes first, then drains the outbox, so a prompt raised in between
//! arrives on one path or the other. The countdown is repainted locally from
//! the last snapshot; the daemon only sends a new one when state changes.

use std::io::{self, Write};
use std::time::Duration;

use anyhow::{Result, bail};
use chrono::{DateTime, Local, Utc};
use sf_core::{Notification, Request, Response, SessionState, StateSnapshot, format_clock};

use super::util::{describe_notification, expect_state};
use crate::Config;
use crate::client::{self, Incoming, ServerMessage};
use crate::outbox::{Outbox, OutboxEntry};

const REPAINT_INTERVAL: Duration = Duration::from_secs(1);

pub fn run<W: Write>(writer: &mut W, config: &Config) -> Result<()> {
    let mut daemon = client::connect(&config.socket_path)?;
    match daemon.call(&Request::Subscribe)? {
        Response::Ack => {}
        other => bail!("unexpected reply from daemon: {other:?}"),
    }
    let snapshot = expect_state(daemon.call(&Request::GetState)?)?;
    let mut watcher = Watcher::new(snapshot);

    for entry in Outbox::new(&config.outbox_path).drain()? {
        watcher.missed(writer, &entry)?;
    }

    daemon.set_read_timeout(Some(REPAINT_INTERVAL))?;
    loop {
        watcher.repaint(writer, Utc::now())?;
        match daemon.read_message()? {
            Incoming::Message(ServerMessage::Notification(notification)) => {
                watcher.notify(writer, notification)?;
            }
            Incoming::Message(ServerMessage::Response(response)) => {
                tracing::debug!(?response, "ignoring unsolicited reply");
            }
            Incoming::Idle => {}
            Incoming::Closed => {
                watcher.print(writer, "Daemon stopped.")?;
                return Ok(());
            }
        }
    }
}

/// Rendering state for one watch session.
struct Watcher {
    snapshot: StateSnapshot,
    /// The status line currently on screen, without a trailing newline.
    status_line: Option<String>,
}

impl Watcher {
    const fn new(snapshot: StateSnapshot) -> Self {
        Self {
            snapshot,
            status_line: None,
        }
    }

    /// Redraws the status line if its text changed.
    fn repaint<W: Write>(&mut self, writer: &mut W, now: DateTime<Utc>) -> io::Result<()> {
        let line = status_line(&self.snapshot, now);
        if self.status_line.as_deref() == Some(line.as_str()) {
            return Ok(());
        }
        write!(writer, "\r{line:<32}")?;
        writer.flush()?;
        self.status_line = Some(line);
        Ok(())
    }

    fn notify<W: Write>(&mut self, writer: &mut W, notification: Notification) -> io::Result<()> {
        let ring = matches!(notification, Notification::OpenCompletionView { .. })
            && self.snapshot.settings.notifications_enabled;
        if ring {
            write!(writer, "\x07")?;
        }
        if let Some(text) = describe_notification(&notification) {
            self.print(writer, &text)?;
        }
        if let Notification::StateChanged { snapshot } = notification {
            self.snapshot = snapshot;
        }
        Ok(())
    }

    fn missed<W: Write>(&mut self, writer: &mut W, entry: &OutboxEntry) -> io::Result<()> {
        if let Some(text) = describe_notification(&entry.notification) {
            let at = entry.recorded_at.with_timezone(&Local).format("%H:%M");
            self.print(writer, &format!("[missed at {at}] {text}"))?;
        }
        Ok(())
    }

    /// Prints a message on its own line below the status line.
    fn print<W: Write>(&mut self, writer: &mut W, text: &str) -> io::Result<()> {
        if self.status_line.take().is_some() {
            writeln!(writer)?;
        }
        writeln!(writer, "{text}")
    }
}

fn status_line(snapshot: &StateSnapshot, now: DateTime<Utc>) -> String {
    match (snapshot.state, snapshot.countdown_at(now)) {
        (SessionState::Idle, _) | (_, None) => "idle".to_string(),
        (state, Some(countdown)) => {
            format!("{state} {}", format_clock(countdown.time_remaining_seconds))
        }
    }
}
