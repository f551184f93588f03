//! Status command for showing the current session.
//!
//! Asks the daemon when one is running. Otherwise reads the shared store
//! directly, without reconciling, so an overdue session shows as expired
//! until the daemon starts and completes it.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::Utc;
use sf_core::{Request, StateSnapshot};
use sf_db::Database;

use super::util::{expect_state, render_snapshot};
use crate::Config;
use crate::client::DaemonClient;

pub fn run<W: Write>(writer: &mut W, config: &Config, json: bool) -> Result<()> {
    let (snapshot, live) = match DaemonClient::connect(&config.socket_path) {
        Ok(mut daemon) => (expect_state(daemon.call(&Request::GetState)?)?, true),
        Err(err) => {
            tracing::debug!(%err, "daemon unreachable, reading store");
            (read_stored(config)?, false)
        }
    };

    if json {
        serde_json::to_writer_pretty(&mut *writer, &snapshot)?;
        writeln!(writer)?;
        return Ok(());
    }

    render_snapshot(writer, &snapshot, snapshot.observed_at)?;
    if !live {
        writeln!(writer, "Daemon: not running (start it with `sf daemon`)")?;
        if snapshot.countdown.is_some_and(|countdown| countdown.is_expired) {
            writeln!(writer, "The session has ended; it completes when the daemon starts.")?;
        }
    }
    Ok(())
}

/// Builds a snapshot straight from the store.
pub fn read_stored(config: &Config) -> Result<StateSnapshot> {
    let db = open_existing(config)?;
    Ok(StateSnapshot::build(
        db.current_session()?,
        db.timer_settings()?,
        db.gating_config()?,
        Utc::now(),
    ))
}

/// Opens the store, or an empty in-memory one if it was never created.
pub fn open_existing(config: &Config) -> Result<Database> {
    let db = if config.database_path.exists() {
        Database::open(&config.database_path)
            .with_context(|| format!("failed to open {}", config.database_path.display()))?
    } else {
        Database::open_in_memory()?
    };
    Ok(db)
}
