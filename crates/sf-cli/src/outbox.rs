//! Fallback delivery for notifications no surface was open to receive.
//!
//! The daemon appends undelivered prompts and completion views to a JSONL
//! file; `sf watch` drains it on startup. Both sides take an exclusive lock
//! on the file so a drain never races an append.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use sf_core::Notification;

/// One undelivered notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub recorded_at: DateTime<Utc>,
    pub notification: Notification,
}

/// Handle to the outbox file.
#[derive(Debug, Clone)]
pub struct Outbox {
    path: PathBuf,
}

impl Outbox {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_locked(&self) -> Result<File> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("failed to create outbox directory")?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        file.lock_exclusive().context("failed to lock outbox")?;
        Ok(file)
    }

    /// Appends a notification.
    pub fn append(&self, notification: &Notification, now: DateTime<Utc>) -> Result<()> {
        let entry = OutboxEntry {
            recorded_at: now,
            notification: notification.clone(),
        };
        let json = serde_json::to_string(&entry).context("failed to serialize outbox entry")?;
        let mut file = self.open_locked()?;
        writeln!(file, "{json}").context("failed to write outbox entry")?;
        tracing::debug!(kind = notification.kind(), path = %self.path.display(), "notification queued in outbox");
        Ok(())
    }

    /// Returns all queued entries, oldest first, and empties the file.
    pub fn drain(&self) -> Result<Vec<OutboxEntry>> {
        let mut file = self.open_locked()?;
        file.seek(SeekFrom::Start(0))?;
        let mut content = String::new();
        file.read_to_string(&mut content)
            .context("failed to read outbox")?;
        file.set_len(0).context("failed to truncate outbox")?;

        let mut entries = Vec::new();
        for line in content.lines().filter(|line| !line.trim().is_empty()) {
            match serde_json::from_str::<OutboxEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(err) => tracing::warn!(%err, "skipping unreadable outbox entry"),
            }
        }
        Ok(entries)
    }
}
