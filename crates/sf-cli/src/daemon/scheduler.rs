//! One-shot wake timer backed by a tokio task.
//!
//! [`WakeHandle`] is what the authority arms and cancels. [`WakeTimer`] runs
//! on the runtime, sleeps until the armed instant and reports each firing on
//! a channel. Sleeping uses the monotonic clock, which may stall while the
//! machine is suspended; the periodic poll covers that gap.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sf_core::{SchedulingFailure, WakeScheduler};
use tokio::sync::{mpsc, watch};

/// Creates a connected handle/timer pair.
pub fn wake_channel() -> (WakeHandle, WakeTimer) {
    let (tx, rx) = watch::channel(None);
    (WakeHandle { tx }, WakeTimer { rx })
}

/// Arms and cancels the wake. Arming replaces the previous target.
#[derive(Debug)]
pub struct WakeHandle {
    tx: watch::Sender<Option<DateTime<Utc>>>,
}

impl WakeScheduler for WakeHandle {
    fn arm(&mut self, at: DateTime<Utc>) -> Result<(), SchedulingFailure> {
        if self.tx.is_closed() {
            return Err(SchedulingFailure {
                at,
                reason: "wake timer is not running".to_string(),
            });
        }
        self.tx.send_replace(Some(at));
        Ok(())
    }

    fn cancel(&mut self) {
        self.tx.send_replace(None);
    }
}

/// The sleeping side of the wake.
#[derive(Debug)]
pub struct WakeTimer {
    rx: watch::Receiver<Option<DateTime<Utc>>>,
}

impl WakeTimer {
    /// The currently armed instant.
    pub fn armed(&self) -> Option<DateTime<Utc>> {
        *self.rx.borrow()
    }

    /// Sleeps until each armed instant and sends it on `fired`.
    ///
    /// A target fires at most once; the next firing needs a new `arm`. Returns
    /// when the handle or the receiving side is dropped.
    pub async fn run(mut self, fired: mpsc::Sender<DateTime<Utc>>) {
        loop {
            let target = *self.rx.borrow_and_update();
            let Some(at) = target else {
                if self.rx.changed().await.is_err() {
                    return;
                }
                continue;
            };
            let delay = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            tokio::select! {
                () = tokio::time::sleep(delay) => {
                    tracing::debug!(%at, "wake fired");
                    if fired.send(at).await.is_err() {
                        return;
                    }
                    if self.rx.changed().await.is_err() {
                        return;
                    }
                }
                changed = self.rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }
    }
}
