//! Fan-out of authority notifications to subscribed connections.

use chrono::Utc;
use sf_core::{DeliveryFailure, Notification, Notifier};
use tokio::sync::broadcast;

use crate::outbox::Outbox;

/// Broadcasts to every subscriber; falls back to the outbox for
/// notifications the user must see when nobody is subscribed.
#[derive(Debug)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<Notification>,
    outbox: Outbox,
}

impl BroadcastNotifier {
    pub const fn new(tx: broadcast::Sender<Notification>, outbox: Outbox) -> Self {
        Self { tx, outbox }
    }

    fn fallback(&self, notification: &Notification) -> Result<(), DeliveryFailure> {
        if !notification.requires_delivery() {
            return Ok(());
        }
        self.outbox
            .append(notification, Utc::now())
            .map_err(|err| DeliveryFailure {
                kind: notification.kind(),
                reason: format!("{err:#}"),
            })
    }
}

impl Notifier for BroadcastNotifier {
    fn notify(&mut self, notification: Notification) -> Result<(), DeliveryFailure> {
        let kind = notification.kind();
        if self.tx.receiver_count() > 0 {
            // Receivers can go away between the count and the send.
            match self.tx.send(notification) {
                Ok(receivers) => {
                    tracing::trace!(kind, receivers, "notification broadcast");
                    return Ok(());
                }
                Err(broadcast::error::SendError(returned)) => {
                    return self.fallback(&returned);
                }
            }
        }
        self.fallback(&notification)
    }
}
