//! Queued notification dispatch.
//!
//! `QueuedNotifier::notify` only enqueues. A spawned dispatcher task drains
//! the queue into a `Delivery` backend; failed deliveries are logged and
//! dropped.

pub mod console;
pub mod webhook;

use crate::core::config::NotifierConfig;
use crate::core::{Alert, AlertNotification, Notifier};
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[async_trait]
pub trait Delivery: Send + Sync {
    async fn deliver(&self, notification: &AlertNotification) -> Result<()>;
}

pub struct QueuedNotifier {
    tx: mpsc::UnboundedSender<AlertNotification>,
}

impl QueuedNotifier {
    /// Starts the dispatcher. It exits once the notifier is dropped and the
    /// queue is drained, so awaiting the handle flushes pending deliveries.
    pub fn spawn<D: Delivery + 'static>(delivery: D) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<AlertNotification>();
        let handle = tokio::spawn(async move {
            while let Some(notification) = rx.recv().await {
                debug!(id = %notification.alert_id, "Delivering notification");
                if let Err(e) = delivery.deliver(&notification).await {
                    warn!(error = %e, id = %notification.alert_id, "Notification delivery failed");
                }
            }
        });
        (Self { tx }, handle)
    }

    pub fn from_config(config: &NotifierConfig) -> Result<(Self, JoinHandle<()>)> {
        Ok(match config {
            NotifierConfig::Console => Self::spawn(console::ConsoleDelivery),
            NotifierConfig::Webhook { url } => Self::spawn(webhook::WebhookDelivery::new(url)?),
        })
    }
}

impl Notifier for QueuedNotifier {
    fn notify(&self, alert: &Alert, rate: f64) {
        if self.tx.send(AlertNotification::new(alert, rate)).is_err() {
            warn!(id = %alert.id, "Notification dispatcher stopped, dropping notification");
        }
    }
}
