//! Notification abstractions

use super::alert::{Alert, Comparator};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Everything a delivery backend needs to tell the owner an alert fired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertNotification {
    pub alert_id: String,
    pub owner: String,
    pub base_currency: String,
    pub quote_currency: String,
    pub comparator: Comparator,
    pub threshold: f64,
    pub rate: f64,
    pub fired_at: DateTime<Utc>,
}

impl AlertNotification {
    pub fn new(alert: &Alert, rate: f64) -> Self {
        Self {
            alert_id: alert.id.clone(),
            owner: alert.owner.clone(),
            base_currency: alert.rule.base_currency.clone(),
            quote_currency: alert.rule.quote_currency.clone(),
            comparator: alert.rule.comparator,
            threshold: alert.rule.threshold,
            rate,
            fired_at: Utc::now(),
        }
    }

    pub fn subject(&self) -> String {
        format!(
            "Currency Alert: {}/{} has reached {}",
            self.base_currency.to_uppercase(),
            self.quote_currency.to_uppercase(),
            self.rate
        )
    }
}

/// Fire-and-forget hand-off of a fired alert. Implementations must not block.
pub trait Notifier: Send + Sync {
    fn notify(&self, alert: &Alert, rate: f64);
}
