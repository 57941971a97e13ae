//! Persistence contract for alerts

use super::alert::Alert;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn alerts(&self) -> Result<Vec<Alert>>;

    async fn alert(&self, id: &str) -> Result<Option<Alert>>;

    /// Distinct lowercase base currencies across all alerts.
    async fn base_currencies(&self) -> Result<Vec<String>>;

    async fn alerts_for_base(&self, base_currency: &str) -> Result<Vec<Alert>>;

    /// Sets `active` to `new` only if it currently equals `expected`.
    ///
    /// Returns `false` when the stored value did not match and nothing was written.
    async fn set_active(&self, id: &str, expected: bool, new: bool) -> Result<bool>;

    async fn record_sent(&self, id: &str, at: DateTime<Utc>) -> Result<()>;

    /// Marks the alert unsubscribed at `at`, or subscribed again with `None`.
    async fn set_unsubscribed(&self, id: &str, at: Option<DateTime<Utc>>) -> Result<()>;
}
