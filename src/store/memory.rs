use crate::core::{Alert, AlertStore};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::Mutex;
use tracing::debug;

/// In-memory alert store keyed by alert id.
pub struct MemoryAlertStore {
    inner: Mutex<BTreeMap<String, Alert>>,
}

impl MemoryAlertStore {
    pub fn new(alerts: impl IntoIterator<Item = Alert>) -> Self {
        Self {
            inner: Mutex::new(alerts.into_iter().map(|a| (a.id.clone(), a)).collect()),
        }
    }
}

impl Default for MemoryAlertStore {
    fn default() -> Self {
        Self::new([])
    }
}

#[async_trait]
impl AlertStore for MemoryAlertStore {
    async fn alerts(&self) -> Result<Vec<Alert>> {
        Ok(self.inner.lock().await.values().cloned().collect())
    }

    async fn alert(&self, id: &str) -> Result<Option<Alert>> {
        Ok(self.inner.lock().await.get(id).cloned())
    }

    async fn base_currencies(&self) -> Result<Vec<String>> {
        let alerts = self.inner.lock().await;
        let bases: BTreeSet<String> = alerts
            .values()
            .map(|a| a.rule.base_currency.to_lowercase())
            .collect();
        Ok(bases.into_iter().collect())
    }

    async fn alerts_for_base(&self, base_currency: &str) -> Result<Vec<Alert>> {
        let base = base_currency.to_lowercase();
        Ok(self
            .inner
            .lock()
            .await
            .values()
            .filter(|a| a.rule.base_currency == base)
            .cloned()
            .collect())
    }

    async fn set_active(&self, id: &str, expected: bool, new: bool) -> Result<bool> {
        let mut alerts = self.inner.lock().await;
        let alert = alerts
            .get_mut(id)
            .ok_or_else(|| anyhow!("Unknown alert: {}", id))?;
        if alert.active != expected {
            debug!(%id, expected, actual = alert.active, "Compare-and-set rejected");
            return Ok(false);
        }
        alert.active = new;
        Ok(true)
    }

    async fn record_sent(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        let mut alerts = self.inner.lock().await;
        let alert = alerts
            .get_mut(id)
            .ok_or_else(|| anyhow!("Unknown alert: {}", id))?;
        alert.last_sent_at = Some(at);
        Ok(())
    }

    async fn set_unsubscribed(&self, id: &str, at: Option<DateTime<Utc>>) -> Result<()> {
        let mut alerts = self.inner.lock().await;
        let alert = alerts
            .get_mut(id)
            .ok_or_else(|| anyhow!("Unknown alert: {}", id))?;
        alert.unsubscribed_at = at;
        Ok(())
    }
}
