use crate::core::config::AlertConfig;
use crate::core::{Alert, AlertRule, AlertStore};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tokio::sync::Mutex;
use tracing::{debug, info};

const STATE_PARTITION: &str = "alert_state";

/// Evaluation state persisted per alert id.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AlertState {
    rule: AlertRule,
    active: bool,
    last_sent_at: Option<DateTime<Utc>>,
    unsubscribed_at: Option<DateTime<Utc>>,
}

impl AlertState {
    fn armed(rule: &AlertRule) -> Self {
        Self {
            rule: rule.clone(),
            active: true,
            last_sent_at: None,
            unsubscribed_at: None,
        }
    }
}

/// Alerts declared in the configuration, with their latch state kept in a
/// `fjall` partition so it survives between runs.
///
/// Editing an alert's rule in the configuration re-arms it.
pub struct DiskAlertStore {
    alerts: BTreeMap<String, AlertConfig>,
    keyspace: Keyspace,
    partition: PartitionHandle,
    // Serializes read-compare-write on the partition
    write_lock: Mutex<()>,
}

impl DiskAlertStore {
    pub fn open(path: &Path, alerts: &[AlertConfig]) -> Result<Self> {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create data directory: {}", path.display()))?;
        let keyspace = fjall::Config::new(path.join("state"))
            .open()
            .with_context(|| format!("Failed to open state store at {}", path.display()))?;
        let partition = keyspace
            .open_partition(STATE_PARTITION, PartitionCreateOptions::default())
            .context("Failed to open alert state partition")?;

        let store = Self {
            alerts: alerts.iter().map(|a| (a.id.clone(), a.clone())).collect(),
            keyspace,
            partition,
            write_lock: Mutex::new(()),
        };
        store.prune()?;
        Ok(store)
    }

    /// Drops state kept for alerts that are no longer configured.
    fn prune(&self) -> Result<()> {
        let mut stale = Vec::new();
        for key in self.partition.keys() {
            let key = key.context("Failed to scan alert state")?;
            if !self.alerts.contains_key(&*String::from_utf8_lossy(&key)) {
                stale.push(key);
            }
        }
        if stale.is_empty() {
            return Ok(());
        }

        for key in &stale {
            self.partition
                .remove(key.clone())
                .context("Failed to remove stale alert state")?;
        }
        self.keyspace
            .persist(PersistMode::SyncAll)
            .context("Failed to persist alert state")?;
        info!(removed = stale.len(), "Removed state of deleted alerts");
        Ok(())
    }

    fn read_state(&self, config: &AlertConfig) -> Result<AlertState> {
        let stored = self
            .partition
            .get(config.id.as_bytes())
            .with_context(|| format!("Failed to read state for alert {}", config.id))?;

        let state = match stored {
            Some(bytes) => {
                let state: AlertState = serde_json::from_slice(&bytes)
                    .with_context(|| format!("Corrupt state for alert {}", config.id))?;
                if state.rule == config.rule {
                    state
                } else {
                    debug!(id = %config.id, "Rule changed, re-arming alert");
                    AlertState {
                        unsubscribed_at: state.unsubscribed_at,
                        ..AlertState::armed(&config.rule)
                    }
                }
            }
            None => AlertState::armed(&config.rule),
        };
        Ok(state)
    }

    fn write_state(&self, id: &str, state: &AlertState) -> Result<()> {
        self.partition
            .insert(id.as_bytes(), serde_json::to_vec(state)?)
            .with_context(|| format!("Failed to write state for alert {id}"))?;
        self.keyspace
            .persist(PersistMode::SyncAll)
            .context("Failed to persist alert state")?;
        Ok(())
    }

    fn load(&self, config: &AlertConfig) -> Result<Alert> {
        let state = self.read_state(config)?;
        Ok(Alert {
            id: config.id.clone(),
            owner: config.owner.clone(),
            rule: config.rule.clone(),
            active: state.active,
            last_sent_at: state.last_sent_at,
            unsubscribed_at: state.unsubscribed_at,
        })
    }

    fn config(&self, id: &str) -> Result<&AlertConfig> {
        self.alerts
            .get(id)
            .ok_or_else(|| anyhow!("Unknown alert: {}", id))
    }
}

#[async_trait]
impl AlertStore for DiskAlertStore {
    async fn alerts(&self) -> Result<Vec<Alert>> {
        self.alerts.values().map(|c| self.load(c)).collect()
    }

    async fn alert(&self, id: &str) -> Result<Option<Alert>> {
        self.alerts.get(id).map(|c| self.load(c)).transpose()
    }

    async fn base_currencies(&self) -> Result<Vec<String>> {
        let bases: BTreeSet<String> = self
            .alerts
            .values()
            .map(|c| c.rule.base_currency.to_lowercase())
            .collect();
        Ok(bases.into_iter().collect())
    }

    async fn alerts_for_base(&self, base_currency: &str) -> Result<Vec<Alert>> {
        let base = base_currency.to_lowercase();
        self.alerts
            .values()
            .filter(|c| c.rule.base_currency == base)
            .map(|c| self.load(c))
            .collect()
    }

    async fn set_active(&self, id: &str, expected: bool, new: bool) -> Result<bool> {
        let config = self.config(id)?;
        let _guard = self.write_lock.lock().await;

        let mut state = self.read_state(config)?;
        if state.active != expected {
            debug!(%id, expected, actual = state.active, "Compare-and-set rejected");
            return Ok(false);
        }
        state.active = new;
        self.write_state(id, &state)?;
        Ok(true)
    }

    async fn record_sent(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        let config = self.config(id)?;
        let _guard = self.write_lock.lock().await;

        let mut state = self.read_state(config)?;
        state.last_sent_at = Some(at);
        self.write_state(id, &state)
    }

    async fn set_unsubscribed(&self, id: &str, at: Option<DateTime<Utc>>) -> Result<()> {
        let config = self.config(id)?;
        let _guard = self.write_lock.lock().await;

        let mut state = self.read_state(config)?;
        state.unsubscribed_at = at;
        self.write_state(id, &state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Comparator;
    use tempfile::tempdir;

    fn configs(threshold: f64) -> Vec<AlertConfig> {
        vec![
            AlertConfig {
                id: "usd-eur".to_string(),
                owner: "me@example.com".to_string(),
                rule: AlertRule::new("USD", "EUR", Comparator::GreaterThan, threshold),
            },
            AlertConfig {
                id: "eur-inr".to_string(),
                owner: "me@example.com".to_string(),
                rule: AlertRule::new("eur", "inr", Comparator::Equal, 90.5),
            },
        ]
    }

    #[tokio::test]
    async fn test_alerts_start_armed() {
        let dir = tempdir().unwrap();
        let store = DiskAlertStore::open(dir.path(), &configs(1.2)).unwrap();

        let alerts = store.alerts().await.unwrap();
        assert_eq!(alerts.len(), 2);
        assert!(alerts.iter().all(|a| a.active));
        assert_eq!(store.base_currencies().await.unwrap(), vec!["eur", "usd"]);
        assert_eq!(store.alerts_for_base("USD").await.unwrap()[0].id, "usd-eur");
        assert!(store.alert("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let dir = tempdir().unwrap();
        let sent_at = Utc::now();
        {
            let store = DiskAlertStore::open(dir.path(), &configs(1.2)).unwrap();
            assert!(store.set_active("usd-eur", true, false).await.unwrap());
            store.record_sent("usd-eur", sent_at).await.unwrap();
        }

        let store = DiskAlertStore::open(dir.path(), &configs(1.2)).unwrap();
        let alert = store.alert("usd-eur").await.unwrap().unwrap();
        assert!(!alert.active);
        assert_eq!(alert.last_sent_at, Some(sent_at));
        assert!(store.alert("eur-inr").await.unwrap().unwrap().active);
    }

    #[tokio::test]
    async fn test_compare_and_set() {
        let dir = tempdir().unwrap();
        let store = DiskAlertStore::open(dir.path(), &configs(1.2)).unwrap();

        assert!(store.set_active("usd-eur", true, false).await.unwrap());
        assert!(!store.set_active("usd-eur", true, false).await.unwrap());
        assert!(store.set_active("usd-eur", false, true).await.unwrap());
        assert!(store.set_active("missing", true, false).await.is_err());
    }

    #[tokio::test]
    async fn test_edited_rule_rearms() {
        let dir = tempdir().unwrap();
        {
            let store = DiskAlertStore::open(dir.path(), &configs(1.2)).unwrap();
            store.set_active("usd-eur", true, false).await.unwrap();
        }

        let store = DiskAlertStore::open(dir.path(), &configs(1.3)).unwrap();
        assert!(store.alert("usd-eur").await.unwrap().unwrap().active);
    }

    #[tokio::test]
    async fn test_unsubscribe_survives_reopen_and_rule_edit() {
        let dir = tempdir().unwrap();
        let at = Utc::now();
        {
            let store = DiskAlertStore::open(dir.path(), &configs(1.2)).unwrap();
            store.set_unsubscribed("usd-eur", Some(at)).await.unwrap();
            assert!(store.set_unsubscribed("missing", Some(at)).await.is_err());
        }

        let store = DiskAlertStore::open(dir.path(), &configs(1.3)).unwrap();
        assert_eq!(
            store.alert("usd-eur").await.unwrap().unwrap().unsubscribed_at,
            Some(at)
        );

        store.set_unsubscribed("usd-eur", None).await.unwrap();
        assert!(store.alert("usd-eur").await.unwrap().unwrap().unsubscribed_at.is_none());
    }

    #[tokio::test]
    async fn test_removed_alerts_are_pruned() {
        let dir = tempdir().unwrap();
        {
            let store = DiskAlertStore::open(dir.path(), &configs(1.2)).unwrap();
            store.set_active("usd-eur", true, false).await.unwrap();
            store.set_active("eur-inr", true, false).await.unwrap();
        }

        let remaining: Vec<AlertConfig> = configs(1.2).into_iter().filter(|c| c.id == "eur-inr").collect();
        let store = DiskAlertStore::open(dir.path(), &remaining).unwrap();
        assert!(store.partition.get("usd-eur").unwrap().is_none());
        assert!(store.partition.get("eur-inr").unwrap().is_some());
        assert!(!store.alert("eur-inr").await.unwrap().unwrap().active);
    }
}
