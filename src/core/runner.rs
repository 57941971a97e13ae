//! One evaluation pass over every alert.
//!
//! Alerts are grouped by base currency so each group costs a single rate
//! lookup. Groups run concurrently; every alert in a group reads the same
//! snapshot.

use super::{Alert, AlertStore, Notifier, RateDate, RateSnapshot, RateSource};
use anyhow::{Context, Result};
use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    /// Fired: deactivated and a notification was queued.
    Triggered { rate: f64 },
    /// Re-armed after the rate crossed back.
    Reactivated { rate: f64 },
    Unchanged { rate: f64 },
    /// The snapshot has no rate for the quote currency.
    MissingQuote,
    /// The base currency lookup failed for this pass.
    RatesUnavailable,
    /// The owner opted out; not evaluated.
    Unsubscribed,
    /// Another writer changed `active` first; nothing applied.
    Conflict { rate: f64 },
}

impl Outcome {
    pub fn rate(&self) -> Option<f64> {
        match self {
            Outcome::Triggered { rate }
            | Outcome::Reactivated { rate }
            | Outcome::Unchanged { rate }
            | Outcome::Conflict { rate } => Some(*rate),
            Outcome::MissingQuote | Outcome::RatesUnavailable | Outcome::Unsubscribed => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Triggered { .. } => "triggered",
            Outcome::Reactivated { .. } => "reactivated",
            Outcome::Unchanged { .. } => "unchanged",
            Outcome::MissingQuote => "missing quote",
            Outcome::RatesUnavailable => "rates unavailable",
            Outcome::Unsubscribed => "unsubscribed",
            Outcome::Conflict { .. } => "conflict",
        }
    }
}

#[derive(Debug, Default)]
pub struct PassReport {
    /// Alerts as they were read at the start of their group.
    pub results: Vec<(Alert, Outcome)>,
    pub fetches: usize,
}

impl PassReport {
    pub fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.results.iter().filter(|(_, o)| pred(o)).count()
    }

    pub fn triggered(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Triggered { .. }))
    }

    pub fn reactivated(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Reactivated { .. }))
    }
}

pub struct BatchRunner<'a> {
    source: &'a dyn RateSource,
    store: &'a dyn AlertStore,
    notifier: &'a dyn Notifier,
}

impl<'a> BatchRunner<'a> {
    pub fn new(
        source: &'a dyn RateSource,
        store: &'a dyn AlertStore,
        notifier: &'a dyn Notifier,
    ) -> Self {
        Self {
            source,
            store,
            notifier,
        }
    }

    #[instrument(name = "BatchPass", skip(self))]
    pub async fn run_pass(&self) -> Result<PassReport> {
        let bases = self
            .store
            .base_currencies()
            .await
            .context("Failed to enumerate base currencies")?;
        debug!(groups = bases.len(), "Starting pass");

        let groups = join_all(bases.iter().map(|base| self.run_group(base))).await;

        let mut report = PassReport {
            fetches: bases.len(),
            ..Default::default()
        };
        for (base, group) in bases.iter().zip(groups) {
            match group {
                Ok(results) => report.results.extend(results),
                Err(e) => warn!(error = %e, %base, "Skipping base currency group"),
            }
        }

        info!(
            alerts = report.results.len(),
            fetches = report.fetches,
            triggered = report.triggered(),
            reactivated = report.reactivated(),
            "Pass finished"
        );
        Ok(report)
    }

    async fn run_group(&self, base: &str) -> Result<Vec<(Alert, Outcome)>> {
        let snapshot = self.source.fetch_rates(base, RateDate::Latest).await;
        let alerts = self
            .store
            .alerts_for_base(base)
            .await
            .with_context(|| format!("Failed to load alerts for {base}"))?;

        let snapshot = match snapshot {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, %base, skipped = alerts.len(), "Rates unavailable");
                return Ok(alerts
                    .into_iter()
                    .map(|a| (a, Outcome::RatesUnavailable))
                    .collect());
            }
        };

        let mut results = Vec::with_capacity(alerts.len());
        for alert in alerts {
            let outcome = self.evaluate(&alert, &snapshot).await?;
            results.push((alert, outcome));
        }
        Ok(results)
    }

    async fn evaluate(&self, alert: &Alert, snapshot: &RateSnapshot) -> Result<Outcome> {
        if alert.unsubscribed_at.is_some() {
            debug!(id = %alert.id, "Alert unsubscribed, skipping");
            return Ok(Outcome::Unsubscribed);
        }
        let Some(rate) = snapshot.get(&alert.rule.quote_currency) else {
            debug!(id = %alert.id, quote = %alert.rule.quote_currency, "No rate for quote currency");
            return Ok(Outcome::MissingQuote);
        };

        if alert.should_trigger(rate) {
            return self.trigger(alert, rate).await;
        }
        if alert.should_reactivate(rate) && !alert.active {
            return self.reactivate(alert, rate).await;
        }
        Ok(Outcome::Unchanged { rate })
    }

    async fn trigger(&self, alert: &Alert, rate: f64) -> Result<Outcome> {
        if !self.store.set_active(&alert.id, alert.active, false).await? {
            return Ok(Outcome::Conflict { rate });
        }
        info!(id = %alert.id, rule = %alert.rule, rate, "Alert triggered");
        self.notifier.notify(alert, rate);
        if let Err(e) = self.store.record_sent(&alert.id, Utc::now()).await {
            warn!(error = %e, id = %alert.id, "Failed to record last sent time");
        }
        Ok(Outcome::Triggered { rate })
    }

    async fn reactivate(&self, alert: &Alert, rate: f64) -> Result<Outcome> {
        if !self.store.set_active(&alert.id, false, true).await? {
            return Ok(Outcome::Conflict { rate });
        }
        info!(id = %alert.id, rule = %alert.rule, rate, "Alert reactivated");
        Ok(Outcome::Reactivated { rate })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AlertRule, Comparator, RateError};
    use crate::store::memory::MemoryAlertStore;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockSource {
        rates: HashMap<String, Vec<(&'static str, f64)>>,
        call_count: AtomicUsize,
    }

    impl MockSource {
        fn new(rates: &[(&str, Vec<(&'static str, f64)>)]) -> Self {
            Self {
                rates: rates
                    .iter()
                    .map(|(base, r)| (base.to_string(), r.clone()))
                    .collect(),
                call_count: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RateSource for MockSource {
        async fn fetch_rates(&self, base: &str, date: RateDate) -> Result<RateSnapshot, RateError> {
            assert_eq!(date, RateDate::Latest);
            self.call_count.fetch_add(1, Ordering::SeqCst);
            self.rates
                .get(base)
                .map(|r| RateSnapshot::new(r.iter().copied()))
                .ok_or_else(|| RateError::Malformed {
                    base: base.to_string(),
                    reason: "no rates".to_string(),
                })
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(String, f64)>>,
    }

    impl RecordingNotifier {
        fn sent(&self) -> Vec<(String, f64)> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, alert: &Alert, rate: f64) {
            self.sent.lock().unwrap().push((alert.id.clone(), rate));
        }
    }

    fn alert(id: &str, base: &str, quote: &str, comparator: Comparator, threshold: f64, active: bool) -> Alert {
        let mut a = Alert::new(id, "me@example.com", AlertRule::new(base, quote, comparator, threshold));
        a.active = active;
        a
    }

    fn usd_eur_store() -> MemoryAlertStore {
        MemoryAlertStore::new([
            alert("active", "USD", "EUR", Comparator::GreaterThan, 1.2, true),
            alert("inactive", "USD", "EUR", Comparator::GreaterThan, 1.4, false),
        ])
    }

    async fn is_active(store: &MemoryAlertStore, id: &str) -> bool {
        store.alert(id).await.unwrap().unwrap().active
    }

    #[tokio::test]
    async fn test_trigger_deactivates_and_notifies() {
        let source = MockSource::new(&[("usd", vec![("eur", 1.3)])]);
        let store = usd_eur_store();
        let notifier = RecordingNotifier::default();
        let runner = BatchRunner::new(&source, &store, &notifier);

        let report = runner.run_pass().await.unwrap();

        assert!(!is_active(&store, "active").await);
        assert_eq!(notifier.sent(), vec![("active".to_string(), 1.3)]);
        assert_eq!(report.triggered(), 1);
        assert!(store.alert("active").await.unwrap().unwrap().last_sent_at.is_some());
    }

    #[tokio::test]
    async fn test_reactivate_when_rate_crosses_back() {
        let source = MockSource::new(&[("usd", vec![("eur", 1.3)])]);
        let store = usd_eur_store();
        let notifier = RecordingNotifier::default();

        BatchRunner::new(&source, &store, &notifier).run_pass().await.unwrap();

        // 1.3 < 1.4 re-arms the inactive alert
        assert!(is_active(&store, "inactive").await);
    }

    #[tokio::test]
    async fn test_no_change_when_neither_condition_met() {
        let source = MockSource::new(&[("usd", vec![("eur", 1.3)])]);
        let store = MemoryAlertStore::new([
            alert("active", "USD", "EUR", Comparator::GreaterThan, 1.5, true),
            alert("inactive", "USD", "EUR", Comparator::GreaterThan, 1.1, false),
        ]);
        let notifier = RecordingNotifier::default();

        let report = BatchRunner::new(&source, &store, &notifier).run_pass().await.unwrap();

        assert!(notifier.sent().is_empty());
        assert!(is_active(&store, "active").await);
        assert!(!is_active(&store, "inactive").await);
        assert_eq!(report.count(|o| matches!(o, Outcome::Unchanged { .. })), 2);
    }

    #[tokio::test]
    async fn test_rerun_does_not_redispatch() {
        let source = MockSource::new(&[("usd", vec![("eur", 1.3)])]);
        let store = usd_eur_store();
        let notifier = RecordingNotifier::default();
        let runner = BatchRunner::new(&source, &store, &notifier);

        runner.run_pass().await.unwrap();
        runner.run_pass().await.unwrap();

        assert_eq!(notifier.sent().len(), 1);
        assert!(!is_active(&store, "active").await);
    }

    #[tokio::test]
    async fn test_one_fetch_per_distinct_base() {
        let source = MockSource::new(&[
            ("usd", vec![("eur", 0.9), ("gbp", 0.8), ("inr", 83.0)]),
            ("eur", vec![("usd", 1.1)]),
        ]);
        let store = MemoryAlertStore::new([
            alert("1", "USD", "EUR", Comparator::GreaterThan, 1.0, true),
            alert("2", "usd", "gbp", Comparator::LowerThan, 1.0, true),
            alert("3", "Usd", "inr", Comparator::Equal, 83.0, true),
            alert("4", "USD", "EUR", Comparator::LowerThan, 0.5, true),
            alert("5", "EUR", "USD", Comparator::GreaterThan, 1.0, true),
        ]);
        let notifier = RecordingNotifier::default();

        let report = BatchRunner::new(&source, &store, &notifier).run_pass().await.unwrap();

        assert_eq!(source.call_count.load(Ordering::SeqCst), 2);
        assert_eq!(report.fetches, 2);
        assert_eq!(report.results.len(), 5);
        let mut fired: Vec<String> = notifier.sent().into_iter().map(|(id, _)| id).collect();
        fired.sort();
        assert_eq!(fired, vec!["2", "3", "5"]);
    }

    #[tokio::test]
    async fn test_missing_quote_is_skipped() {
        let source = MockSource::new(&[("usd", vec![("gbp", 0.8)])]);
        let store = usd_eur_store();
        let notifier = RecordingNotifier::default();

        let report = BatchRunner::new(&source, &store, &notifier).run_pass().await.unwrap();

        assert!(notifier.sent().is_empty());
        assert!(is_active(&store, "active").await);
        assert!(!is_active(&store, "inactive").await);
        assert_eq!(report.count(|o| *o == Outcome::MissingQuote), 2);
    }

    #[tokio::test]
    async fn test_failed_fetch_skips_group_only() {
        let source = MockSource::new(&[("eur", vec![("usd", 1.1)])]);
        let store = MemoryAlertStore::new([
            alert("usd", "USD", "EUR", Comparator::LowerThan, 5.0, true),
            alert("eur", "EUR", "USD", Comparator::GreaterThan, 1.0, true),
        ]);
        let notifier = RecordingNotifier::default();

        let report = BatchRunner::new(&source, &store, &notifier).run_pass().await.unwrap();

        assert!(is_active(&store, "usd").await);
        assert_eq!(notifier.sent(), vec![("eur".to_string(), 1.1)]);
        assert_eq!(report.count(|o| *o == Outcome::RatesUnavailable), 1);
    }

    #[tokio::test]
    async fn test_equal_fires_regardless_of_active() {
        let source = MockSource::new(&[("usd", vec![("eur", 1.1236)])]);
        let store = MemoryAlertStore::new([alert("eq", "USD", "EUR", Comparator::Equal, 1.123, false)]);
        let notifier = RecordingNotifier::default();

        BatchRunner::new(&source, &store, &notifier).run_pass().await.unwrap();

        assert_eq!(notifier.sent(), vec![("eq".to_string(), 1.1236)]);
        assert!(!is_active(&store, "eq").await);
    }

    #[tokio::test]
    async fn test_empty_store() {
        let source = MockSource::new(&[]);
        let store = MemoryAlertStore::default();
        let notifier = RecordingNotifier::default();

        let report = BatchRunner::new(&source, &store, &notifier).run_pass().await.unwrap();

        assert_eq!(source.call_count.load(Ordering::SeqCst), 0);
        assert!(report.results.is_empty());
    }

    #[tokio::test]
    async fn test_unsubscribed_alert_is_not_evaluated() {
        let source = MockSource::new(&[("usd", vec![("eur", 1.3)])]);
        let mut opted_out = alert("opted-out", "USD", "EUR", Comparator::GreaterThan, 1.2, true);
        opted_out.unsubscribed_at = Some(Utc::now());
        let store = MemoryAlertStore::new([
            opted_out,
            alert("subscribed", "USD", "EUR", Comparator::GreaterThan, 1.2, true),
        ]);
        let notifier = RecordingNotifier::default();

        let report = BatchRunner::new(&source, &store, &notifier).run_pass().await.unwrap();

        assert_eq!(notifier.sent(), vec![("subscribed".to_string(), 1.3)]);
        assert!(is_active(&store, "opted-out").await);
        assert_eq!(report.count(|o| *o == Outcome::Unsubscribed), 1);
    }
}
