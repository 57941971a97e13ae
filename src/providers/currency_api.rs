use crate::core::cache::Cache;
use crate::core::{RateDate, RateError, RateSnapshot, RateSource};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument};

pub type SnapshotCache = Cache<(String, NaiveDate), RateSnapshot>;

/// Rates from the `@fawazahmed0/currency-api` package served by a CDN.
///
/// Payload shape: `{"date": "2024-12-03", "usd": {"eur": 0.95, ...}}`.
pub struct CurrencyApiProvider {
    base_url: String,
    client: reqwest::Client,
    cache: Arc<SnapshotCache>,
}

impl CurrencyApiProvider {
    pub fn new(base_url: &str, cache: Arc<SnapshotCache>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("fxalert/1.0")
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            cache,
        })
    }

    fn url(&self, base: &str, date: RateDate) -> String {
        format!(
            "{}/npm/@fawazahmed0/currency-api@{}/v1/currencies/{}.json",
            self.base_url, date, base
        )
    }

    fn parse(base: &str, body: &str) -> Result<RateSnapshot, RateError> {
        let malformed = |reason: String| RateError::Malformed {
            base: base.to_string(),
            reason,
        };

        let payload: Value = serde_json::from_str(body).map_err(|e| malformed(e.to_string()))?;
        let rates = payload
            .get(base)
            .and_then(Value::as_object)
            .ok_or_else(|| malformed(format!("no rates under key '{base}'")))?;

        Ok(RateSnapshot::new(
            rates
                .iter()
                .filter_map(|(quote, rate)| rate.as_f64().map(|r| (quote, r))),
        ))
    }
}

#[async_trait]
impl RateSource for CurrencyApiProvider {
    #[instrument(name = "CurrencyApiFetch", skip(self), fields(base = %base, date = %date))]
    async fn fetch_rates(&self, base: &str, date: RateDate) -> Result<RateSnapshot, RateError> {
        let base = base.to_lowercase();
        // Past days never change; only dated snapshots are cached
        let cache_key = match date {
            RateDate::On(day) => Some((base.clone(), day)),
            RateDate::Latest => None,
        };
        if let Some(key) = &cache_key {
            if let Some(cached) = self.cache.get(key).await {
                return Ok(cached);
            }
        }

        let url = self.url(&base, date);
        debug!("Requesting rates from {}", url);

        let network = |source| RateError::Network {
            url: url.clone(),
            source,
        };
        let response = self.client.get(&url).send().await.map_err(network)?;

        if !response.status().is_success() {
            return Err(RateError::Status {
                url: url.clone(),
                status: response.status(),
            });
        }

        let body = response.text().await.map_err(network)?;
        let snapshot = Self::parse(&base, &body)?;
        debug!(quotes = snapshot.len(), "Received rates");

        if let Some(key) = cache_key {
            self.cache.put(key, snapshot.clone()).await;
        }
        Ok(snapshot)
    }
}
