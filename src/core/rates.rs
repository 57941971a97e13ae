//! Exchange rate abstractions

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::fmt::Display;
use thiserror::Error;
use tracing::warn;

/// Point in time a snapshot is requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateDate {
    Latest,
    On(NaiveDate),
}

impl Display for RateDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateDate::Latest => write!(f, "latest"),
            RateDate::On(date) => write!(f, "{}", date.format("%Y-%m-%d")),
        }
    }
}

/// Quote currency to rate, for one base currency at one point in time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateSnapshot {
    rates: HashMap<String, f64>,
}

impl RateSnapshot {
    /// Builds a snapshot, lowercasing codes and dropping non-positive rates.
    pub fn new<I, S>(rates: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: AsRef<str>,
    {
        Self {
            rates: rates
                .into_iter()
                .filter(|(_, rate)| rate.is_finite() && *rate > 0.0)
                .map(|(code, rate)| (code.as_ref().to_lowercase(), rate))
                .collect(),
        }
    }

    pub fn get(&self, quote_currency: &str) -> Option<f64> {
        self.rates.get(&quote_currency.to_lowercase()).copied()
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

/// Reasons a snapshot could not be produced. All of them mean "no data".
#[derive(Debug, Error)]
pub enum RateError {
    #[error("request failed for {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("HTTP {status} from {url}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("malformed payload for {base}: {reason}")]
    Malformed { base: String, reason: String },
}

#[async_trait]
pub trait RateSource: Send + Sync {
    async fn fetch_rates(&self, base: &str, date: RateDate) -> Result<RateSnapshot, RateError>;

    /// Single pair lookup. `None` if the snapshot is unavailable or lacks `quote`.
    async fn fetch_rate(&self, base: &str, quote: &str, date: RateDate) -> Option<f64> {
        match self.fetch_rates(base, date).await {
            Ok(snapshot) => snapshot.get(quote),
            Err(e) => {
                warn!(error = %e, %base, %date, "Rates unavailable");
                None
            }
        }
    }
}
