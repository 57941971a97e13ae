//! Alert model and the trigger/reactivate decision logic.
//!
//! An alert is a two-state latch. While armed (`active == true`) a
//! `greater_than` or `lower_than` alert fires once the rate crosses its
//! threshold; it then stays fired until the rate crosses back. `equal` alerts
//! have no latch and are evaluated independently of `active`.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt::Display;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    GreaterThan,
    LowerThan,
    Equal,
}

type Predicate = fn(f64, f64, bool) -> bool;

/// Trigger and reactivate predicates for one comparator.
#[derive(Clone, Copy)]
pub struct Transitions {
    pub trigger: Predicate,
    pub reactivate: Predicate,
}

impl Comparator {
    pub const ALL: [Comparator; 3] = [
        Comparator::GreaterThan,
        Comparator::LowerThan,
        Comparator::Equal,
    ];

    pub fn transitions(self) -> Transitions {
        match self {
            Comparator::GreaterThan => Transitions {
                trigger: |rate, threshold, active| active && rate > threshold,
                reactivate: |rate, threshold, _| rate < threshold,
            },
            Comparator::LowerThan => Transitions {
                trigger: |rate, threshold, active| active && rate < threshold,
                reactivate: |rate, threshold, _| rate > threshold,
            },
            Comparator::Equal => Transitions {
                trigger: |rate, threshold, _| trim_to_precision(rate, threshold) == threshold,
                reactivate: |_, _, _| true,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Comparator::GreaterThan => "greater_than",
            Comparator::LowerThan => "lower_than",
            Comparator::Equal => "equal",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Comparator::GreaterThan => ">",
            Comparator::LowerThan => "<",
            Comparator::Equal => "=",
        }
    }
}

impl Display for Comparator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Comparator {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Comparator::ALL
            .into_iter()
            .find(|c| c.as_str() == s.to_lowercase())
            .ok_or_else(|| anyhow!("Unrecognized comparator: {}", s))
    }
}

/// Whether an alert in `active` state fires at `rate`.
pub fn should_trigger(rate: f64, comparator: Comparator, threshold: f64, active: bool) -> bool {
    (comparator.transitions().trigger)(rate, threshold, active)
}

/// Whether a fired alert re-arms at `rate`.
pub fn should_reactivate(rate: f64, comparator: Comparator, threshold: f64, active: bool) -> bool {
    (comparator.transitions().reactivate)(rate, threshold, active)
}

/// Truncates `rate` to the number of decimals `threshold` is written with.
///
/// A threshold of `1.123` keeps three decimals, so any rate in `[1.123, 1.124)`
/// comes back as `1.123`. Digits are never rounded up.
pub fn trim_to_precision(rate: f64, threshold: f64) -> f64 {
    let exact = Decimal::from_str(&threshold.to_string()).and_then(|t| {
        Decimal::from_str(&rate.to_string()).map(|r| (r, t.scale()))
    });

    match exact {
        Ok((rate_dec, scale)) => rate_dec
            .round_dp_with_strategy(scale, RoundingStrategy::ToZero)
            .to_string()
            .parse()
            .unwrap_or(rate),
        // Outside the decimal range, fall back to float arithmetic
        Err(_) => {
            let decimals = threshold
                .to_string()
                .split_once('.')
                .map_or(0, |(_, frac)| frac.len());
            let factor = 10f64.powi(decimals as i32);
            (rate * factor).floor() / factor
        }
    }
}

pub(crate) fn lowercase<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    Ok(value.trim().to_lowercase())
}

/// The immutable half of an alert: what is watched and when it fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    #[serde(deserialize_with = "lowercase")]
    pub base_currency: String,
    #[serde(deserialize_with = "lowercase")]
    pub quote_currency: String,
    pub comparator: Comparator,
    pub threshold: f64,
}

impl AlertRule {
    pub fn new(base_currency: &str, quote_currency: &str, comparator: Comparator, threshold: f64) -> Self {
        Self {
            base_currency: base_currency.trim().to_lowercase(),
            quote_currency: quote_currency.trim().to_lowercase(),
            comparator,
            threshold,
        }
    }

    pub fn should_trigger(&self, rate: f64, active: bool) -> bool {
        should_trigger(rate, self.comparator, self.threshold, active)
    }

    pub fn should_reactivate(&self, rate: f64, active: bool) -> bool {
        should_reactivate(rate, self.comparator, self.threshold, active)
    }

    pub fn pair(&self) -> String {
        format!(
            "{}/{}",
            self.base_currency.to_uppercase(),
            self.quote_currency.to_uppercase()
        )
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_currency.is_empty() {
            return Err(anyhow!("base_currency is required"));
        }
        if self.quote_currency.is_empty() {
            return Err(anyhow!("quote_currency is required"));
        }
        if !self.threshold.is_finite() || self.threshold <= 0.0 {
            return Err(anyhow!(
                "threshold must be greater than 0, got {}",
                self.threshold
            ));
        }
        Ok(())
    }
}

impl Display for AlertRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.pair(),
            self.comparator.symbol(),
            self.threshold
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub owner: String,
    #[serde(flatten)]
    pub rule: AlertRule,
    pub active: bool,
    pub last_sent_at: Option<DateTime<Utc>>,
    pub unsubscribed_at: Option<DateTime<Utc>>,
}

impl Alert {
    /// Creates an armed alert.
    pub fn new(id: &str, owner: &str, rule: AlertRule) -> Self {
        Self {
            id: id.to_string(),
            owner: owner.to_string(),
            rule,
            active: true,
            last_sent_at: None,
            unsubscribed_at: None,
        }
    }

    pub fn should_trigger(&self, rate: f64) -> bool {
        self.rule.should_trigger(rate, self.active)
    }

    pub fn should_reactivate(&self, rate: f64) -> bool {
        self.rule.should_reactivate(rate, self.active)
    }
}
