//! Replays an alert rule over past daily rates.
//!
//! The latch starts armed and evolves exactly like a production pass would:
//! each day first decides whether the alert fires, then whether it is armed
//! for the next day.

use super::{AlertRule, RateDate, RateSource};
use chrono::{Days, NaiveDate};
use futures::{StreamExt, stream};
use serde::Serialize;
use tracing::{debug, warn};

/// Longest window the simulator is asked to replay.
pub const MAX_SIMULATION_DAYS: u32 = 3660;

/// Dated lookups kept in flight at once.
const FETCH_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulatedDay {
    pub date: NaiveDate,
    pub rate: f64,
    pub triggered: bool,
}

pub struct HistorySimulator<'a> {
    source: &'a dyn RateSource,
}

impl<'a> HistorySimulator<'a> {
    pub fn new(source: &'a dyn RateSource) -> Self {
        Self { source }
    }

    /// Simulates the `days` calendar days ending on `today`, oldest first.
    ///
    /// Days without a rate are left out; the window is not extended to make up
    /// for them.
    pub async fn simulate(&self, rule: &AlertRule, days: u32, today: NaiveDate) -> Vec<SimulatedDay> {
        if rule.base_currency.is_empty() || rule.quote_currency.is_empty() {
            return Vec::new();
        }

        // The window stops at the earliest representable date
        let mut dates: Vec<NaiveDate> = (0..days)
            .map_while(|days_ago| today.checked_sub_days(Days::new(u64::from(days_ago))))
            .collect();
        dates.reverse();

        let rates: Vec<Option<f64>> = stream::iter(dates.iter().copied())
            .map(|date| {
                self.source
                    .fetch_rate(&rule.base_currency, &rule.quote_currency, RateDate::On(date))
            })
            .buffered(FETCH_CONCURRENCY)
            .collect()
            .await;

        let mut active = true;
        let mut trace = Vec::with_capacity(dates.len());
        for (date, rate) in dates.into_iter().zip(rates) {
            let Some(rate) = rate else {
                warn!(%date, pair = %rule.pair(), "No rate for day, skipping");
                continue;
            };
            let triggered = rule.should_trigger(rate, active);
            debug!(%date, rate, active, triggered, "Simulated day");
            trace.push(SimulatedDay {
                date,
                rate,
                triggered,
            });
            active = rule.should_reactivate(rate, active);
        }
        trace
    }
}
