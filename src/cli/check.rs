use super::ui;
use crate::core::runner::{BatchRunner, Outcome, PassReport};
use crate::core::{AlertStore, Notifier, RateSource};
use anyhow::Result;
use comfy_table::Cell;
use std::time::Duration;
use tracing::{error, info};

impl PassReport {
    pub fn display_as_table(&self) -> String {
        let mut table = ui::new_styled_table();
        table.set_header(vec![
            ui::header_cell("Alert"),
            ui::header_cell("Rule"),
            ui::header_cell("Rate"),
            ui::header_cell("Outcome"),
            ui::header_cell("State"),
        ]);

        let mut rows: Vec<&(_, Outcome)> = self.results.iter().collect();
        rows.sort_by(|(a, _), (b, _)| a.id.cmp(&b.id));

        for (alert, outcome) in rows {
            let active_after = match outcome {
                Outcome::Triggered { .. } => false,
                Outcome::Reactivated { .. } => true,
                _ => alert.active,
            };
            table.add_row(vec![
                Cell::new(&alert.id),
                Cell::new(alert.rule.to_string()),
                ui::format_optional_cell(outcome.rate(), |r| r.to_string()),
                ui::outcome_cell(outcome.label()),
                ui::state_cell(active_after),
            ]);
        }

        let mut output = format!("{}\n\n", ui::style_text("Alert check", ui::StyleType::Title));
        output.push_str(&table.to_string());
        output.push_str(&format!(
            "\n\n{} {} triggered, {} reactivated, {} rate lookups",
            ui::style_text("Summary:", ui::StyleType::Label),
            self.triggered(),
            self.reactivated(),
            self.fetches
        ));
        output
    }
}

/// Runs one pass and prints the outcome of every alert.
pub async fn run(
    source: &dyn RateSource,
    store: &dyn AlertStore,
    notifier: &dyn Notifier,
) -> Result<PassReport> {
    let pb = ui::new_spinner("Checking alerts...");
    let report = BatchRunner::new(source, store, notifier).run_pass().await;
    pb.finish_and_clear();

    let report = report?;
    if report.results.is_empty() {
        println!("No alerts configured.");
    } else {
        println!("{}", report.display_as_table());
    }
    Ok(report)
}

/// Runs a pass every `interval` until Ctrl-C. A failed pass is logged and the
/// next one runs on schedule.
pub async fn watch(
    source: &dyn RateSource,
    store: &dyn AlertStore,
    notifier: &dyn Notifier,
    interval: Duration,
) -> Result<()> {
    let runner = BatchRunner::new(source, store, notifier);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    println!(
        "Watching alerts every {} minute(s). Press Ctrl-C to stop.",
        interval.as_secs() / 60
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match runner.run_pass().await {
                    Ok(report) => println!(
                        "{} {} triggered, {} reactivated",
                        ui::style_text(
                            &chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
                            ui::StyleType::Subtle
                        ),
                        report.triggered(),
                        report.reactivated()
                    ),
                    Err(e) => error!(error = %e, "Pass failed"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Stopping watch");
                return Ok(());
            }
        }
    }
}
