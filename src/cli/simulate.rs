use super::ui;
use crate::core::history::{HistorySimulator, MAX_SIMULATION_DAYS, SimulatedDay};
use crate::core::{AlertRule, RateSource};
use anyhow::{Result, bail};
use chrono::NaiveDate;
use comfy_table::Cell;

pub fn display_trace(rule: &AlertRule, days: u32, trace: &[SimulatedDay]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Date"),
        ui::header_cell(&format!("Rate ({})", rule.pair())),
        ui::header_cell("Triggered"),
    ]);

    for day in trace {
        table.add_row(vec![
            Cell::new(day.date.format("%Y-%m-%d")),
            ui::rate_cell(day.rate),
            ui::triggered_cell(day.triggered),
        ]);
    }

    let fired = trace.iter().filter(|d| d.triggered).count();
    let mut output = format!(
        "Simulation: {}\n\n",
        ui::style_text(&rule.to_string(), ui::StyleType::Title)
    );
    output.push_str(&table.to_string());
    output.push_str(&format!(
        "\n\n{} {} notification(s) over {} day(s)",
        ui::style_text("Would have sent:", ui::StyleType::Label),
        fired,
        trace.len()
    ));
    if (trace.len() as u32) < days {
        output.push_str(&ui::style_text(
            &format!(" ({} day(s) without rates)", days - trace.len() as u32),
            ui::StyleType::Error,
        ));
    }
    output
}

/// Replays `rule` over the `days` days ending on `today` and prints the trace.
pub async fn run(
    source: &dyn RateSource,
    rule: &AlertRule,
    days: u32,
    today: NaiveDate,
) -> Result<Vec<SimulatedDay>> {
    rule.validate()?;
    if days > MAX_SIMULATION_DAYS {
        bail!("Cannot simulate more than {MAX_SIMULATION_DAYS} days, got {days}");
    }

    let pb = ui::new_spinner("Fetching historical rates...");
    let trace = HistorySimulator::new(source).simulate(rule, days, today).await;
    pb.finish_and_clear();

    if trace.is_empty() {
        println!(
            "{}",
            ui::style_text(
                &format!("No rates available for {} in the last {} day(s)", rule.pair(), days),
                ui::StyleType::Error
            )
        );
    } else {
        println!("{}", display_trace(rule, days, &trace));
    }
    Ok(trace)
}
