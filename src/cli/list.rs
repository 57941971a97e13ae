use super::ui;
use crate::core::{Alert, AlertStore};
use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use comfy_table::Cell;

pub fn display_alerts(alerts: &[Alert]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Alert"),
        ui::header_cell("Owner"),
        ui::header_cell("Rule"),
        ui::header_cell("State"),
        ui::header_cell("Last sent"),
        ui::header_cell("Unsubscribed"),
    ]);

    for alert in alerts {
        table.add_row(vec![
            Cell::new(&alert.id),
            Cell::new(&alert.owner),
            Cell::new(alert.rule.to_string()),
            ui::state_cell(alert.active),
            ui::format_optional_cell(alert.last_sent_at, |t: DateTime<Utc>| {
                t.format("%Y-%m-%d %H:%M").to_string()
            }),
            ui::format_optional_cell(alert.unsubscribed_at, |t: DateTime<Utc>| {
                t.format("%Y-%m-%d %H:%M").to_string()
            }),
        ]);
    }

    let armed = alerts.iter().filter(|a| a.active).count();
    format!(
        "{}\n\n{}\n\n{} armed, {} fired",
        ui::style_text("Alerts", ui::StyleType::Title),
        table,
        ui::style_text(&armed.to_string(), ui::StyleType::Armed),
        ui::style_text(&(alerts.len() - armed).to_string(), ui::StyleType::Fired),
    )
}

/// Opts an alert out of evaluation, or back in with `undo`.
pub async fn unsubscribe(store: &dyn AlertStore, id: &str, undo: bool) -> Result<()> {
    if store.alert(id).await?.is_none() {
        bail!("No alert with id '{id}' in configuration");
    }
    let at = if undo { None } else { Some(Utc::now()) };
    store.set_unsubscribed(id, at).await?;
    if undo {
        println!("Alert {id} subscribed again.");
    } else {
        println!("Alert {id} unsubscribed.");
    }
    Ok(())
}

pub async fn run(store: &dyn AlertStore) -> Result<()> {
    let alerts = store.alerts().await?;
    if alerts.is_empty() {
        println!("No alerts configured.");
    } else {
        println!("{}", display_alerts(&alerts));
    }
    Ok(())
}
