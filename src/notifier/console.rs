use super::Delivery;
use crate::cli::ui;
use crate::core::AlertNotification;
use anyhow::Result;
use async_trait::async_trait;

/// Prints fired alerts to stdout.
pub struct ConsoleDelivery;

pub fn format_notification(notification: &AlertNotification) -> String {
    format!(
        "{} {} (to {}; {} {} {})",
        ui::style_text("ALERT", ui::StyleType::Fired),
        notification.subject(),
        notification.owner,
        notification.comparator,
        notification.threshold,
        ui::style_text(
            &notification.fired_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            ui::StyleType::Subtle
        ),
    )
}

#[async_trait]
impl Delivery for ConsoleDelivery {
    async fn deliver(&self, notification: &AlertNotification) -> Result<()> {
        println!("{}", format_notification(notification));
        Ok(())
    }
}
