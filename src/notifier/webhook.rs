use super::Delivery;
use crate::core::AlertNotification;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

/// POSTs each fired alert as JSON.
pub struct WebhookDelivery {
    url: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    subject: String,
    #[serde(flatten)]
    notification: &'a AlertNotification,
}

impl WebhookDelivery {
    pub fn new(url: &str) -> Result<Self> {
        let client = reqwest::Client::builder().user_agent("fxalert/1.0").build()?;
        Ok(Self {
            url: url.to_string(),
            client,
        })
    }
}

#[async_trait]
impl Delivery for WebhookDelivery {
    async fn deliver(&self, notification: &AlertNotification) -> Result<()> {
        let payload = WebhookPayload {
            subject: notification.subject(),
            notification,
        };
        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("Webhook request to {} failed", self.url))?;

        if !response.status().is_success() {
            return Err(anyhow!("HTTP error: {} from webhook {}", response.status(), self.url));
        }
        debug!(id = %notification.alert_id, "Webhook accepted notification");
        Ok(())
    }
}
