//! SMS gateway client

use crate::config::SmsConfig;
use crate::metrics;
use async_trait::async_trait;
use serde::Serialize;
use shipment_core::{Error, Notifier, Result};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Serialize)]
struct SendBody<'a> {
    to: &'a str,
    message: &'a str,
    sender: &'a str,
}

/// HTTP client for the bulk SMS API
pub struct SmsClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    sender_id: String,
}

impl SmsClient {
    pub fn new(config: &SmsConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("sms client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            sender_id: config.sender_id.clone(),
        })
    }

    async fn send(&self, phone: &str, message: &str) -> Result<()> {
        let response = self
            .http
            .post(format!("{}/send", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&SendBody {
                to: phone,
                message,
                sender: &self.sender_id,
            })
            .send()
            .await
            .map_err(|e| Error::Notification(format!("sms gateway unreachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Notification(format!(
                "sms gateway returned {}: {}",
                status, body
            )));
        }

        debug!(phone, "sms accepted by gateway");
        Ok(())
    }
}

#[async_trait]
impl Notifier for SmsClient {
    async fn send_sms(&self, phone: &str, message: &str) -> Result<()> {
        let result = self.send(phone, message).await;
        if result.is_err() {
            metrics::NOTIFICATION_FAILURES.inc();
        }
        result
    }
}
