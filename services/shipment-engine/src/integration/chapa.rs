//! Chapa payment gateway client

use crate::config::ChapaConfig;
use async_trait::async_trait;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shipment_core::{
    CheckoutRequest, CheckoutSession, Error, GatewayVerification, PaymentGateway, Result,
};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
struct InitializeBody<'a> {
    amount: Decimal,
    currency: &'a str,
    email: &'a str,
    first_name: &'a str,
    callback_url: &'a str,
    tx_ref: &'a str,
    reference: &'a str,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<serde_json::Value>,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

impl Envelope {
    fn is_success(&self) -> bool {
        self.status.as_deref() == Some("success")
    }

    fn message(&self) -> String {
        match &self.message {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "no message".to_string(),
        }
    }

    fn data_str(&self, key: &str) -> Option<String> {
        self.data
            .as_ref()
            .and_then(|d| d.get(key))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }
}

/// HTTP client for the Chapa checkout API
pub struct ChapaClient {
    http: reqwest::Client,
    base_url: String,
    secret_key: String,
}

impl ChapaClient {
    pub fn new(config: &ChapaConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent("flightbridge-shipment-engine")
            .build()
            .map_err(|e| Error::Config(format!("payment gateway client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
        })
    }

    async fn read_envelope(response: reqwest::Response) -> Result<(StatusCode, Envelope)> {
        let status = response.status();
        let envelope = response
            .json::<Envelope>()
            .await
            .map_err(|e| Error::Gateway(format!("unreadable gateway response ({}): {}", status, e)))?;
        Ok((status, envelope))
    }
}

fn transport(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Gateway("payment gateway timed out".to_string())
    } else {
        Error::Gateway(format!("payment gateway unreachable: {}", err))
    }
}

#[async_trait]
impl PaymentGateway for ChapaClient {
    async fn initialize(&self, request: &CheckoutRequest) -> Result<CheckoutSession> {
        let body = InitializeBody {
            amount: request.amount,
            currency: &request.currency,
            email: &request.email,
            first_name: &request.first_name,
            callback_url: &request.callback_url,
            tx_ref: &request.reference,
            reference: &request.reference,
        };

        let response = self
            .http
            .post(format!("{}/transaction/initialize", self.base_url))
            .bearer_auth(&self.secret_key)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;

        let (status, envelope) = Self::read_envelope(response).await?;
        if !status.is_success() || !envelope.is_success() {
            warn!(%status, message = %envelope.message(), "checkout initialization rejected");
            return Err(Error::Gateway(format!(
                "Failed to initialize payment: {}",
                envelope.message()
            )));
        }

        let checkout_url = envelope
            .data_str("checkout_url")
            .ok_or_else(|| Error::Gateway("gateway response has no checkout_url".to_string()))?;

        debug!(reference = %request.reference, "checkout session opened");
        Ok(CheckoutSession {
            checkout_url,
            reference: envelope.data_str("reference"),
        })
    }

    async fn verify(&self, reference: &str) -> Result<GatewayVerification> {
        let response = self
            .http
            .get(format!("{}/transaction/verify/{}", self.base_url, reference))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(transport)?;

        let (status, envelope) = Self::read_envelope(response).await?;
        if status.is_server_error() {
            return Err(Error::Gateway(format!(
                "payment gateway error ({}): {}",
                status,
                envelope.message()
            )));
        }

        Ok(GatewayVerification {
            successful: status.is_success() && envelope.is_success(),
            detail: envelope.message(),
        })
    }
}
