//! Payment gateway boundary
//!
//! The gateway is an opaque remote service with two calls: open a checkout
//! and verify a transaction by reference. Implementations bound each call by
//! their own timeout and report failures as `Error::Gateway`.

use crate::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Checkout request sent to the gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub amount: Decimal,
    pub currency: String,
    pub email: String,
    pub first_name: String,
    pub callback_url: String,
    /// Reference proposed by the engine
    pub reference: String,
}

/// Checkout opened by the gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Where the payer completes the payment
    pub checkout_url: String,
    /// Reference assigned by the gateway, when it returns one
    pub reference: Option<String>,
}

/// Gateway-side outcome of a transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayVerification {
    pub successful: bool,
    /// Gateway message, for diagnostics
    pub detail: String,
}

/// Remote payment gateway
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Open a checkout. An `Err` means the gateway did not accept it.
    async fn initialize(&self, request: &CheckoutRequest) -> Result<CheckoutSession>;

    /// Look up the outcome of the transaction behind `reference`
    async fn verify(&self, reference: &str) -> Result<GatewayVerification>;
}
