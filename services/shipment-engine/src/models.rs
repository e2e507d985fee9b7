use crate::errors::{Result, ShipmentEngineError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shipment_core::{Acceptor, CreateShipment, InitializePayment, Payment, Shipment};
use uuid::Uuid;
use validator::Validate;

/// Shipment booking request.
///
/// Fields are optional at the wire level so that a missing field yields the
/// "all fields are required" rejection instead of a deserialization error.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateShipmentRequest {
    pub flight_id: Option<Uuid>,
    pub item_weight: Option<Decimal>,
    pub acceptor_name: Option<String>,
    pub acceptor_phone: Option<String>,
    #[serde(rename = "acceptorNationalID")]
    pub acceptor_national_id: Option<String>,
    pub fee: Option<Decimal>,
}

impl CreateShipmentRequest {
    pub fn into_command(self) -> Result<CreateShipment> {
        let mut missing = Vec::new();
        if self.flight_id.is_none() {
            missing.push("flightId");
        }
        if self.item_weight.is_none() {
            missing.push("itemWeight");
        }
        if blank(&self.acceptor_name) {
            missing.push("acceptorName");
        }
        if blank(&self.acceptor_phone) {
            missing.push("acceptorPhone");
        }
        if blank(&self.acceptor_national_id) {
            missing.push("acceptorNationalID");
        }
        if !missing.is_empty() {
            return Err(ShipmentEngineError::Validation(format!(
                "All fields are required, missing: {}",
                missing.join(", ")
            )));
        }

        Ok(CreateShipment {
            flight_id: self.flight_id.unwrap_or_default(),
            item_weight: self.item_weight.unwrap_or_default(),
            acceptor: Acceptor {
                name: self.acceptor_name.unwrap_or_default().trim().to_string(),
                phone: self.acceptor_phone.unwrap_or_default().trim().to_string(),
                national_id: self
                    .acceptor_national_id
                    .unwrap_or_default()
                    .trim()
                    .to_string(),
            },
            fee: self.fee,
        })
    }
}

fn blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

/// Checkout request
#[derive(Debug, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct InitializePaymentRequest {
    pub shipment_id: Uuid,
    pub amount: Decimal,
    #[validate(length(min = 3, max = 3))]
    pub currency: Option<String>,
    #[validate(email)]
    pub customer_email: String,
    #[validate(length(min = 1, max = 100))]
    pub customer_name: String,
}

impl InitializePaymentRequest {
    pub fn into_command(self, default_currency: &str) -> Result<InitializePayment> {
        self.validate()?;
        Ok(InitializePayment {
            shipment_id: self.shipment_id,
            amount: self.amount,
            currency: self
                .currency
                .unwrap_or_else(|| default_currency.to_string())
                .to_uppercase(),
            customer_email: self.customer_email,
            customer_name: self.customer_name,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentCreatedResponse {
    pub message: String,
    pub shipment: Shipment,
    pub remaining_kg: Decimal,
    pub warnings: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryConfirmedResponse {
    pub message: String,
    pub shipment: Shipment,
    pub amount_released: Decimal,
    pub platform_fee: Decimal,
    pub points_awarded: i64,
    pub warnings: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInitializedResponse {
    pub message: String,
    pub checkout_url: String,
    pub payment: Payment,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentVerifiedResponse {
    pub message: String,
    pub payment: Payment,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsResponse {
    pub user_id: Uuid,
    pub points: i64,
}
