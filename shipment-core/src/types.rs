//! Core domain types: flights, shipments, payments, accounts and the
//! read-side projections built from them.

use crate::tracking::TrackingCode;
use crate::Error;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Decimal places stored for weights and money
pub const DECIMAL_PLACES: u32 = 2;

/// Reject a weight or amount carrying more than [`DECIMAL_PLACES`]
/// significant decimal places. Trailing zeros do not count.
pub fn ensure_scale(field: &str, value: Decimal) -> crate::Result<()> {
    if value.normalize().scale() > DECIMAL_PLACES {
        return Err(Error::Validation(format!(
            "{} allows at most {} decimal places, got {}",
            field, DECIMAL_PLACES, value
        )));
    }
    Ok(())
}

/// Operational status of a flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlightStatus {
    /// Departing as scheduled
    OnTime,
    /// Departure pushed back
    Delayed,
    /// Flight will not operate
    Canceled,
}

impl FlightStatus {
    /// Wire/storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            FlightStatus::OnTime => "on-time",
            FlightStatus::Delayed => "delayed",
            FlightStatus::Canceled => "canceled",
        }
    }
}

impl fmt::Display for FlightStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlightStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "on-time" => Ok(FlightStatus::OnTime),
            "delayed" => Ok(FlightStatus::Delayed),
            "canceled" => Ok(FlightStatus::Canceled),
            other => Err(format!("unknown flight status: {}", other)),
        }
    }
}

/// A carrier's flight offering spare luggage capacity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flight {
    /// Flight identity
    pub id: Uuid,
    /// Owning carrier
    pub carrier_id: Uuid,
    /// Origin
    pub from: String,
    /// Destination
    pub to: String,
    /// Scheduled departure
    pub departure_date: DateTime<Utc>,
    /// Remaining cargo weight; never negative
    pub available_kg: Decimal,
    /// Operational status
    pub status: FlightStatus,
}

impl Flight {
    /// Public summary used in tracking views and notifications
    pub fn summary(&self) -> FlightSummary {
        FlightSummary {
            from: self.from.clone(),
            to: self.to.clone(),
            departure_date: self.departure_date,
            status: self.status,
        }
    }
}

/// Shipment lifecycle state. `Created` is initial, `Delivered` terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShipmentStatus {
    /// Booked against a flight, awaiting delivery confirmation
    Created,
    /// Delivery confirmed; settled
    Delivered,
}

impl ShipmentStatus {
    /// Wire/storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ShipmentStatus::Created => "CREATED",
            ShipmentStatus::Delivered => "DELIVERED",
        }
    }
}

impl fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShipmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(ShipmentStatus::Created),
            "DELIVERED" => Ok(ShipmentStatus::Delivered),
            other => Err(format!("unknown shipment status: {}", other)),
        }
    }
}

/// The person receiving the item at destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Acceptor {
    /// Full name
    pub name: String,
    /// Phone number, used for SMS notifications
    pub phone: String,
    /// National identity document number
    #[serde(rename = "nationalID")]
    pub national_id: String,
}

/// A shipment booked on a flight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shipment {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub carrier_id: Uuid,
    pub flight_id: Uuid,
    pub item_weight: Decimal,
    pub acceptor: Acceptor,
    /// Stored but not transitioned by any engine operation
    pub acceptor_verified: bool,
    pub tracking_code: TrackingCode,
    pub status: ShipmentStatus,
    /// Amount owed for the shipment; zero when unset
    pub fee: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Shipment row before its tracking code is attached
#[derive(Debug, Clone, PartialEq)]
pub struct NewShipment {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub carrier_id: Uuid,
    pub flight_id: Uuid,
    pub item_weight: Decimal,
    pub acceptor: Acceptor,
    pub fee: Decimal,
    pub created_at: DateTime<Utc>,
}

impl NewShipment {
    /// Attach a tracking code, producing the committed shape of the record
    pub fn with_tracking_code(self, tracking_code: TrackingCode) -> Shipment {
        Shipment {
            id: self.id,
            sender_id: self.sender_id,
            carrier_id: self.carrier_id,
            flight_id: self.flight_id,
            item_weight: self.item_weight,
            acceptor: self.acceptor,
            acceptor_verified: false,
            tracking_code,
            status: ShipmentStatus::Created,
            fee: self.fee,
            created_at: self.created_at,
        }
    }
}

/// Payment record status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// Checkout opened at the gateway, funds not yet confirmed
    Pending,
    /// Gateway confirmed the funds
    Paid,
    /// Funds released to the carrier on delivery
    Released,
}

impl PaymentStatus {
    /// Wire/storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Released => "released",
        }
    }

    /// `pending` and `paid` payments still hold escrow funds
    pub fn is_open(&self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::Paid)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "released" => Ok(PaymentStatus::Released),
            other => Err(format!("unknown payment status: {}", other)),
        }
    }
}

/// Escrow payment record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: Uuid,
    pub shipment_id: Uuid,
    /// Unique gateway- or system-generated reference
    pub reference: String,
    pub amount: Decimal,
    /// Set on settlement
    pub platform_fee: Option<Decimal>,
    pub status: PaymentStatus,
    pub released_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Sender or carrier account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    pub id: Uuid,
    pub full_name: String,
    pub phone: String,
    pub email: Option<String>,
    /// Funds released to this user as a carrier
    pub balance: Decimal,
    /// Loyalty points; only ever incremented
    pub points: i64,
}

impl UserAccount {
    /// Public summary shown to counterparties
    pub fn summary(&self) -> PartySummary {
        PartySummary {
            full_name: self.full_name.clone(),
            phone: self.phone.clone(),
        }
    }
}

/// Flight fields exposed alongside a shipment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightSummary {
    pub from: String,
    pub to: String,
    pub departure_date: DateTime<Utc>,
    pub status: FlightStatus,
}

/// Counterparty fields exposed alongside a shipment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartySummary {
    pub full_name: String,
    pub phone: String,
}

/// Both parties of a shipment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Counterparties {
    pub sender: Option<PartySummary>,
    pub carrier: Option<PartySummary>,
}

/// Read-only projection returned by tracking lookups
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentView {
    pub shipment: Shipment,
    pub flight_summary: FlightSummary,
    pub counterparties: Counterparties,
}

/// A flight still open for booking, with its carrier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookableFlight {
    #[serde(flatten)]
    pub flight: Flight,
    pub carrier: Option<PartySummary>,
}

/// A shipment as listed for its carrier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarrierShipment {
    #[serde(flatten)]
    pub shipment: Shipment,
    pub sender: Option<PartySummary>,
    pub flight: FlightSummary,
}
