//! FlightBridge shipment core
//!
//! Shipment lifecycle and escrow settlement for peer-to-peer air cargo:
//! travelers ("carriers") sell spare luggage allowance, senders book it, and
//! the acceptor's delivery confirmation releases payment and loyalty points.
//!
//! # Architecture
//!
//! - **Capacity ledger**: conditional per-flight weight decrements
//! - **Tracking codes**: short public handles derived from shipment ids
//! - **Lifecycle**: `CREATED -> DELIVERED`, one way, exactly once
//! - **Escrow**: gateway checkout/verify and delivery-triggered settlement
//! - **Loyalty**: carrier points credited by the delivery transition
//!
//! # Invariants
//!
//! - `available_kg` never goes negative
//! - A shipment is settled and its carrier credited at most once
//! - Multi-entity writes commit together or not at all

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, clippy::all)]

pub mod capacity;
pub mod config;
pub mod delivery;
pub mod error;
pub mod escrow;
pub mod gateway;
pub mod lifecycle;
pub mod loyalty;
pub mod notify;
pub mod store;
pub mod tracking;
pub mod types;

// Re-exports
pub use config::{EngineConfig, EngineConfigOverrides};
pub use error::{Error, Result};
pub use escrow::{EscrowSettlement, FeeSplit, InitializePayment, PaymentInitialized};
pub use gateway::{CheckoutRequest, CheckoutSession, GatewayVerification, PaymentGateway};
pub use lifecycle::{
    CreateShipment, DeliveryOutcome, DeliveryReceipt, ShipmentCreated, ShipmentLifecycle,
};
pub use notify::{LogNotifier, Notifier};
pub use store::{InMemoryStore, Store, StoreTx};
pub use tracking::TrackingCode;
pub use types::{
    Acceptor, BookableFlight, CarrierShipment, Flight, FlightStatus, FlightSummary, Payment,
    PaymentStatus, Shipment, ShipmentStatus, ShipmentView, UserAccount,
};
