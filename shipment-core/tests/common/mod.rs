//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use shipment_core::{
    Acceptor, CheckoutRequest, CheckoutSession, CreateShipment, EngineConfig, Error,
    EscrowSettlement, Flight, FlightStatus, GatewayVerification, InMemoryStore, Notifier,
    PaymentGateway, Result, ShipmentLifecycle, Store, UserAccount,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Notify;
use uuid::Uuid;

/// Gateway that answers from a script and records every call
#[derive(Default)]
pub struct ScriptedGateway {
    pub reject_initialize: Mutex<bool>,
    pub assigned_reference: Mutex<Option<String>>,
    pub outcomes: Mutex<HashMap<String, bool>>,
    pub initialize_calls: Mutex<Vec<CheckoutRequest>>,
    pub verify_calls: Mutex<Vec<String>>,
    /// (entered, release): checkout signals `entered`, then waits on `release`
    pub hold: Mutex<Option<(Arc<Notify>, Arc<Notify>)>>,
}

impl ScriptedGateway {
    pub fn set_outcome(&self, reference: &str, successful: bool) {
        self.outcomes.lock().insert(reference.to_string(), successful);
    }

    pub fn verify_count(&self) -> usize {
        self.verify_calls.lock().len()
    }

    /// Park the next checkouts inside the gateway until `release` fires.
    /// Returns (entered, release).
    pub fn hold_initialize(&self) -> (Arc<Notify>, Arc<Notify>) {
        let pair = (Arc::new(Notify::new()), Arc::new(Notify::new()));
        *self.hold.lock() = Some(pair.clone());
        pair
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn initialize(&self, request: &CheckoutRequest) -> Result<CheckoutSession> {
        self.initialize_calls.lock().push(request.clone());
        let hold = self.hold.lock().clone();
        if let Some((entered, release)) = hold {
            entered.notify_one();
            release.notified().await;
        }
        if *self.reject_initialize.lock() {
            return Err(Error::Gateway("checkout rejected".to_string()));
        }
        Ok(CheckoutSession {
            checkout_url: format!("https://checkout.test/{}", request.reference),
            reference: self.assigned_reference.lock().clone(),
        })
    }

    async fn verify(&self, reference: &str) -> Result<GatewayVerification> {
        self.verify_calls.lock().push(reference.to_string());
        let successful = self.outcomes.lock().get(reference).copied().unwrap_or(false);
        Ok(GatewayVerification {
            successful,
            detail: if successful { "success" } else { "failed" }.to_string(),
        })
    }
}

/// Notifier that records messages and can be switched to fail
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, String)>>,
    pub failing: Mutex<bool>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_sms(&self, phone: &str, message: &str) -> Result<()> {
        if *self.failing.lock() {
            return Err(Error::Notification("sms gateway unreachable".to_string()));
        }
        self.sent.lock().push((phone.to_string(), message.to_string()));
        Ok(())
    }
}

pub struct Harness {
    pub store: InMemoryStore,
    pub gateway: Arc<ScriptedGateway>,
    pub notifier: Arc<RecordingNotifier>,
    pub lifecycle: Arc<ShipmentLifecycle>,
    pub sender: UserAccount,
    pub carrier: UserAccount,
}

impl Harness {
    pub async fn new() -> Self {
        let store = InMemoryStore::new();
        let gateway = Arc::new(ScriptedGateway::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let config = EngineConfig::default();

        let dyn_store: Arc<dyn Store> = Arc::new(store.clone());
        let escrow = Arc::new(EscrowSettlement::new(
            dyn_store.clone(),
            gateway.clone(),
            config.fee_rate,
            config.payment_callback_url.clone(),
        ));
        let lifecycle = Arc::new(ShipmentLifecycle::new(
            dyn_store,
            escrow,
            notifier.clone(),
            config,
        ));

        let sender = user("Sara Tesfaye", "+251911111111");
        let carrier = user("Dawit Alemu", "+251922222222");
        store.insert_user(sender.clone()).await;
        store.insert_user(carrier.clone()).await;

        Self {
            store,
            gateway,
            notifier,
            lifecycle,
            sender,
            carrier,
        }
    }

    pub async fn flight(&self, available_kg: Decimal) -> Flight {
        let flight = Flight {
            id: Uuid::new_v4(),
            carrier_id: self.carrier.id,
            from: "Addis Ababa".to_string(),
            to: "Dubai".to_string(),
            departure_date: Utc::now() + Duration::days(3),
            available_kg,
            status: FlightStatus::OnTime,
        };
        self.store.insert_flight(flight.clone()).await;
        flight
    }

    pub async fn carrier_account(&self) -> UserAccount {
        self.store.user(self.carrier.id).await.unwrap().unwrap()
    }

    pub async fn available_kg(&self, flight_id: Uuid) -> Decimal {
        self.store.flight(flight_id).await.unwrap().unwrap().available_kg
    }
}

pub fn user(name: &str, phone: &str) -> UserAccount {
    UserAccount {
        id: Uuid::new_v4(),
        full_name: name.to_string(),
        phone: phone.to_string(),
        email: None,
        balance: Decimal::ZERO,
        points: 0,
    }
}

pub fn booking(flight_id: Uuid, item_weight: Decimal, fee: Option<Decimal>) -> CreateShipment {
    CreateShipment {
        flight_id,
        item_weight,
        acceptor: Acceptor {
            name: "Hana Girma".to_string(),
            phone: "+971500000000".to_string(),
            national_id: "784-1990-1234567-1".to_string(),
        },
        fee,
    }
}
