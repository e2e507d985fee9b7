//! In-memory store
//!
//! A single async mutex guards the whole state, so transactions run one at a
//! time. A transaction works on a private copy of the state and swaps it in
//! on commit; dropping it leaves the shared state untouched.

use super::{CapacityUpdate, Store, StoreTx};
use crate::tracking::TrackingCode;
use crate::types::{
    Flight, FlightStatus, NewShipment, Payment, PaymentStatus, Shipment, ShipmentStatus,
    UserAccount,
};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex as SyncMutex;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Points at which a one-shot storage failure can be injected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    DecrementCapacity,
    InsertShipment,
    AttachTrackingCode,
    MarkDelivered,
    ReleasePayment,
    InsertPayment,
    MarkPaymentPaid,
    CreditBalance,
    CreditPoints,
    Commit,
}

#[derive(Debug, Clone)]
struct ShipmentRow {
    record: NewShipment,
    tracking_code: Option<TrackingCode>,
    status: ShipmentStatus,
}

impl ShipmentRow {
    fn to_shipment(&self) -> Option<Shipment> {
        let code = self.tracking_code.clone()?;
        let mut shipment = self.record.clone().with_tracking_code(code);
        shipment.status = self.status;
        Some(shipment)
    }
}

#[derive(Debug, Clone, Default)]
struct State {
    flights: HashMap<Uuid, Flight>,
    users: HashMap<Uuid, UserAccount>,
    shipments: HashMap<Uuid, ShipmentRow>,
    /// Insertion order
    payments: Vec<Payment>,
}

impl State {
    fn shipment_by_code(&self, code: &TrackingCode) -> Option<&ShipmentRow> {
        self.shipments
            .values()
            .find(|row| row.tracking_code.as_ref() == Some(code))
    }
}

/// Store backed by process memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
    failpoints: Arc<SyncMutex<HashSet<FailPoint>>>,
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a flight
    pub async fn insert_flight(&self, flight: Flight) {
        self.state.lock().await.flights.insert(flight.id, flight);
    }

    /// Add or replace a user account
    pub async fn insert_user(&self, user: UserAccount) {
        self.state.lock().await.users.insert(user.id, user);
    }

    /// Every payment row, in insertion order
    pub async fn payments(&self) -> Vec<Payment> {
        self.state.lock().await.payments.clone()
    }

    /// Make the next transaction that reaches `point` fail with a storage
    /// error. Fires once.
    pub fn fail_next(&self, point: FailPoint) {
        self.failpoints.lock().insert(point);
    }
}

fn trip(failpoints: &SyncMutex<HashSet<FailPoint>>, point: FailPoint) -> Result<()> {
    if failpoints.lock().remove(&point) {
        return Err(Error::Storage(format!("injected failure at {:?}", point)));
    }
    Ok(())
}

#[async_trait]
impl Store for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx {
            guard,
            working,
            failpoints: self.failpoints.clone(),
        }))
    }

    async fn flight(&self, flight_id: Uuid) -> Result<Option<Flight>> {
        Ok(self.state.lock().await.flights.get(&flight_id).cloned())
    }

    async fn user(&self, user_id: Uuid) -> Result<Option<UserAccount>> {
        Ok(self.state.lock().await.users.get(&user_id).cloned())
    }

    async fn shipment_by_code(&self, code: &TrackingCode) -> Result<Option<Shipment>> {
        let state = self.state.lock().await;
        Ok(state.shipment_by_code(code).and_then(ShipmentRow::to_shipment))
    }

    async fn shipment(&self, shipment_id: Uuid) -> Result<Option<Shipment>> {
        let state = self.state.lock().await;
        Ok(state
            .shipments
            .get(&shipment_id)
            .and_then(ShipmentRow::to_shipment))
    }

    async fn shipments_for_carrier(&self, carrier_id: Uuid) -> Result<Vec<Shipment>> {
        let state = self.state.lock().await;
        let mut shipments: Vec<Shipment> = state
            .shipments
            .values()
            .filter(|row| row.record.carrier_id == carrier_id)
            .filter_map(ShipmentRow::to_shipment)
            .collect();
        shipments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(shipments)
    }

    async fn bookable_flights(&self) -> Result<Vec<Flight>> {
        let state = self.state.lock().await;
        let mut flights: Vec<Flight> = state
            .flights
            .values()
            .filter(|f| f.available_kg > Decimal::ZERO && f.status == FlightStatus::OnTime)
            .cloned()
            .collect();
        flights.sort_by(|a, b| a.departure_date.cmp(&b.departure_date));
        Ok(flights)
    }

    async fn payment_by_reference(&self, reference: &str) -> Result<Option<Payment>> {
        let state = self.state.lock().await;
        Ok(state
            .payments
            .iter()
            .find(|p| p.reference == reference)
            .cloned())
    }

    async fn payments_for_shipment(&self, shipment_id: Uuid) -> Result<Vec<Payment>> {
        let state = self.state.lock().await;
        Ok(state
            .payments
            .iter()
            .filter(|p| p.shipment_id == shipment_id)
            .cloned()
            .collect())
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<State>,
    working: State,
    failpoints: Arc<SyncMutex<HashSet<FailPoint>>>,
}

impl MemoryTx {
    fn trip(&self, point: FailPoint) -> Result<()> {
        trip(&self.failpoints, point)
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn flight(&mut self, flight_id: Uuid) -> Result<Option<Flight>> {
        Ok(self.working.flights.get(&flight_id).cloned())
    }

    async fn decrement_capacity(
        &mut self,
        flight_id: Uuid,
        weight: Decimal,
    ) -> Result<CapacityUpdate> {
        self.trip(FailPoint::DecrementCapacity)?;

        let Some(flight) = self.working.flights.get_mut(&flight_id) else {
            return Ok(CapacityUpdate::Missing);
        };

        if flight.available_kg < weight {
            return Ok(CapacityUpdate::Insufficient {
                available: flight.available_kg,
            });
        }

        flight.available_kg -= weight;
        Ok(CapacityUpdate::Applied {
            remaining: flight.available_kg,
        })
    }

    async fn insert_shipment(&mut self, shipment: &NewShipment) -> Result<()> {
        self.trip(FailPoint::InsertShipment)?;

        if self.working.shipments.contains_key(&shipment.id) {
            return Err(Error::Storage(format!(
                "shipment {} already exists",
                shipment.id
            )));
        }

        self.working.shipments.insert(
            shipment.id,
            ShipmentRow {
                record: shipment.clone(),
                tracking_code: None,
                status: ShipmentStatus::Created,
            },
        );
        Ok(())
    }

    async fn attach_tracking_code(
        &mut self,
        shipment_id: Uuid,
        code: &TrackingCode,
    ) -> Result<Shipment> {
        self.trip(FailPoint::AttachTrackingCode)?;

        if self.working.shipment_by_code(code).is_some() {
            return Err(Error::DuplicateTrackingCode(code.to_string()));
        }

        let row = self
            .working
            .shipments
            .get_mut(&shipment_id)
            .ok_or_else(|| Error::ShipmentNotFound(shipment_id.to_string()))?;

        if row.tracking_code.is_some() {
            return Err(Error::Internal(format!(
                "shipment {} already has a tracking code",
                shipment_id
            )));
        }

        row.tracking_code = Some(code.clone());
        row.to_shipment()
            .ok_or_else(|| Error::Internal("tracking code not attached".to_string()))
    }

    async fn shipment(&mut self, shipment_id: Uuid) -> Result<Option<Shipment>> {
        Ok(self
            .working
            .shipments
            .get(&shipment_id)
            .and_then(ShipmentRow::to_shipment))
    }

    async fn mark_delivered(&mut self, shipment_id: Uuid) -> Result<Option<Shipment>> {
        self.trip(FailPoint::MarkDelivered)?;

        match self.working.shipments.get_mut(&shipment_id) {
            Some(row) if row.status == ShipmentStatus::Created => {
                row.status = ShipmentStatus::Delivered;
                Ok(row.to_shipment())
            }
            _ => Ok(None),
        }
    }

    async fn open_payment(&mut self, shipment_id: Uuid) -> Result<Option<Payment>> {
        Ok(self
            .working
            .payments
            .iter()
            .rev()
            .find(|p| p.shipment_id == shipment_id && p.status.is_open())
            .cloned())
    }

    async fn release_payment(
        &mut self,
        payment_id: Uuid,
        platform_fee: Decimal,
        released_at: DateTime<Utc>,
    ) -> Result<Option<Payment>> {
        self.trip(FailPoint::ReleasePayment)?;

        match self.working.payments.iter_mut().find(|p| p.id == payment_id) {
            Some(payment) if payment.status != PaymentStatus::Released => {
                payment.status = PaymentStatus::Released;
                payment.platform_fee = Some(platform_fee);
                payment.released_at = Some(released_at);
                Ok(Some(payment.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<Payment> {
        self.trip(FailPoint::InsertPayment)?;

        if self
            .working
            .payments
            .iter()
            .any(|p| p.reference == payment.reference)
        {
            return Err(Error::DuplicatePaymentReference(payment.reference.clone()));
        }

        if payment.status.is_open() {
            if let Some(open) = self
                .working
                .payments
                .iter()
                .find(|p| p.shipment_id == payment.shipment_id && p.status.is_open())
            {
                return Err(Error::PaymentInProgress(open.reference.clone()));
            }
        }

        self.working.payments.push(payment.clone());
        Ok(payment.clone())
    }

    async fn mark_payment_paid(&mut self, reference: &str) -> Result<Option<Payment>> {
        self.trip(FailPoint::MarkPaymentPaid)?;

        match self
            .working
            .payments
            .iter_mut()
            .find(|p| p.reference == reference)
        {
            Some(payment) if payment.status == PaymentStatus::Pending => {
                payment.status = PaymentStatus::Paid;
                Ok(Some(payment.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn credit_balance(&mut self, user_id: Uuid, amount: Decimal) -> Result<Decimal> {
        self.trip(FailPoint::CreditBalance)?;

        let user = self
            .working
            .users
            .get_mut(&user_id)
            .ok_or(Error::UserNotFound(user_id))?;
        user.balance += amount;
        Ok(user.balance)
    }

    async fn credit_points(&mut self, user_id: Uuid, points: i64) -> Result<i64> {
        self.trip(FailPoint::CreditPoints)?;

        let user = self
            .working
            .users
            .get_mut(&user_id)
            .ok_or(Error::UserNotFound(user_id))?;
        user.points += points;
        Ok(user.points)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.trip(FailPoint::Commit)?;

        let MemoryTx {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }
}
