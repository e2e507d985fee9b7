//! Persistence boundary
//!
//! [`Store`] serves plain reads and opens transactions. Every write goes
//! through a [`StoreTx`]: nothing it does is visible to other callers until
//! [`StoreTx::commit`] returns, and dropping an uncommitted transaction
//! discards all of its writes.
//!
//! Mutating methods are conditional updates. Implementations must apply each
//! one as a single atomic step against the backing store (for SQL, one
//! `UPDATE ... WHERE <guard> RETURNING`), never as a read followed by a
//! separate write.

pub mod memory;

use crate::tracking::TrackingCode;
use crate::types::{Flight, NewShipment, Payment, Shipment, UserAccount};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

pub use memory::{FailPoint, InMemoryStore};

/// Outcome of a conditional capacity decrement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityUpdate {
    /// Decrement applied; remaining weight on the flight
    Applied { remaining: Decimal },
    /// Flight exists but cannot carry the requested weight; nothing written
    Insufficient { available: Decimal },
    /// No such flight
    Missing,
}

/// Read access and transaction factory
#[async_trait]
pub trait Store: Send + Sync {
    /// Open a transaction
    async fn begin(&self) -> Result<Box<dyn StoreTx>>;

    async fn flight(&self, flight_id: Uuid) -> Result<Option<Flight>>;

    async fn user(&self, user_id: Uuid) -> Result<Option<UserAccount>>;

    async fn shipment_by_code(&self, code: &TrackingCode) -> Result<Option<Shipment>>;

    async fn shipment(&self, shipment_id: Uuid) -> Result<Option<Shipment>>;

    /// Shipments carried by `carrier_id`, newest first
    async fn shipments_for_carrier(&self, carrier_id: Uuid) -> Result<Vec<Shipment>>;

    /// On-time flights with capacity left, earliest departure first
    async fn bookable_flights(&self) -> Result<Vec<Flight>>;

    async fn payment_by_reference(&self, reference: &str) -> Result<Option<Payment>>;

    async fn payments_for_shipment(&self, shipment_id: Uuid) -> Result<Vec<Payment>>;
}

/// A unit of work with all-or-nothing commit
#[async_trait]
pub trait StoreTx: Send {
    async fn flight(&mut self, flight_id: Uuid) -> Result<Option<Flight>>;

    /// Decrement `available_kg` by `weight` iff the result stays non-negative
    async fn decrement_capacity(&mut self, flight_id: Uuid, weight: Decimal)
        -> Result<CapacityUpdate>;

    /// Insert a shipment row in `CREATED` state without a tracking code
    async fn insert_shipment(&mut self, shipment: &NewShipment) -> Result<()>;

    /// Set the tracking code of a shipment that has none.
    ///
    /// Fails with `DuplicateTrackingCode` when another shipment holds the code.
    async fn attach_tracking_code(
        &mut self,
        shipment_id: Uuid,
        code: &TrackingCode,
    ) -> Result<Shipment>;

    /// Read a shipment and hold it against concurrent status changes until
    /// the transaction ends. `None` when missing or without a tracking code.
    async fn shipment(&mut self, shipment_id: Uuid) -> Result<Option<Shipment>>;

    /// Flip `CREATED` to `DELIVERED`. Returns `None` when the shipment is
    /// missing or not in `CREATED`.
    async fn mark_delivered(&mut self, shipment_id: Uuid) -> Result<Option<Shipment>>;

    /// The most recent payment of a shipment still holding funds in escrow
    /// (`pending` or `paid`), if any
    async fn open_payment(&mut self, shipment_id: Uuid) -> Result<Option<Payment>>;

    /// Move a `pending` or `paid` payment to `released`. Returns `None` if it
    /// was already released.
    async fn release_payment(
        &mut self,
        payment_id: Uuid,
        platform_fee: Decimal,
        released_at: DateTime<Utc>,
    ) -> Result<Option<Payment>>;

    /// Insert a payment row. Fails with `DuplicatePaymentReference` when the
    /// reference is taken, and with `PaymentInProgress` when an open row is
    /// inserted for a shipment that already has one.
    async fn insert_payment(&mut self, payment: &Payment) -> Result<Payment>;

    /// Move a `pending` payment to `paid`. Returns `None` if no pending
    /// payment has that reference.
    async fn mark_payment_paid(&mut self, reference: &str) -> Result<Option<Payment>>;

    /// Add `amount` to a user's balance
    async fn credit_balance(&mut self, user_id: Uuid, amount: Decimal) -> Result<Decimal>;

    /// Add `points` to a user's loyalty counter
    async fn credit_points(&mut self, user_id: Uuid, points: i64) -> Result<i64>;

    /// Make every write of this transaction visible
    async fn commit(self: Box<Self>) -> Result<()>;
}
