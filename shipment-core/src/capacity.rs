//! Capacity ledger
//!
//! Sole writer of `Flight::available_kg`. Reservations are conditional
//! decrements inside the caller's transaction, so two bookings against the
//! same flight can never both succeed when their combined weight exceeds
//! what is left.

use crate::store::{CapacityUpdate, StoreTx};
use crate::{Error, Result};
use rust_decimal::Decimal;
use tracing::debug;
use uuid::Uuid;

/// Result of a reservation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationResult {
    /// Weight reserved; `remaining` is what the flight can still take
    Reserved { remaining: Decimal },
    /// Flight cannot carry the weight; nothing was written
    InsufficientCapacity { requested: Decimal, available: Decimal },
}

/// Per-flight capacity bookkeeping
#[derive(Debug, Clone, Copy, Default)]
pub struct CapacityLedger;

impl CapacityLedger {
    pub fn new() -> Self {
        CapacityLedger
    }

    /// Reserve `weight` kg on `flight_id`.
    ///
    /// The decrement becomes visible only when `tx` commits. Fails with
    /// `FlightNotFound` for an unknown flight and `Validation` for a
    /// non-positive weight.
    pub async fn reserve(
        &self,
        tx: &mut dyn StoreTx,
        flight_id: Uuid,
        weight: Decimal,
    ) -> Result<ReservationResult> {
        if weight <= Decimal::ZERO {
            return Err(Error::Validation(format!(
                "Reservation weight must be positive, got {}",
                weight
            )));
        }

        match tx.decrement_capacity(flight_id, weight).await? {
            CapacityUpdate::Applied { remaining } => {
                debug!(%flight_id, %weight, %remaining, "capacity reserved");
                Ok(ReservationResult::Reserved { remaining })
            }
            CapacityUpdate::Insufficient { available } => {
                Ok(ReservationResult::InsufficientCapacity {
                    requested: weight,
                    available,
                })
            }
            CapacityUpdate::Missing => Err(Error::FlightNotFound(flight_id)),
        }
    }
}
