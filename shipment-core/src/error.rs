//! Error types for the shipment engine

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Engine errors
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or malformed input; the caller must resubmit
    #[error("Validation error: {0}")]
    Validation(String),

    /// Flight not found
    #[error("Flight not found: {0}")]
    FlightNotFound(Uuid),

    /// Shipment not found (by id or tracking code)
    #[error("Shipment not found: {0}")]
    ShipmentNotFound(String),

    /// Payment not found (by reference)
    #[error("Payment not found: {0}")]
    PaymentNotFound(String),

    /// User (sender or carrier) not found
    #[error("User not found: {0}")]
    UserNotFound(Uuid),

    /// Item weight exceeds what the flight can still carry
    #[error("Item weight exceeds available flight capacity: requested {requested} kg, available {available} kg")]
    CapacityExceeded {
        /// Requested weight
        requested: Decimal,
        /// Weight still available on the flight
        available: Decimal,
    },

    /// A generated tracking code collided with an existing one
    #[error("Tracking code already assigned: {0}")]
    DuplicateTrackingCode(String),

    /// A payment with this reference already exists
    #[error("Payment reference already exists: {0}")]
    DuplicatePaymentReference(String),

    /// The shipment already has a payment holding escrow funds
    #[error("Shipment already has an open payment: {0}")]
    PaymentInProgress(String),

    /// Payment gateway rejected or failed the request
    #[error("Payment gateway error: {0}")]
    Gateway(String),

    /// Payment gateway did not confirm the transaction
    #[error("Payment verification failed: {0}")]
    VerificationFailed(String),

    /// Outbound notification failed
    #[error("Notification failed: {0}")]
    Notification(String),

    /// Backing store failure; the transaction was not committed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invariant violation or unexpected state
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the caller may safely retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Gateway(_)
                | Error::Notification(_)
                | Error::Storage(_)
                | Error::DuplicateTrackingCode(_)
        )
    }

    /// Business outcomes that are expected and not logged as failures.
    pub fn is_business_rejection(&self) -> bool {
        matches!(self, Error::CapacityExceeded { .. })
    }
}
