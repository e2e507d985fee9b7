use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde_json::json;
use shipment_core::Error as CoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ShipmentEngineError>;

#[derive(Error, Debug)]
pub enum ShipmentEngineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Shipment already confirmed: {0}")]
    AlreadyDelivered(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

impl From<validator::ValidationErrors> for ShipmentEngineError {
    fn from(err: validator::ValidationErrors) -> Self {
        ShipmentEngineError::Validation(err.to_string())
    }
}

impl ResponseError for ShipmentEngineError {
    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();
        let error_message = self.to_string();

        HttpResponse::build(status_code).json(json!({
            "error": {
                "code": status_code.as_u16(),
                "message": error_message,
                "type": self.error_type()
            }
        }))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ShipmentEngineError::Core(e) => core_status(e),
            ShipmentEngineError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ShipmentEngineError::Migration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ShipmentEngineError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ShipmentEngineError::AlreadyDelivered(_) => StatusCode::BAD_REQUEST,
            ShipmentEngineError::Validation(_) => StatusCode::BAD_REQUEST,
            ShipmentEngineError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        }
    }
}

fn core_status(err: &CoreError) -> StatusCode {
    match err {
        CoreError::Validation(_)
        | CoreError::CapacityExceeded { .. }
        | CoreError::VerificationFailed(_) => StatusCode::BAD_REQUEST,
        CoreError::FlightNotFound(_)
        | CoreError::ShipmentNotFound(_)
        | CoreError::PaymentNotFound(_)
        | CoreError::UserNotFound(_) => StatusCode::NOT_FOUND,
        CoreError::DuplicateTrackingCode(_)
        | CoreError::DuplicatePaymentReference(_)
        | CoreError::PaymentInProgress(_) => StatusCode::CONFLICT,
        CoreError::Gateway(_) => StatusCode::BAD_GATEWAY,
        CoreError::Notification(_)
        | CoreError::Storage(_)
        | CoreError::Config(_)
        | CoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ShipmentEngineError {
    fn error_type(&self) -> &str {
        match self {
            ShipmentEngineError::Core(e) => match e {
                CoreError::Validation(_) => "validation_error",
                CoreError::FlightNotFound(_)
                | CoreError::ShipmentNotFound(_)
                | CoreError::PaymentNotFound(_)
                | CoreError::UserNotFound(_) => "not_found",
                CoreError::CapacityExceeded { .. } => "capacity_exceeded",
                CoreError::DuplicateTrackingCode(_) | CoreError::DuplicatePaymentReference(_) => {
                    "duplicate_error"
                }
                CoreError::PaymentInProgress(_) => "payment_in_progress",
                CoreError::Gateway(_) => "gateway_error",
                CoreError::VerificationFailed(_) => "verification_failed",
                CoreError::Notification(_) => "notification_error",
                CoreError::Storage(_) => "database_error",
                CoreError::Config(_) => "configuration_error",
                CoreError::Internal(_) => "internal_error",
            },
            ShipmentEngineError::Database(_) => "database_error",
            ShipmentEngineError::Migration(_) => "database_error",
            ShipmentEngineError::Config(_) => "configuration_error",
            ShipmentEngineError::AlreadyDelivered(_) => "already_delivered",
            ShipmentEngineError::Validation(_) => "validation_error",
            ShipmentEngineError::Unauthorized(_) => "unauthorized",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    #[test]
    fn test_core_errors_map_to_http_statuses() {
        let cases = [
            (CoreError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (
                CoreError::CapacityExceeded {
                    requested: dec!(5),
                    available: dec!(3),
                },
                StatusCode::BAD_REQUEST,
            ),
            (CoreError::FlightNotFound(Uuid::nil()), StatusCode::NOT_FOUND),
            (CoreError::ShipmentNotFound("SHIP-X".into()), StatusCode::NOT_FOUND),
            (CoreError::Gateway("down".into()), StatusCode::BAD_GATEWAY),
            (CoreError::PaymentInProgress("ref-1".into()), StatusCode::CONFLICT),
            (CoreError::VerificationFailed("failed".into()), StatusCode::BAD_REQUEST),
            (CoreError::Storage("io".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            assert_eq!(ShipmentEngineError::from(err).status_code(), expected);
        }
    }

    #[test]
    fn test_already_delivered_is_bad_request() {
        let err = ShipmentEngineError::AlreadyDelivered("SHIP-0000000001".into());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.error_type(), "already_delivered");
    }
}
