use crate::errors::{Result, ShipmentEngineError};
use crate::metrics;
use crate::models::{
    CreateShipmentRequest, DeliveryConfirmedResponse, InitializePaymentRequest,
    PaymentInitializedResponse, PaymentVerifiedResponse, PointsResponse, ShipmentCreatedResponse,
};
use shipment_core::{
    BookableFlight, CarrierShipment, DeliveryOutcome, Error as CoreError, ShipmentLifecycle,
    ShipmentView,
};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

pub struct ShipmentService {
    lifecycle: Arc<ShipmentLifecycle>,
    default_currency: String,
}

impl ShipmentService {
    pub fn new(lifecycle: Arc<ShipmentLifecycle>, default_currency: impl Into<String>) -> Self {
        ShipmentService {
            lifecycle,
            default_currency: default_currency.into(),
        }
    }

    pub fn lifecycle(&self) -> &Arc<ShipmentLifecycle> {
        &self.lifecycle
    }

    /// Book a shipment for the calling sender
    pub async fn create_shipment(
        &self,
        sender_id: Uuid,
        request: CreateShipmentRequest,
    ) -> Result<ShipmentCreatedResponse> {
        let command = request.into_command()?;

        let created = match self.lifecycle.create_shipment(sender_id, command).await {
            Ok(created) => created,
            Err(e) => {
                if matches!(e, CoreError::CapacityExceeded { .. }) {
                    metrics::CAPACITY_REJECTIONS.inc();
                }
                return Err(e.into());
            }
        };

        metrics::SHIPMENTS_CREATED.inc();
        Ok(ShipmentCreatedResponse {
            message: if created.warnings.is_empty() {
                "Shipment request created and SMS sent".to_string()
            } else {
                "Shipment request created".to_string()
            },
            shipment: created.shipment,
            remaining_kg: created.remaining_kg,
            warnings: created.warnings,
        })
    }

    pub async fn track(&self, tracking_code: &str) -> Result<ShipmentView> {
        Ok(self.lifecycle.track_by_code(tracking_code).await?)
    }

    /// Confirm delivery; a repeat confirmation is a 400 with a notice
    pub async fn confirm_delivery(&self, tracking_code: &str) -> Result<DeliveryConfirmedResponse> {
        match self.lifecycle.confirm_delivery(tracking_code).await? {
            DeliveryOutcome::Confirmed(receipt) => {
                metrics::DELIVERIES_CONFIRMED.inc();
                Ok(DeliveryConfirmedResponse {
                    message: "Delivery confirmed. Payment released and carrier points awarded!"
                        .to_string(),
                    shipment: receipt.shipment,
                    amount_released: receipt.amount_released,
                    platform_fee: receipt.platform_fee,
                    points_awarded: receipt.points_awarded,
                    warnings: receipt.warnings,
                })
            }
            DeliveryOutcome::AlreadyDelivered(shipment) => {
                metrics::DUPLICATE_CONFIRMATIONS.inc();
                info!(tracking_code = %shipment.tracking_code, "repeat delivery confirmation rejected");
                Err(ShipmentEngineError::AlreadyDelivered(
                    shipment.tracking_code.to_string(),
                ))
            }
        }
    }

    pub async fn initialize_payment(
        &self,
        request: InitializePaymentRequest,
    ) -> Result<PaymentInitializedResponse> {
        let command = request.into_command(&self.default_currency)?;

        let initialized = self
            .lifecycle
            .escrow()
            .initialize(command)
            .await
            .map_err(|e| {
                if matches!(e, CoreError::Gateway(_)) {
                    metrics::GATEWAY_ERRORS.with_label_values(&["initialize"]).inc();
                }
                e
            })?;

        metrics::PAYMENTS_INITIALIZED.inc();
        Ok(PaymentInitializedResponse {
            message: "Payment initialized".to_string(),
            checkout_url: initialized.checkout_url,
            payment: initialized.payment,
        })
    }

    pub async fn verify_payment(&self, reference: &str) -> Result<PaymentVerifiedResponse> {
        let payment = self
            .lifecycle
            .escrow()
            .verify(reference)
            .await
            .map_err(|e| {
                if matches!(e, CoreError::Gateway(_)) {
                    error!(reference, error = %e, "payment verification could not reach gateway");
                    metrics::GATEWAY_ERRORS.with_label_values(&["verify"]).inc();
                }
                e
            })?;

        metrics::PAYMENTS_VERIFIED.inc();
        Ok(PaymentVerifiedResponse {
            message: "Payment verified successfully".to_string(),
            payment,
        })
    }

    pub async fn available_flights(&self) -> Result<Vec<BookableFlight>> {
        Ok(self.lifecycle.available_flights().await?)
    }

    pub async fn carrier_shipments(&self, carrier_id: Uuid) -> Result<Vec<CarrierShipment>> {
        Ok(self.lifecycle.carrier_shipments(carrier_id).await?)
    }

    pub async fn points(&self, user_id: Uuid) -> Result<PointsResponse> {
        let points = self.lifecycle.carrier_points(user_id).await?;
        Ok(PointsResponse { user_id, points })
    }
}
