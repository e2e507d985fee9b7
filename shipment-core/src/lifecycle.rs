//! Shipment lifecycle
//!
//! Owns shipment records and their one-way state machine
//! (`CREATED -> DELIVERED`). Creation reserves capacity, writes the row and
//! attaches the tracking code in one transaction; delivery runs
//! [`ConfirmDelivery`].

use crate::capacity::{CapacityLedger, ReservationResult};
use crate::config::EngineConfig;
use crate::delivery::{CommittedDelivery, ConfirmDelivery};
use crate::escrow::EscrowSettlement;
use crate::loyalty::LoyaltyLedger;
use crate::notify::{self, Notifier};
use crate::store::Store;
use crate::tracking::TrackingCode;
use crate::types::{
    ensure_scale, Acceptor, BookableFlight, CarrierShipment, Counterparties, FlightStatus,
    FlightSummary, NewShipment, Payment, Shipment, ShipmentStatus, ShipmentView,
};
use crate::{Error, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Booking request from a sender
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateShipment {
    pub flight_id: Uuid,
    pub item_weight: Decimal,
    pub acceptor: Acceptor,
    /// Amount owed for the shipment; zero when absent
    pub fee: Option<Decimal>,
}

impl CreateShipment {
    pub fn validate(&self) -> Result<()> {
        let blank = [
            ("acceptorName", &self.acceptor.name),
            ("acceptorPhone", &self.acceptor.phone),
            ("acceptorNationalID", &self.acceptor.national_id),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
        .collect::<Vec<_>>();

        if !blank.is_empty() {
            return Err(Error::Validation(format!(
                "All fields are required, missing: {}",
                blank.join(", ")
            )));
        }

        if self.item_weight <= Decimal::ZERO {
            return Err(Error::Validation(format!(
                "Item weight must be positive, got {}",
                self.item_weight
            )));
        }

        ensure_scale("itemWeight", self.item_weight)?;

        if let Some(fee) = self.fee {
            if fee < Decimal::ZERO {
                return Err(Error::Validation("Shipment fee cannot be negative".to_string()));
            }
            ensure_scale("fee", fee)?;
        }

        Ok(())
    }
}

/// A booked shipment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentCreated {
    pub shipment: Shipment,
    pub flight_summary: FlightSummary,
    /// Capacity left on the flight after this booking
    pub remaining_kg: Decimal,
    /// Best-effort side effects that did not go through
    pub warnings: Vec<String>,
}

/// Receipt of a confirmed delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryReceipt {
    pub shipment: Shipment,
    pub payment: Payment,
    pub amount_released: Decimal,
    pub platform_fee: Decimal,
    pub points_awarded: i64,
    pub warnings: Vec<String>,
}

/// Outcome of `confirm_delivery`
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
    /// This call performed the transition
    Confirmed(DeliveryReceipt),
    /// The shipment was already delivered; nothing was changed
    AlreadyDelivered(Shipment),
}

/// Shipment lifecycle service
pub struct ShipmentLifecycle {
    store: Arc<dyn Store>,
    capacity: CapacityLedger,
    escrow: Arc<EscrowSettlement>,
    loyalty: LoyaltyLedger,
    notifier: Arc<dyn Notifier>,
    config: EngineConfig,
}

impl ShipmentLifecycle {
    pub fn new(
        store: Arc<dyn Store>,
        escrow: Arc<EscrowSettlement>,
        notifier: Arc<dyn Notifier>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            capacity: CapacityLedger::new(),
            escrow,
            loyalty: LoyaltyLedger::new(config.points_per_delivery),
            notifier,
            config,
        }
    }

    pub fn escrow(&self) -> &Arc<EscrowSettlement> {
        &self.escrow
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Book `request` on behalf of `sender_id`.
    ///
    /// Capacity reservation, row insert and tracking code attachment commit
    /// together. The acceptor SMS goes out afterwards; its failure is
    /// reported in `warnings`.
    pub async fn create_shipment(
        &self,
        sender_id: Uuid,
        request: CreateShipment,
    ) -> Result<ShipmentCreated> {
        request.validate()?;

        let attempts = self.config.max_tracking_code_attempts;
        let mut attempt = 1;
        let (shipment, flight_summary, remaining_kg) = loop {
            match self.book(sender_id, &request).await {
                Err(Error::DuplicateTrackingCode(code)) if attempt < attempts => {
                    warn!(%code, attempt, "tracking code collision, retrying with a new identity");
                    attempt += 1;
                }
                Err(e) => {
                    if let Error::CapacityExceeded { requested, available } = &e {
                        info!(
                            flight_id = %request.flight_id,
                            %requested,
                            %available,
                            "shipment rejected, capacity exceeded"
                        );
                    }
                    return Err(e);
                }
                Ok(booked) => break booked,
            }
        };

        info!(
            shipment_id = %shipment.id,
            tracking_code = %shipment.tracking_code,
            flight_id = %shipment.flight_id,
            item_weight = %shipment.item_weight,
            %remaining_kg,
            "shipment created"
        );

        let sender_name = match self.store.user(sender_id).await {
            Ok(sender) => sender.map(|u| u.full_name),
            Err(e) => {
                warn!(%sender_id, error = %e, "sender lookup failed, sending anonymous notice");
                None
            }
        };
        let message = notify::acceptor_message(
            &shipment.acceptor.name,
            sender_name.as_deref(),
            &shipment.tracking_code,
            &flight_summary,
        );
        let warnings = notify::dispatch(self.notifier.as_ref(), &shipment.acceptor.phone, &message)
            .await
            .into_iter()
            .collect();

        Ok(ShipmentCreated {
            shipment,
            flight_summary,
            remaining_kg,
            warnings,
        })
    }

    async fn book(
        &self,
        sender_id: Uuid,
        request: &CreateShipment,
    ) -> Result<(Shipment, FlightSummary, Decimal)> {
        let mut tx = self.store.begin().await?;

        let flight = tx
            .flight(request.flight_id)
            .await?
            .ok_or(Error::FlightNotFound(request.flight_id))?;

        if flight.status == FlightStatus::Canceled {
            return Err(Error::Validation(format!(
                "Flight {} is canceled",
                flight.id
            )));
        }

        let remaining_kg = match self
            .capacity
            .reserve(tx.as_mut(), flight.id, request.item_weight)
            .await?
        {
            ReservationResult::Reserved { remaining } => remaining,
            ReservationResult::InsufficientCapacity {
                requested,
                available,
            } => return Err(Error::CapacityExceeded { requested, available }),
        };

        let new_shipment = NewShipment {
            id: Uuid::new_v4(),
            sender_id,
            carrier_id: flight.carrier_id,
            flight_id: flight.id,
            item_weight: request.item_weight,
            acceptor: request.acceptor.clone(),
            fee: request.fee.unwrap_or(Decimal::ZERO),
            created_at: Utc::now(),
        };
        tx.insert_shipment(&new_shipment).await?;

        let code = TrackingCode::generate(&self.config.tracking_code_prefix, &new_shipment.id);
        let shipment = tx.attach_tracking_code(new_shipment.id, &code).await?;

        tx.commit().await?;

        Ok((shipment, flight.summary(), remaining_kg))
    }

    /// Public tracking lookup
    pub async fn track_by_code(&self, tracking_code: &str) -> Result<ShipmentView> {
        let shipment = self.find_by_code(tracking_code).await?;

        let flight = self
            .store
            .flight(shipment.flight_id)
            .await?
            .ok_or(Error::FlightNotFound(shipment.flight_id))?;
        let sender = self.store.user(shipment.sender_id).await?;
        let carrier = self.store.user(shipment.carrier_id).await?;

        Ok(ShipmentView {
            flight_summary: flight.summary(),
            counterparties: Counterparties {
                sender: sender.map(|u| u.summary()),
                carrier: carrier.map(|u| u.summary()),
            },
            shipment,
        })
    }

    /// Confirm delivery of the shipment behind `tracking_code`.
    ///
    /// Exactly one caller per shipment gets `Confirmed`; every other call,
    /// concurrent or later, gets `AlreadyDelivered` and changes nothing.
    pub async fn confirm_delivery(&self, tracking_code: &str) -> Result<DeliveryOutcome> {
        let shipment = self.find_by_code(tracking_code).await?;

        if shipment.status == ShipmentStatus::Delivered {
            info!(tracking_code = %shipment.tracking_code, "delivery already confirmed");
            return Ok(DeliveryOutcome::AlreadyDelivered(shipment));
        }

        let committed = ConfirmDelivery::new(shipment.id, &self.escrow, &self.loyalty)
            .execute(self.store.as_ref())
            .await?;

        let Some(CommittedDelivery {
            shipment,
            settlement,
            carrier_points,
            points_awarded,
        }) = committed
        else {
            info!(tracking_code = %shipment.tracking_code, "delivery confirmed by a concurrent request");
            let current = self
                .store
                .shipment(shipment.id)
                .await?
                .ok_or_else(|| Error::ShipmentNotFound(shipment.tracking_code.to_string()))?;
            return Ok(DeliveryOutcome::AlreadyDelivered(current));
        };

        let mut warnings = Vec::new();
        match self.store.user(shipment.carrier_id).await {
            Ok(Some(carrier)) => {
                let message = notify::carrier_release_message(
                    &shipment.tracking_code,
                    settlement.split.amount_to_carrier,
                    carrier_points,
                );
                warnings.extend(
                    notify::dispatch(self.notifier.as_ref(), &carrier.phone, &message).await,
                );
            }
            Ok(None) => {}
            Err(e) => {
                warn!(carrier_id = %shipment.carrier_id, error = %e, "carrier lookup failed");
                warnings.push(format!("Carrier notification skipped: {}", e));
            }
        }

        Ok(DeliveryOutcome::Confirmed(DeliveryReceipt {
            amount_released: settlement.split.amount_to_carrier,
            platform_fee: settlement.split.platform_fee,
            payment: settlement.payment,
            shipment,
            points_awarded,
            warnings,
        }))
    }

    /// Flights a sender can still book, earliest departure first
    pub async fn available_flights(&self) -> Result<Vec<BookableFlight>> {
        let flights = self.store.bookable_flights().await?;
        let mut listed = Vec::with_capacity(flights.len());
        for flight in flights {
            let carrier = self.store.user(flight.carrier_id).await?;
            listed.push(BookableFlight {
                carrier: carrier.map(|u| u.summary()),
                flight,
            });
        }
        Ok(listed)
    }

    /// Shipments carried by `carrier_id`, newest first
    pub async fn carrier_shipments(&self, carrier_id: Uuid) -> Result<Vec<CarrierShipment>> {
        let shipments = self.store.shipments_for_carrier(carrier_id).await?;
        let mut listed = Vec::with_capacity(shipments.len());
        for shipment in shipments {
            let flight = self
                .store
                .flight(shipment.flight_id)
                .await?
                .ok_or(Error::FlightNotFound(shipment.flight_id))?;
            let sender = self.store.user(shipment.sender_id).await?;
            listed.push(CarrierShipment {
                sender: sender.map(|u| u.summary()),
                flight: flight.summary(),
                shipment,
            });
        }
        Ok(listed)
    }

    /// Loyalty points of a user
    pub async fn carrier_points(&self, user_id: Uuid) -> Result<i64> {
        self.loyalty.points(self.store.as_ref(), user_id).await
    }

    async fn find_by_code(&self, tracking_code: &str) -> Result<Shipment> {
        let code = TrackingCode::parse(tracking_code)
            .map_err(|_| Error::ShipmentNotFound(tracking_code.to_string()))?;
        self.store
            .shipment_by_code(&code)
            .await?
            .ok_or_else(|| Error::ShipmentNotFound(code.to_string()))
    }
}
