//! Escrow settlement
//!
//! Owns payment records and the platform-fee split. Two entry points:
//!
//! - the explicit gateway flow (`initialize` then `verify`), driven by the
//!   sender paying for a shipment;
//! - `settle`, run only inside the delivery transition, which releases the
//!   escrowed payment (or records one) and credits the carrier.

use crate::gateway::{CheckoutRequest, PaymentGateway};
use crate::store::{Store, StoreTx};
use crate::types::{
    ensure_scale, Payment, PaymentStatus, Shipment, ShipmentStatus, DECIMAL_PLACES,
};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Minor-unit precision of settled amounts
const MONEY_DP: u32 = DECIMAL_PLACES;

/// Split of a shipment fee between platform and carrier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeSplit {
    pub fee: Decimal,
    pub platform_fee: Decimal,
    pub amount_to_carrier: Decimal,
}

impl FeeSplit {
    /// `platform_fee = fee * rate` rounded to cents; the carrier gets the
    /// rest, so the two parts always sum to `fee`.
    pub fn compute(fee: Decimal, rate: Decimal) -> Self {
        let platform_fee = (fee * rate).round_dp(MONEY_DP);
        Self {
            fee,
            platform_fee,
            amount_to_carrier: fee - platform_fee,
        }
    }
}

/// Which payment path a settlement took
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementAction {
    /// An escrowed payment was moved to `released`
    ReleasedExisting,
    /// No escrowed payment existed; a `released` row was recorded
    CreatedReleased,
}

/// Result of settling one shipment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    pub payment: Payment,
    pub split: FeeSplit,
    pub action: SettlementAction,
    /// Carrier balance after the credit, when one was applied
    pub carrier_balance: Option<Decimal>,
}

/// Checkout request from a sender
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializePayment {
    pub shipment_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub customer_email: String,
    pub customer_name: String,
}

impl InitializePayment {
    fn validate(&self) -> Result<()> {
        if self.amount <= Decimal::ZERO {
            return Err(Error::Validation("Payment amount must be positive".to_string()));
        }
        ensure_scale("amount", self.amount)?;
        if self.currency.trim().is_empty() {
            return Err(Error::Validation("Currency is required".to_string()));
        }
        if self.customer_name.trim().is_empty() {
            return Err(Error::Validation("Customer name is required".to_string()));
        }
        if !self.customer_email.contains('@') {
            return Err(Error::Validation(format!(
                "Invalid customer email: {}",
                self.customer_email
            )));
        }
        Ok(())
    }
}

/// Opened checkout and its pending payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInitialized {
    pub checkout_url: String,
    pub payment: Payment,
}

/// Escrow settlement engine
pub struct EscrowSettlement {
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentGateway>,
    fee_rate: Decimal,
    callback_url: String,
}

impl EscrowSettlement {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        fee_rate: Decimal,
        callback_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            gateway,
            fee_rate,
            callback_url: callback_url.into(),
        }
    }

    /// Fee rate applied on settlement
    pub fn fee_rate(&self) -> Decimal {
        self.fee_rate
    }

    /// Open a gateway checkout for a shipment.
    ///
    /// A shipment holds at most one open payment. While that payment is
    /// `pending`, a repeated checkout for the same amount reuses its
    /// reference and row; once it is `paid` no new checkout is opened. The
    /// pending row is written only after the gateway accepted the checkout
    /// and only if the shipment is still undelivered at that point; a
    /// rejection leaves no local trace.
    pub async fn initialize(&self, request: InitializePayment) -> Result<PaymentInitialized> {
        request.validate()?;

        let shipment = self
            .store
            .shipment(request.shipment_id)
            .await?
            .ok_or_else(|| Error::ShipmentNotFound(request.shipment_id.to_string()))?;
        ensure_undelivered(&shipment)?;

        let existing = self
            .store
            .payments_for_shipment(shipment.id)
            .await?
            .into_iter()
            .rev()
            .find(|p| p.status.is_open());
        if let Some(open) = &existing {
            ensure_reusable(open, &request)?;
        }

        let now = Utc::now();
        let reference = match &existing {
            Some(open) => open.reference.clone(),
            None => format!("shipment_{}_{}", shipment.id, now.timestamp_millis()),
        };
        let checkout = CheckoutRequest {
            amount: request.amount,
            currency: request.currency.clone(),
            email: request.customer_email.clone(),
            first_name: request.customer_name.clone(),
            callback_url: self.callback_url.clone(),
            reference: reference.clone(),
        };

        let session = self.gateway.initialize(&checkout).await.map_err(|e| {
            error!(shipment_id = %shipment.id, error = %e, "payment initialization rejected");
            match e {
                gateway @ Error::Gateway(_) => gateway,
                other => Error::Gateway(other.to_string()),
            }
        })?;

        let mut tx = self.store.begin().await?;

        // Delivery may have committed while the gateway call was in flight
        let current = tx
            .shipment(shipment.id)
            .await?
            .ok_or_else(|| Error::ShipmentNotFound(shipment.id.to_string()))?;
        ensure_undelivered(&current)?;

        let (payment, reused) = match (tx.open_payment(shipment.id).await?, existing) {
            (Some(open), Some(prior))
                if open.id == prior.id && open.status == PaymentStatus::Pending =>
            {
                (open, true)
            }
            (Some(open), _) => return Err(Error::PaymentInProgress(open.reference)),
            (None, Some(prior)) => {
                return Err(Error::Internal(format!(
                    "payment {} left escrow during checkout",
                    prior.reference
                )))
            }
            (None, None) => {
                let payment = Payment {
                    id: Uuid::new_v4(),
                    shipment_id: shipment.id,
                    reference: session.reference.unwrap_or(reference),
                    amount: request.amount,
                    platform_fee: None,
                    status: PaymentStatus::Pending,
                    released_at: None,
                    created_at: now,
                };
                (tx.insert_payment(&payment).await?, false)
            }
        };
        tx.commit().await?;

        info!(
            shipment_id = %shipment.id,
            reference = %payment.reference,
            amount = %payment.amount,
            reused,
            "payment initialized"
        );

        Ok(PaymentInitialized {
            checkout_url: session.checkout_url,
            payment,
        })
    }

    /// Confirm a payment with the gateway and mark it `paid`.
    ///
    /// Safe to repeat: a payment already `paid` or `released` is returned
    /// as is, without asking the gateway again.
    pub async fn verify(&self, reference: &str) -> Result<Payment> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(Error::Validation("Payment reference is required".to_string()));
        }

        let payment = self
            .store
            .payment_by_reference(reference)
            .await?
            .ok_or_else(|| Error::PaymentNotFound(reference.to_string()))?;

        if payment.status != PaymentStatus::Pending {
            return Ok(payment);
        }

        let verification = self.gateway.verify(reference).await?;
        if !verification.successful {
            warn!(reference, detail = %verification.detail, "payment verification failed");
            return Err(Error::VerificationFailed(verification.detail));
        }

        let mut tx = self.store.begin().await?;
        match tx.mark_payment_paid(reference).await? {
            Some(paid) => {
                tx.commit().await?;
                info!(reference, shipment_id = %paid.shipment_id, "payment verified");
                Ok(paid)
            }
            None => {
                // Another caller moved it out of pending first
                drop(tx);
                self.store
                    .payment_by_reference(reference)
                    .await?
                    .ok_or_else(|| Error::PaymentNotFound(reference.to_string()))
            }
        }
    }

    /// Payments recorded for a shipment, oldest first
    pub async fn payments_for_shipment(&self, shipment_id: Uuid) -> Result<Vec<Payment>> {
        self.store.payments_for_shipment(shipment_id).await
    }

    /// Settle a shipment that has just been flipped to `DELIVERED` in `tx`.
    ///
    /// Runs exactly one of "release the escrowed payment" or "record a
    /// released payment", then credits the carrier's share. Must only be
    /// called by the delivery transition.
    pub(crate) async fn settle(
        &self,
        tx: &mut dyn StoreTx,
        shipment: &Shipment,
        now: DateTime<Utc>,
    ) -> Result<Settlement> {
        let split = FeeSplit::compute(shipment.fee, self.fee_rate);

        let (payment, action) = match tx.open_payment(shipment.id).await? {
            Some(open) => {
                let released = tx
                    .release_payment(open.id, split.platform_fee, now)
                    .await?
                    .ok_or_else(|| {
                        Error::Internal(format!("payment {} released concurrently", open.reference))
                    })?;
                (released, SettlementAction::ReleasedExisting)
            }
            None => {
                let payment = Payment {
                    id: Uuid::new_v4(),
                    shipment_id: shipment.id,
                    reference: format!(
                        "SETTLE-{}-{}",
                        shipment.tracking_code,
                        now.timestamp_millis()
                    ),
                    amount: shipment.fee,
                    platform_fee: Some(split.platform_fee),
                    status: PaymentStatus::Released,
                    released_at: Some(now),
                    created_at: now,
                };
                (tx.insert_payment(&payment).await?, SettlementAction::CreatedReleased)
            }
        };

        let carrier_balance = if split.amount_to_carrier > Decimal::ZERO {
            Some(
                tx.credit_balance(shipment.carrier_id, split.amount_to_carrier)
                    .await?,
            )
        } else {
            None
        };

        info!(
            shipment_id = %shipment.id,
            reference = %payment.reference,
            platform_fee = %split.platform_fee,
            amount_to_carrier = %split.amount_to_carrier,
            ?action,
            "escrow settled"
        );

        Ok(Settlement {
            payment,
            split,
            action,
            carrier_balance,
        })
    }
}

fn ensure_undelivered(shipment: &Shipment) -> Result<()> {
    if shipment.status == ShipmentStatus::Delivered {
        return Err(Error::Validation(format!(
            "Shipment {} is already delivered and settled",
            shipment.tracking_code
        )));
    }
    Ok(())
}

/// An open payment can back a repeated checkout only while it is still
/// pending for the same amount
fn ensure_reusable(open: &Payment, request: &InitializePayment) -> Result<()> {
    if open.status != PaymentStatus::Pending {
        return Err(Error::PaymentInProgress(open.reference.clone()));
    }
    if open.amount != request.amount {
        return Err(Error::Validation(format!(
            "Payment {} is pending for {}, not {}",
            open.reference, open.amount, request.amount
        )));
    }
    Ok(())
}
