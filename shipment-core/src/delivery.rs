//! The delivery transition as one command
//!
//! `CREATED -> DELIVERED` fans out to escrow settlement and the loyalty
//! credit. All three writes share one transaction: the status flip is a
//! compare-and-set, so only the caller that wins it settles and credits,
//! and if anything after the flip fails the transaction is dropped and the
//! shipment is still `CREATED` for the next attempt.

use crate::escrow::{EscrowSettlement, Settlement};
use crate::loyalty::LoyaltyLedger;
use crate::store::Store;
use crate::types::Shipment;
use crate::Result;
use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

/// Effects of a committed delivery transition
#[derive(Debug, Clone, PartialEq)]
pub struct CommittedDelivery {
    pub shipment: Shipment,
    pub settlement: Settlement,
    /// Carrier points after the award
    pub carrier_points: i64,
    pub points_awarded: i64,
}

/// Delivery confirmation for one shipment
pub struct ConfirmDelivery<'a> {
    shipment_id: Uuid,
    escrow: &'a EscrowSettlement,
    loyalty: &'a LoyaltyLedger,
}

impl<'a> ConfirmDelivery<'a> {
    pub fn new(shipment_id: Uuid, escrow: &'a EscrowSettlement, loyalty: &'a LoyaltyLedger) -> Self {
        Self {
            shipment_id,
            escrow,
            loyalty,
        }
    }

    /// Run the transition. `Ok(None)` means the shipment was not in
    /// `CREATED` when the flip was attempted and nothing was written.
    pub async fn execute(self, store: &dyn Store) -> Result<Option<CommittedDelivery>> {
        let mut tx = store.begin().await?;

        let Some(shipment) = tx.mark_delivered(self.shipment_id).await? else {
            debug!(shipment_id = %self.shipment_id, "delivery flip lost, shipment not in CREATED");
            return Ok(None);
        };

        let settlement = self
            .escrow
            .settle(tx.as_mut(), &shipment, Utc::now())
            .await?;

        let points_awarded = self.loyalty.award_per_delivery();
        let carrier_points = self
            .loyalty
            .credit(tx.as_mut(), shipment.carrier_id, points_awarded)
            .await?;

        tx.commit().await?;

        info!(
            shipment_id = %shipment.id,
            tracking_code = %shipment.tracking_code,
            carrier_id = %shipment.carrier_id,
            amount_released = %settlement.split.amount_to_carrier,
            points_awarded,
            "delivery committed"
        );

        Ok(Some(CommittedDelivery {
            shipment,
            settlement,
            carrier_points,
            points_awarded,
        }))
    }
}
