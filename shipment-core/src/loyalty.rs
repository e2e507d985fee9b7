//! Loyalty ledger
//!
//! Credits carrier points. There is no dedup here: the only caller is the
//! delivery transition, whose compare-and-set guarantees one credit per
//! shipment.

use crate::store::{Store, StoreTx};
use crate::{Error, Result};
use tracing::info;
use uuid::Uuid;

/// Carrier loyalty points
#[derive(Debug, Clone, Copy)]
pub struct LoyaltyLedger {
    award_per_delivery: i64,
}

impl LoyaltyLedger {
    pub fn new(award_per_delivery: i64) -> Self {
        Self { award_per_delivery }
    }

    /// Points awarded per confirmed delivery
    pub fn award_per_delivery(&self) -> i64 {
        self.award_per_delivery
    }

    /// Add `amount` points to the carrier inside `tx`. Returns the new total.
    pub(crate) async fn credit(
        &self,
        tx: &mut dyn StoreTx,
        carrier_id: Uuid,
        amount: i64,
    ) -> Result<i64> {
        if amount < 0 {
            return Err(Error::Internal(format!(
                "refusing negative points credit {} for carrier {}",
                amount, carrier_id
            )));
        }

        let total = tx.credit_points(carrier_id, amount).await?;
        info!(%carrier_id, amount, total, "carrier points credited");
        Ok(total)
    }

    /// Current points of a user
    pub async fn points(&self, store: &dyn Store, user_id: Uuid) -> Result<i64> {
        store
            .user(user_id)
            .await?
            .map(|u| u.points)
            .ok_or(Error::UserNotFound(user_id))
    }
}

impl Default for LoyaltyLedger {
    fn default() -> Self {
        Self::new(5)
    }
}
