//! Configuration for the shipment engine

use crate::{Error, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Share of the shipment fee kept by the platform on settlement
    pub fee_rate: Decimal,

    /// Loyalty points awarded to the carrier per confirmed delivery
    pub points_per_delivery: i64,

    /// Prefix of generated tracking codes
    pub tracking_code_prefix: String,

    /// Attempts at minting a fresh identity when a tracking code collides
    pub max_tracking_code_attempts: u32,

    /// Redirect target handed to the payment gateway at checkout
    pub payment_callback_url: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fee_rate: dec!(0.10),
            points_per_delivery: 5,
            tracking_code_prefix: "SHIP".to_string(),
            max_tracking_code_attempts: 3,
            payment_callback_url: "https://flightbridge.app/payment/callback".to_string(),
        }
    }
}

impl EngineConfig {
    /// Return a copy with the provided overrides applied
    pub fn with_overrides(&self, overrides: &EngineConfigOverrides) -> Result<Self> {
        let mut merged = self.clone();
        overrides.apply_to(&mut merged);
        merged.validate()?;
        Ok(merged)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.fee_rate < Decimal::ZERO || self.fee_rate > Decimal::ONE {
            return Err(Error::Config(format!(
                "fee_rate must be within [0, 1], got {}",
                self.fee_rate
            )));
        }

        if self.points_per_delivery < 0 {
            return Err(Error::Config(
                "points_per_delivery cannot be negative".to_string(),
            ));
        }

        let prefix_ok = !self.tracking_code_prefix.is_empty()
            && self
                .tracking_code_prefix
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());
        if !prefix_ok {
            return Err(Error::Config(format!(
                "tracking_code_prefix must be uppercase alphanumeric, got {:?}",
                self.tracking_code_prefix
            )));
        }

        if self.max_tracking_code_attempts == 0 {
            return Err(Error::Config(
                "max_tracking_code_attempts must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// Partial update of [`EngineConfig`].
///
/// Each field maps to exactly one field of the base config: `Some` replaces
/// it, `None` leaves it untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfigOverrides {
    /// Replaces `fee_rate`
    pub fee_rate: Option<Decimal>,
    /// Replaces `points_per_delivery`
    pub points_per_delivery: Option<i64>,
    /// Replaces `tracking_code_prefix`
    pub tracking_code_prefix: Option<String>,
    /// Replaces `max_tracking_code_attempts`
    pub max_tracking_code_attempts: Option<u32>,
    /// Replaces `payment_callback_url`
    pub payment_callback_url: Option<String>,
}

impl EngineConfigOverrides {
    fn apply_to(&self, config: &mut EngineConfig) {
        if let Some(rate) = self.fee_rate {
            config.fee_rate = rate;
        }
        if let Some(points) = self.points_per_delivery {
            config.points_per_delivery = points;
        }
        if let Some(prefix) = &self.tracking_code_prefix {
            config.tracking_code_prefix = prefix.clone();
        }
        if let Some(attempts) = self.max_tracking_code_attempts {
            config.max_tracking_code_attempts = attempts;
        }
        if let Some(url) = &self.payment_callback_url {
            config.payment_callback_url = url.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.fee_rate, dec!(0.10));
        assert_eq!(config.points_per_delivery, 5);
    }

    #[test]
    fn test_overrides_only_touch_provided_fields() {
        let base = EngineConfig::default();
        let overrides = EngineConfigOverrides {
            fee_rate: Some(dec!(0.15)),
            ..Default::default()
        };

        let merged = base.with_overrides(&overrides).unwrap();
        assert_eq!(merged.fee_rate, dec!(0.15));
        assert_eq!(merged.points_per_delivery, base.points_per_delivery);
        assert_eq!(merged.tracking_code_prefix, base.tracking_code_prefix);
    }

    #[test]
    fn test_invalid_overrides_rejected() {
        let overrides = EngineConfigOverrides {
            fee_rate: Some(dec!(1.5)),
            ..Default::default()
        };
        assert!(EngineConfig::default().with_overrides(&overrides).is_err());

        let overrides = EngineConfigOverrides {
            tracking_code_prefix: Some("ship".to_string()),
            ..Default::default()
        };
        assert!(EngineConfig::default().with_overrides(&overrides).is_err());
    }
}
