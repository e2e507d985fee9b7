//! Notification dispatch
//!
//! Outbound SMS is best-effort: it runs after the state change has
//! committed, and a failure is reported back to the caller as a warning
//! instead of undoing anything.

use crate::tracking::TrackingCode;
use crate::types::FlightSummary;
use crate::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{info, warn};

/// Outbound SMS sender
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_sms(&self, phone: &str, message: &str) -> Result<()>;
}

/// Notifier that only logs. Used when no SMS gateway is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_sms(&self, phone: &str, message: &str) -> Result<()> {
        info!(phone, message, "SMS dispatch skipped, no gateway configured");
        Ok(())
    }
}

/// Send and turn a failure into a warning string
pub(crate) async fn dispatch(
    notifier: &dyn Notifier,
    phone: &str,
    message: &str,
) -> Option<String> {
    match notifier.send_sms(phone, message).await {
        Ok(()) => None,
        Err(e) => {
            warn!(phone, error = %e, "notification failed");
            Some(format!("Notification to {} failed: {}", phone, e))
        }
    }
}

/// Message telling the acceptor a shipment is on its way
pub fn acceptor_message(
    acceptor_name: &str,
    sender_name: Option<&str>,
    code: &TrackingCode,
    flight: &FlightSummary,
) -> String {
    format!(
        "Hello {}, you have a new item shipment from {}. Track your package using code: {}. \
         Flight from {} to {} departs on {}.",
        acceptor_name,
        sender_name.unwrap_or("a FlightBridge sender"),
        code,
        flight.from,
        flight.to,
        flight.departure_date.format("%Y-%m-%d"),
    )
}

/// Message telling the carrier that escrow was released
pub fn carrier_release_message(code: &TrackingCode, amount_released: Decimal, points: i64) -> String {
    format!(
        "Delivery of shipment {} confirmed. {} has been released to your balance and {} points were added.",
        code, amount_released, points
    )
}
