use async_trait::async_trait;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::measurements::Money;
use crate::domain::payment::{GatewayId, Payment, PaymentStatus};

pub mod carrier_credit;
pub mod checkout;
pub mod http;
pub mod local;
pub mod registry;
pub mod terminal;

pub use carrier_credit::{CarrierCreditConfig, CarrierCreditGateway};
pub use checkout::{CheckoutConfig, CheckoutGateway};
pub use http::{GatewayRequest, GatewayTransport, HttpMethod, HttpTransport};
pub use local::LocalGateway;
pub use registry::GatewayRegistry;
pub use terminal::{TerminalConfig, TerminalGateway};

// ============================================================================
// Payment Gateway Adapter
// ============================================================================
//
// One contract over every external payment provider. The provider tag is
// persisted on each payment, so pushes, polls, captures and refunds always
// resolve the adapter that created the payment.
//
// Adapters translate the provider's vocabulary into `PaymentStatus`; they
// never touch local state. Applying a status is the reconciler's job.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Invalid gateway payload: {0}")]
    InvalidPayload(String),

    #[error("Gateway notification signature mismatch")]
    InvalidSignature,

    #[error("Gateway transport error: {0}")]
    Transport(String),

    #[error("Gateway rejected the request: {0}")]
    Rejected(String),

    #[error("Operation not supported by gateway: {0}")]
    Unsupported(&'static str),

    #[error("Payment gateway {0} is not registered")]
    NotRegistered(GatewayId),
}

impl From<serde_json::Error> for GatewayError {
    fn from(error: serde_json::Error) -> Self {
        GatewayError::InvalidPayload(error.to_string())
    }
}

/// Reference data of a payment created at the provider
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalPayment {
    pub external_id: String,
    pub payment_link: Option<String>,
    /// Opaque provider data kept on the payment
    pub data: BTreeMap<String, String>,
}

/// Normalized push notification
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayPush {
    /// Provider's own payment id; pushes are matched on it
    pub external_id: String,
    pub status: PaymentStatus,
    /// Status as the provider spelled it, for logs
    pub raw_status: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn id(&self) -> GatewayId;

    /// Window within which a payment must complete
    fn duration(&self) -> chrono::Duration;

    async fn create_external_payment(
        &self,
        payment: &Payment,
        return_url: Option<&str>,
    ) -> Result<ExternalPayment, GatewayError>;

    /// Where the customer completes the payment
    fn payment_link(&self, payment: &Payment) -> Option<String> {
        payment.payment_link.clone()
    }

    /// Verify and decode a raw push notification
    fn parse_push(&self, payload: &[u8]) -> Result<GatewayPush, GatewayError>;

    /// Poll the provider for the current status
    async fn fetch_status(&self, payment: &Payment) -> Result<PaymentStatus, GatewayError>;

    /// Refund part of a paid payment. `refund_id` identifies this refund at
    /// the provider; repeating a call with the same id must not refund twice.
    async fn refund(&self, payment: &Payment, amount: Money, refund_id: Uuid) -> Result<(), GatewayError>;

    /// Capture a held (authorized) payment
    async fn commit_held_payment(&self, payment: &Payment) -> Result<(), GatewayError>;
}

/// Minor units rendered as a decimal amount, e.g. 12345 -> "123.45"
pub(crate) fn format_amount(amount: Money) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

pub(crate) fn external_id_of(payment: &Payment) -> Result<&str, GatewayError> {
    payment
        .external_id
        .as_deref()
        .ok_or_else(|| GatewayError::InvalidPayload(format!("payment {} has no external id", payment.id)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(12_345), "123.45");
        assert_eq!(format_amount(7), "0.07");
        assert_eq!(format_amount(-250), "-2.50");
    }
}
