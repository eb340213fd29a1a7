use super::value_objects::PaymentStatus;
use crate::domain::measurements::Money;

// ============================================================================
// Payment Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Payment sum must be positive, got {0}")]
    InvalidSum(Money),

    #[error("External payment already created (status {0})")]
    AlreadyStarted(PaymentStatus),

    #[error("Payment is {0}, only held payments can be captured")]
    NotHeld(PaymentStatus),

    #[error("Payment is {0}, only paid payments can be refunded")]
    NotPaid(PaymentStatus),

    #[error("Refund of {requested} exceeds refundable amount {available}")]
    RefundExceedsSum { requested: Money, available: Money },

    #[error("Refund amount must be positive, got {0}")]
    InvalidRefund(Money),

    #[error("Order has no paid payment to refund from")]
    NothingToRefund,
}
