use super::value_objects::OrderStatus;
use crate::domain::measurements::Money;

// ============================================================================
// Order Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Order is already canceled")]
    AlreadyCanceled,

    #[error("Invalid order status transition: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Order is {0} and can no longer change")]
    Finished(OrderStatus),

    #[error("Orders are canceled with the cancel operation, not a status change")]
    CancelThroughStatusChange,

    #[error("Order price {price} exceeds cost {cost}")]
    PriceExceedsCost { price: Money, cost: Money },

    #[error("Order {0} must not be negative")]
    NegativeAmount(&'static str),
}
