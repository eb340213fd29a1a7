use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::measurements::Money;
use crate::domain::payment::GatewayId;

// ============================================================================
// Order Value Objects
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Created,
    AwaitingConfirmation,
    Confirmed,
    InProcessing,
    Transferred,
    Delivering,
    Done,
    Canceled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "created",
            OrderStatus::AwaitingConfirmation => "awaiting_confirmation",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::InProcessing => "in_processing",
            OrderStatus::Transferred => "transferred",
            OrderStatus::Delivering => "delivering",
            OrderStatus::Done => "done",
            OrderStatus::Canceled => "canceled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Done | OrderStatus::Canceled)
    }

    /// The only status a `ChangeStatus` command may move to
    pub fn next(&self) -> Option<OrderStatus> {
        match self {
            OrderStatus::Created => Some(OrderStatus::AwaitingConfirmation),
            OrderStatus::AwaitingConfirmation => Some(OrderStatus::Confirmed),
            OrderStatus::Confirmed => Some(OrderStatus::InProcessing),
            OrderStatus::InProcessing => Some(OrderStatus::Transferred),
            OrderStatus::Transferred => Some(OrderStatus::Delivering),
            OrderStatus::Delivering => Some(OrderStatus::Done),
            OrderStatus::Done | OrderStatus::Canceled => None,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Checkout data an order is created from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDraft {
    pub customer_id: Uuid,
    pub basket_id: Uuid,
    /// Basket value before discounts
    pub cost: Money,
    /// Amount the customer pays for the goods
    pub price: Money,
    pub delivery_cost: Money,
    pub payment_gateway: GatewayId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_walks_to_done() {
        let mut status = OrderStatus::Created;
        let mut steps = 0;
        while let Some(next) = status.next() {
            status = next;
            steps += 1;
        }
        assert_eq!(status, OrderStatus::Done);
        assert_eq!(steps, 6);
    }

    #[test]
    fn test_canceled_is_terminal() {
        assert!(OrderStatus::Canceled.is_terminal());
        assert_eq!(OrderStatus::Canceled.next(), None);
        assert!(!OrderStatus::Confirmed.is_terminal());
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&OrderStatus::AwaitingConfirmation).unwrap();
        assert_eq!(json, "\"awaiting_confirmation\"");
    }
}
