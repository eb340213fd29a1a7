use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::value_objects::OrderStatus;
use crate::domain::measurements::Money;
use crate::domain::payment::{GatewayId, PaymentStatus};
use crate::lifecycle::DomainEvent;

// ============================================================================
// Order Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    Created(OrderCreated),
    StatusChanged(OrderStatusChanged),
    PaymentStatusChanged(OrderPaymentStatusChanged),
    ProblemChanged(OrderProblemChanged),
    Canceled(OrderCanceled),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::Created(_) => "OrderCreated",
            OrderEvent::StatusChanged(_) => "OrderStatusChanged",
            OrderEvent::PaymentStatusChanged(_) => "OrderPaymentStatusChanged",
            OrderEvent::ProblemChanged(_) => "OrderProblemChanged",
            OrderEvent::Canceled(_) => "OrderCanceled",
        }
    }

    fn is_creation(&self) -> bool {
        matches!(self, OrderEvent::Created(_))
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OrderCreated {
    pub customer_id: Uuid,
    pub basket_id: Uuid,
    pub cost: Money,
    pub price: Money,
    pub delivery_cost: Money,
    pub payment_gateway: GatewayId,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OrderStatusChanged {
    pub from: OrderStatus,
    pub to: OrderStatus,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OrderPaymentStatusChanged {
    pub from: PaymentStatus,
    pub to: PaymentStatus,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OrderProblemChanged {
    pub is_problem: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OrderCanceled {
    pub previous_status: OrderStatus,
    pub return_reason_id: Uuid,
}
