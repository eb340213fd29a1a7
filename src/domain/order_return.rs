use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::delivery::Delivery;
use crate::domain::measurements::{total, Money};
use crate::domain::order::Order;
use crate::domain::shipment::Shipment;
use crate::lifecycle::{Aggregate, DomainEvent, Entity, EntityKind, EntityRef};

// ============================================================================
// Order Return - value to refund for a canceled scope
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ReturnScope {
    Order(Uuid),
    Delivery(Uuid),
    Shipment(Uuid),
}

impl ReturnScope {
    pub fn entity_ref(&self) -> EntityRef {
        match self {
            ReturnScope::Order(id) => EntityRef::order(*id),
            ReturnScope::Delivery(id) => EntityRef::delivery(*id),
            ReturnScope::Shipment(id) => EntityRef::shipment(*id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReturnItemKind {
    DeliveryCost,
    Offer { offer_id: Uuid, quantity: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderReturnItem {
    pub kind: ReturnItemKind,
    pub price: Money,
    pub commission: Money,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnStatus {
    Created,
    /// Claimed by a refund; the gateway call may or may not have happened
    Refunding,
    Refunded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderReturn {
    pub id: Uuid,
    pub order_id: Uuid,
    pub scope: ReturnScope,
    pub return_reason_id: Uuid,
    pub items: Vec<OrderReturnItem>,
    /// Sum of item prices
    pub price: Money,
    /// Sum of item commissions
    pub commission: Money,
    pub status: ReturnStatus,
    /// Payment the refund is drawn from, fixed when the refund is claimed
    pub refunded_payment_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum OrderReturnCommand {
    BeginRefund { payment_id: Uuid },
    MarkRefunded { payment_id: Uuid },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderReturnEvent {
    Created {
        scope: ReturnScope,
        return_reason_id: Uuid,
        items: Vec<OrderReturnItem>,
        price: Money,
        commission: Money,
    },
    RefundStarted {
        payment_id: Uuid,
    },
    Refunded {
        payment_id: Uuid,
        amount: Money,
    },
}

impl DomainEvent for OrderReturnEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderReturnEvent::Created { .. } => "OrderReturnCreated",
            OrderReturnEvent::RefundStarted { .. } => "OrderReturnRefundStarted",
            OrderReturnEvent::Refunded { .. } => "OrderReturnRefunded",
        }
    }

    fn is_creation(&self) -> bool {
        matches!(self, OrderReturnEvent::Created { .. })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OrderReturnError {
    #[error("Return is already refunded")]
    AlreadyRefunded,

    #[error("Return is already being refunded from payment {0}")]
    RefundInProgress(Uuid),

    #[error("Return refund was never started")]
    RefundNotStarted,
}

impl OrderReturn {
    pub fn create(
        id: Uuid,
        order_id: Uuid,
        scope: ReturnScope,
        return_reason_id: Uuid,
        items: Vec<OrderReturnItem>,
    ) -> (Self, OrderReturnEvent) {
        let now = Utc::now();
        let mut order_return = Self {
            id,
            order_id,
            scope,
            return_reason_id,
            items,
            price: 0,
            commission: 0,
            status: ReturnStatus::Created,
            refunded_payment_id: None,
            created_at: now,
            updated_at: now,
        };
        order_return.recompute();

        let event = OrderReturnEvent::Created {
            scope,
            return_reason_id,
            items: order_return.items.clone(),
            price: order_return.price,
            commission: order_return.commission,
        };
        (order_return, event)
    }

    /// Order-level return covers the order's delivery cost
    pub fn for_order(order: &Order, return_reason_id: Uuid) -> (Self, OrderReturnEvent) {
        Self::create(
            Uuid::now_v7(),
            order.id,
            ReturnScope::Order(order.id),
            return_reason_id,
            vec![delivery_cost_item(order.delivery_cost)],
        )
    }

    /// Delivery-level return covers the leg's shipping price
    pub fn for_delivery(delivery: &Delivery, return_reason_id: Uuid) -> (Self, OrderReturnEvent) {
        Self::create(
            Uuid::now_v7(),
            delivery.order_id,
            ReturnScope::Delivery(delivery.id),
            return_reason_id,
            vec![delivery_cost_item(delivery.delivery_cost)],
        )
    }

    /// Shipment-level return covers the value of the returned goods
    pub fn for_shipment(shipment: &Shipment, return_reason_id: Uuid) -> (Self, OrderReturnEvent) {
        let items = shipment
            .items
            .iter()
            .map(|item| OrderReturnItem {
                kind: ReturnItemKind::Offer {
                    offer_id: item.offer_id,
                    quantity: item.quantity,
                },
                price: item.total_cost(),
                commission: item.total_commission(),
            })
            .collect();
        Self::create(
            Uuid::now_v7(),
            shipment.order_id,
            ReturnScope::Shipment(shipment.id),
            return_reason_id,
            items,
        )
    }

    fn recompute(&mut self) {
        self.price = total(self.items.iter().map(|item| item.price));
        self.commission = total(self.items.iter().map(|item| item.commission));
    }
}

fn delivery_cost_item(amount: Money) -> OrderReturnItem {
    OrderReturnItem {
        kind: ReturnItemKind::DeliveryCost,
        price: amount,
        commission: 0,
    }
}

impl Entity for OrderReturn {
    const KIND: EntityKind = EntityKind::OrderReturn;

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Aggregate for OrderReturn {
    type Event = OrderReturnEvent;
    type Command = OrderReturnCommand;
    type Error = OrderReturnError;

    fn handle_command(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderReturnCommand::BeginRefund { payment_id } => match self.status {
                ReturnStatus::Created => Ok(vec![OrderReturnEvent::RefundStarted {
                    payment_id: *payment_id,
                }]),
                ReturnStatus::Refunding => Err(OrderReturnError::RefundInProgress(
                    self.refunded_payment_id.unwrap_or(*payment_id),
                )),
                ReturnStatus::Refunded => Err(OrderReturnError::AlreadyRefunded),
            },

            OrderReturnCommand::MarkRefunded { payment_id } => match self.status {
                ReturnStatus::Created => Err(OrderReturnError::RefundNotStarted),
                ReturnStatus::Refunding if self.refunded_payment_id == Some(*payment_id) => {
                    Ok(vec![OrderReturnEvent::Refunded {
                        payment_id: *payment_id,
                        amount: self.price,
                    }])
                }
                ReturnStatus::Refunded if self.refunded_payment_id == Some(*payment_id) => Ok(vec![]),
                ReturnStatus::Refunding => Err(OrderReturnError::RefundInProgress(
                    self.refunded_payment_id.unwrap_or(*payment_id),
                )),
                ReturnStatus::Refunded => Err(OrderReturnError::AlreadyRefunded),
            },
        }
    }

    fn apply_event(&mut self, event: &Self::Event) -> Result<(), Self::Error> {
        self.updated_at = Utc::now();
        match event {
            OrderReturnEvent::Created { .. } => {}
            OrderReturnEvent::RefundStarted { payment_id } => {
                self.status = ReturnStatus::Refunding;
                self.refunded_payment_id = Some(*payment_id);
            }
            OrderReturnEvent::Refunded { payment_id, .. } => {
                self.status = ReturnStatus::Refunded;
                self.refunded_payment_id = Some(*payment_id);
            }
        }
        Ok(())
    }
}
