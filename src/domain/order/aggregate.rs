use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::commands::OrderCommand;
use super::errors::OrderError;
use super::events::*;
use super::value_objects::{OrderDraft, OrderStatus};
use crate::domain::measurements::Money;
use crate::domain::payment::{GatewayId, PaymentStatus};
use crate::lifecycle::{Aggregate, Entity, EntityKind};

// ============================================================================
// Order Aggregate - Domain Logic
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    // Identity
    pub id: Uuid,
    pub customer_id: Uuid,
    pub basket_id: Uuid,

    // Totals
    pub cost: Money,
    pub price: Money,
    pub delivery_cost: Money,

    // State
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_gateway: GatewayId,
    pub is_problem: bool,
    pub is_canceled: bool,
    pub cancel_reason_id: Option<Uuid>,

    // Audit Trail
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Validate a checkout draft and build the order with its creation event
    pub fn create(id: Uuid, draft: OrderDraft) -> Result<(Self, OrderEvent), OrderError> {
        for (field, amount) in [
            ("cost", draft.cost),
            ("price", draft.price),
            ("delivery cost", draft.delivery_cost),
        ] {
            if amount < 0 {
                return Err(OrderError::NegativeAmount(field));
            }
        }
        if draft.price > draft.cost {
            return Err(OrderError::PriceExceedsCost {
                price: draft.price,
                cost: draft.cost,
            });
        }

        let now = Utc::now();
        let order = Self {
            id,
            customer_id: draft.customer_id,
            basket_id: draft.basket_id,
            cost: draft.cost,
            price: draft.price,
            delivery_cost: draft.delivery_cost,
            status: OrderStatus::Created,
            payment_status: PaymentStatus::Created,
            payment_gateway: draft.payment_gateway,
            is_problem: false,
            is_canceled: false,
            cancel_reason_id: None,
            created_at: now,
            updated_at: now,
        };
        let event = OrderEvent::Created(OrderCreated {
            customer_id: draft.customer_id,
            basket_id: draft.basket_id,
            cost: draft.cost,
            price: draft.price,
            delivery_cost: draft.delivery_cost,
            payment_gateway: draft.payment_gateway,
        });
        Ok((order, event))
    }

    /// Amount the customer owes: goods plus shipping
    pub fn total_due(&self) -> Money {
        self.price + self.delivery_cost
    }
}

impl Entity for Order {
    const KIND: EntityKind = EntityKind::Order;

    fn id(&self) -> Uuid {
        self.id
    }
}

// ============================================================================
// Aggregate Trait Implementation
// ============================================================================

impl Aggregate for Order {
    type Event = OrderEvent;
    type Command = OrderCommand;
    type Error = OrderError;

    fn handle_command(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::ChangeStatus { to } => {
                if *to == OrderStatus::Canceled {
                    return Err(OrderError::CancelThroughStatusChange);
                }
                if self.status.is_terminal() {
                    return Err(OrderError::Finished(self.status));
                }
                if *to == self.status {
                    return Ok(vec![]);
                }
                if self.status.next() != Some(*to) {
                    return Err(OrderError::InvalidTransition {
                        from: self.status,
                        to: *to,
                    });
                }

                Ok(vec![OrderEvent::StatusChanged(OrderStatusChanged {
                    from: self.status,
                    to: *to,
                })])
            }

            OrderCommand::SetPaymentStatus { status } => {
                if *status == self.payment_status {
                    return Ok(vec![]);
                }

                Ok(vec![OrderEvent::PaymentStatusChanged(OrderPaymentStatusChanged {
                    from: self.payment_status,
                    to: *status,
                })])
            }

            OrderCommand::SetProblem { is_problem } => {
                if *is_problem == self.is_problem {
                    return Ok(vec![]);
                }

                Ok(vec![OrderEvent::ProblemChanged(OrderProblemChanged {
                    is_problem: *is_problem,
                })])
            }

            OrderCommand::Cancel { return_reason_id } => {
                match self.status {
                    OrderStatus::Canceled => return Err(OrderError::AlreadyCanceled),
                    OrderStatus::Done => return Err(OrderError::Finished(self.status)),
                    _ => {} // Any in-flight order can be canceled
                }

                Ok(vec![OrderEvent::Canceled(OrderCanceled {
                    previous_status: self.status,
                    return_reason_id: *return_reason_id,
                })])
            }
        }
    }

    fn apply_event(&mut self, event: &Self::Event) -> Result<(), Self::Error> {
        self.updated_at = Utc::now();

        match event {
            OrderEvent::Created(_) => {
                // Creation state is built by `Order::create`
            }
            OrderEvent::StatusChanged(e) => {
                self.status = e.to;
            }
            OrderEvent::PaymentStatusChanged(e) => {
                self.payment_status = e.to;
            }
            OrderEvent::ProblemChanged(e) => {
                self.is_problem = e.is_problem;
            }
            OrderEvent::Canceled(e) => {
                self.status = OrderStatus::Canceled;
                self.is_canceled = true;
                self.cancel_reason_id = Some(e.return_reason_id);
            }
        }
        Ok(())
    }
}
