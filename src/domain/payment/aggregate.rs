use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::commands::PaymentCommand;
use super::errors::PaymentError;
use super::events::*;
use super::value_objects::{GatewayId, PaymentStatus};
use crate::domain::measurements::Money;
use crate::lifecycle::{Aggregate, Entity, EntityKind};

// ============================================================================
// Payment Aggregate
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub sum: Money,
    pub status: PaymentStatus,
    pub gateway: GatewayId,

    // Gateway reference data, opaque to everything but the owning adapter
    pub external_id: Option<String>,
    pub gateway_data: BTreeMap<String, String>,
    pub payment_link: Option<String>,

    pub refunded_sum: Money,
    /// Refunds already recorded, by the id they were sent to the gateway with
    #[serde(default)]
    pub refund_ids: Vec<Uuid>,

    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn create(id: Uuid, order_id: Uuid, sum: Money, gateway: GatewayId) -> Result<(Self, PaymentEvent), PaymentError> {
        if sum <= 0 {
            return Err(PaymentError::InvalidSum(sum));
        }

        let now = Utc::now();
        let payment = Self {
            id,
            order_id,
            sum,
            status: PaymentStatus::Created,
            gateway,
            external_id: None,
            gateway_data: BTreeMap::new(),
            payment_link: None,
            refunded_sum: 0,
            refund_ids: Vec::new(),
            created_at: now,
            paid_at: None,
            updated_at: now,
        };
        let event = PaymentEvent::Created(PaymentCreated { order_id, sum, gateway });
        Ok((payment, event))
    }

    pub fn refundable(&self) -> Money {
        self.sum - self.refunded_sum
    }

    /// Still unresolved after the gateway's payment window
    pub fn is_overdue(&self, window: Duration, now: DateTime<Utc>) -> bool {
        !self.status.is_terminal() && self.created_at + window <= now
    }
}

impl Entity for Payment {
    const KIND: EntityKind = EntityKind::Payment;

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Aggregate for Payment {
    type Event = PaymentEvent;
    type Command = PaymentCommand;
    type Error = PaymentError;

    fn handle_command(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PaymentCommand::AttachExternal {
                external_id,
                payment_link,
                data,
            } => {
                if self.status != PaymentStatus::Created || self.external_id.is_some() {
                    return Err(PaymentError::AlreadyStarted(self.status));
                }

                Ok(vec![
                    PaymentEvent::ExternalAttached(PaymentExternalAttached {
                        external_id: external_id.clone(),
                        payment_link: payment_link.clone(),
                        data: data.clone(),
                    }),
                    PaymentEvent::StatusChanged(PaymentStatusChanged {
                        from: self.status,
                        to: PaymentStatus::Started,
                        changed_at: Utc::now(),
                    }),
                ])
            }

            PaymentCommand::ApplyGatewayStatus { status } => {
                if !status.supersedes(self.status) {
                    return Ok(vec![]);
                }

                Ok(vec![PaymentEvent::StatusChanged(PaymentStatusChanged {
                    from: self.status,
                    to: *status,
                    changed_at: Utc::now(),
                })])
            }

            PaymentCommand::RecordRefund { refund_id, amount } => {
                if self.refund_ids.contains(refund_id) {
                    return Ok(vec![]);
                }
                if *amount <= 0 {
                    return Err(PaymentError::InvalidRefund(*amount));
                }
                if self.status != PaymentStatus::Paid {
                    return Err(PaymentError::NotPaid(self.status));
                }
                if *amount > self.refundable() {
                    return Err(PaymentError::RefundExceedsSum {
                        requested: *amount,
                        available: self.refundable(),
                    });
                }

                Ok(vec![PaymentEvent::Refunded(PaymentRefunded {
                    refund_id: *refund_id,
                    amount: *amount,
                    total_refunded: self.refunded_sum + amount,
                })])
            }
        }
    }

    fn apply_event(&mut self, event: &Self::Event) -> Result<(), Self::Error> {
        self.updated_at = Utc::now();

        match event {
            PaymentEvent::Created(_) => {}
            PaymentEvent::ExternalAttached(e) => {
                self.external_id = Some(e.external_id.clone());
                self.payment_link = e.payment_link.clone();
                self.gateway_data = e.data.clone();
            }
            PaymentEvent::StatusChanged(e) => {
                self.status = e.to;
                if e.to == PaymentStatus::Paid {
                    self.paid_at = Some(e.changed_at);
                }
            }
            PaymentEvent::Refunded(e) => {
                self.refunded_sum = e.total_refunded;
                self.refund_ids.push(e.refund_id);
            }
        }
        Ok(())
    }
}
