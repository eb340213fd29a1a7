use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::*;
use crate::domain::measurements::{Measurements, Money};
use crate::lifecycle::{Aggregate, Entity, EntityKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
    pub id: Uuid,
    pub order_id: Uuid,
    pub method: DeliveryMethod,
    pub carrier_service_id: Uuid,
    pub carrier_order_id: Option<String>,
    pub status: DeliveryStatus,
    pub delivery_cost: Money,

    // Derived from non-canceled shipments
    pub measurements: Measurements,
    pub cost: Money,

    pub is_canceled: bool,
    pub return_reason_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Delivery {
    pub fn create(id: Uuid, order_id: Uuid, draft: DeliveryDraft) -> Result<(Self, DeliveryEvent), DeliveryError> {
        if draft.delivery_cost < 0 {
            return Err(DeliveryError::NegativeCost(draft.delivery_cost));
        }

        let now = Utc::now();
        let delivery = Self {
            id,
            order_id,
            method: draft.method,
            carrier_service_id: draft.carrier_service_id,
            carrier_order_id: None,
            status: DeliveryStatus::Created,
            delivery_cost: draft.delivery_cost,
            measurements: Measurements::default(),
            cost: 0,
            is_canceled: false,
            return_reason_id: None,
            created_at: now,
            updated_at: now,
        };
        let event = DeliveryEvent::Created(DeliveryCreated {
            order_id,
            method: draft.method,
            carrier_service_id: draft.carrier_service_id,
            delivery_cost: draft.delivery_cost,
        });
        Ok((delivery, event))
    }
}

impl Entity for Delivery {
    const KIND: EntityKind = EntityKind::Delivery;

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Aggregate for Delivery {
    type Event = DeliveryEvent;
    type Command = DeliveryCommand;
    type Error = DeliveryError;

    fn handle_command(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            DeliveryCommand::ChangeStatus { to } => {
                if *to == DeliveryStatus::Canceled {
                    return Err(DeliveryError::CancelThroughStatusChange);
                }
                if self.status.is_terminal() {
                    return Err(DeliveryError::Finished(self.status));
                }
                if *to == self.status {
                    return Ok(vec![]);
                }
                if self.status.next() != Some(*to) {
                    return Err(DeliveryError::InvalidTransition {
                        from: self.status,
                        to: *to,
                    });
                }
                Ok(vec![DeliveryEvent::StatusChanged(DeliveryStatusChanged {
                    from: self.status,
                    to: *to,
                })])
            }

            DeliveryCommand::Cancel { return_reason_id } => match self.status {
                DeliveryStatus::Canceled => Err(DeliveryError::AlreadyCanceled),
                DeliveryStatus::Done => Err(DeliveryError::Finished(self.status)),
                _ => Ok(vec![DeliveryEvent::Canceled(DeliveryCanceled {
                    previous_status: self.status,
                    return_reason_id: *return_reason_id,
                })]),
            },

            DeliveryCommand::Recompute { measurements, cost } => {
                if *measurements == self.measurements && *cost == self.cost {
                    return Ok(vec![]);
                }
                Ok(vec![DeliveryEvent::Recomputed(DeliveryRecomputed {
                    measurements: *measurements,
                    cost: *cost,
                })])
            }

            DeliveryCommand::SetCarrierOrder { carrier_order_id } => {
                if self.carrier_order_id.as_deref() == Some(carrier_order_id.as_str()) {
                    return Ok(vec![]);
                }
                Ok(vec![DeliveryEvent::CarrierOrderSet(DeliveryCarrierOrderSet {
                    carrier_order_id: carrier_order_id.clone(),
                    created: self.carrier_order_id.is_none(),
                })])
            }
        }
    }

    fn apply_event(&mut self, event: &Self::Event) -> Result<(), Self::Error> {
        self.updated_at = Utc::now();

        match event {
            DeliveryEvent::Created(_) => {}
            DeliveryEvent::StatusChanged(e) => self.status = e.to,
            DeliveryEvent::Recomputed(e) => {
                self.measurements = e.measurements;
                self.cost = e.cost;
            }
            DeliveryEvent::CarrierOrderSet(e) => {
                self.carrier_order_id = Some(e.carrier_order_id.clone());
            }
            DeliveryEvent::Canceled(e) => {
                self.status = DeliveryStatus::Canceled;
                self.is_canceled = true;
                self.return_reason_id = Some(e.return_reason_id);
            }
        }
        Ok(())
    }
}
