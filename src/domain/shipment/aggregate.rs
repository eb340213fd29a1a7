use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::commands::ShipmentCommand;
use super::errors::ShipmentError;
use super::events::*;
use super::value_objects::{ShipmentItem, ShipmentStatus};
use crate::domain::measurements::{Measurements, Money};
use crate::lifecycle::{Aggregate, Entity, EntityKind};
use crate::rollup::Rollup;

// ============================================================================
// Shipment Aggregate - Domain Logic
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shipment {
    // Identity & ownership
    pub id: Uuid,
    pub order_id: Uuid,
    pub delivery_id: Uuid,
    pub cargo_id: Option<Uuid>,

    // State
    pub status: ShipmentStatus,
    pub is_problem: bool,
    pub is_canceled: bool,
    pub return_reason_id: Option<Uuid>,

    // Contents & derived aggregates
    pub items: Vec<ShipmentItem>,
    pub measurements: Measurements,
    pub cost: Money,

    // Audit Trail
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Shipment {
    /// Build a shipment from basket items; `estimate` is the pre-packing rollup
    pub fn create(
        id: Uuid,
        order_id: Uuid,
        delivery_id: Uuid,
        items: Vec<ShipmentItem>,
        estimate: Rollup,
    ) -> Result<(Self, ShipmentEvent), ShipmentError> {
        if items.is_empty() {
            return Err(ShipmentError::EmptyItems);
        }
        if let Some(item) = items.iter().find(|item| item.quantity == 0) {
            return Err(ShipmentError::InvalidQuantity(item.quantity));
        }

        let now = Utc::now();
        let event = ShipmentEvent::Created(ShipmentCreated {
            order_id,
            delivery_id,
            items: items.clone(),
            measurements: estimate.measurements,
            cost: estimate.cost,
        });
        let shipment = Self {
            id,
            order_id,
            delivery_id,
            cargo_id: None,
            status: ShipmentStatus::Created,
            is_problem: false,
            is_canceled: false,
            return_reason_id: None,
            items,
            measurements: estimate.measurements,
            cost: estimate.cost,
            created_at: now,
            updated_at: now,
        };
        Ok((shipment, event))
    }

    /// Value handed back to the customer when this shipment is returned
    pub fn returned_value(&self) -> (Money, Money) {
        self.items.iter().fold((0, 0), |(price, commission), item| {
            (price + item.total_cost(), commission + item.total_commission())
        })
    }

    pub fn ensure_packing_open(&self) -> Result<(), ShipmentError> {
        if self.is_canceled || !self.status.allows_packing() {
            return Err(ShipmentError::PackingClosed(self.status));
        }
        Ok(())
    }

    pub fn ensure_deletable(&self) -> Result<(), ShipmentError> {
        if !self.status.allows_deletion() {
            return Err(ShipmentError::CannotDelete(self.status));
        }
        Ok(())
    }

    fn ensure_active(&self) -> Result<(), ShipmentError> {
        if self.is_canceled {
            return Err(ShipmentError::AlreadyCanceled);
        }
        if self.status.is_terminal() {
            return Err(ShipmentError::Finished(self.status));
        }
        Ok(())
    }
}

impl Entity for Shipment {
    const KIND: EntityKind = EntityKind::Shipment;

    fn id(&self) -> Uuid {
        self.id
    }
}

// ============================================================================
// Aggregate Trait Implementation
// ============================================================================

impl Aggregate for Shipment {
    type Event = ShipmentEvent;
    type Command = ShipmentCommand;
    type Error = ShipmentError;

    fn handle_command(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ShipmentCommand::ChangeStatus { to, all_items_packed } => {
                if *to == ShipmentStatus::Canceled {
                    return Err(ShipmentError::CancelThroughStatusChange);
                }
                self.ensure_active()?;
                if *to == self.status {
                    return Ok(vec![]);
                }
                if !self.status.can_transition_to(*to) {
                    return Err(ShipmentError::InvalidTransition {
                        from: self.status,
                        to: *to,
                    });
                }
                if *to == ShipmentStatus::Assembled && !all_items_packed {
                    return Err(ShipmentError::NotPacked);
                }

                Ok(vec![ShipmentEvent::StatusChanged(ShipmentStatusChanged {
                    from: self.status,
                    to: *to,
                })])
            }

            ShipmentCommand::Cancel { return_reason_id } => {
                self.ensure_active()?;

                Ok(vec![ShipmentEvent::Canceled(ShipmentCanceled {
                    previous_status: self.status,
                    return_reason_id: *return_reason_id,
                })])
            }

            ShipmentCommand::SetProblem { is_problem } => {
                if *is_problem == self.is_problem {
                    return Ok(vec![]);
                }

                Ok(vec![ShipmentEvent::ProblemChanged(ShipmentProblemChanged {
                    is_problem: *is_problem,
                })])
            }

            ShipmentCommand::AssignCargo { cargo_id } => {
                if *cargo_id == self.cargo_id {
                    return Ok(vec![]);
                }
                if cargo_id.is_some() && self.is_canceled {
                    return Err(ShipmentError::AssignCanceled);
                }

                Ok(vec![ShipmentEvent::CargoChanged(ShipmentCargoChanged {
                    old: self.cargo_id,
                    new: *cargo_id,
                })])
            }

            ShipmentCommand::Recompute { measurements, cost } => {
                if *measurements == self.measurements && *cost == self.cost {
                    return Ok(vec![]);
                }

                Ok(vec![ShipmentEvent::Recomputed(ShipmentRecomputed {
                    measurements: *measurements,
                    cost: *cost,
                })])
            }
        }
    }

    fn apply_event(&mut self, event: &Self::Event) -> Result<(), Self::Error> {
        self.updated_at = Utc::now();

        match event {
            ShipmentEvent::Created(_) => {}
            ShipmentEvent::StatusChanged(e) => {
                self.status = e.to;
            }
            ShipmentEvent::ProblemChanged(e) => {
                self.is_problem = e.is_problem;
            }
            ShipmentEvent::CargoChanged(e) => {
                self.cargo_id = e.new;
            }
            ShipmentEvent::Recomputed(e) => {
                self.measurements = e.measurements;
                self.cost = e.cost;
            }
            ShipmentEvent::Canceled(e) => {
                self.status = ShipmentStatus::Canceled;
                self.is_canceled = true;
                self.return_reason_id = Some(e.return_reason_id);
            }
        }
        Ok(())
    }
}
