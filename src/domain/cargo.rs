use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::measurements::Measurements;
use crate::lifecycle::{Aggregate, DomainEvent, Entity, EntityKind};

// ============================================================================
// Cargo - carrier hand-off batch
// ============================================================================
//
// Groups shipments (possibly from different deliveries) for one carrier
// pickup. Membership lives on the shipment side (`Shipment::cargo_id`); the
// cargo only stores the rolled-up measurements of its members.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CargoStatus {
    Created,
    Shipped,
    TakenByCarrier,
    Done,
    Canceled,
}

impl CargoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CargoStatus::Created => "created",
            CargoStatus::Shipped => "shipped",
            CargoStatus::TakenByCarrier => "taken_by_carrier",
            CargoStatus::Done => "done",
            CargoStatus::Canceled => "canceled",
        }
    }

    pub fn next(&self) -> Option<CargoStatus> {
        match self {
            CargoStatus::Created => Some(CargoStatus::Shipped),
            CargoStatus::Shipped => Some(CargoStatus::TakenByCarrier),
            CargoStatus::TakenByCarrier => Some(CargoStatus::Done),
            CargoStatus::Done | CargoStatus::Canceled => None,
        }
    }
}

impl fmt::Display for CargoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub enum CargoCommand {
    ChangeStatus { to: CargoStatus },
    Cancel { reason: Option<String> },
    Recompute { measurements: Measurements },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum CargoEvent {
    Created { carrier_service_id: Uuid },
    StatusChanged { from: CargoStatus, to: CargoStatus },
    Recomputed { measurements: Measurements },
    Canceled { previous_status: CargoStatus, reason: Option<String> },
}

impl DomainEvent for CargoEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CargoEvent::Created { .. } => "CargoCreated",
            CargoEvent::StatusChanged { .. } => "CargoStatusChanged",
            CargoEvent::Recomputed { .. } => "CargoRecomputed",
            CargoEvent::Canceled { .. } => "CargoCanceled",
        }
    }

    fn is_creation(&self) -> bool {
        matches!(self, CargoEvent::Created { .. })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CargoError {
    #[error("Invalid cargo status transition: {from} -> {to}")]
    InvalidTransition { from: CargoStatus, to: CargoStatus },

    #[error("Cargo is already canceled")]
    AlreadyCanceled,

    #[error("Cargo is {0} and can no longer change")]
    Finished(CargoStatus),

    #[error("Cargo is canceled with the cancel operation, not a status change")]
    CancelThroughStatusChange,

    #[error("Cargo in status {0} does not accept shipments")]
    NotAcceptingShipments(CargoStatus),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cargo {
    pub id: Uuid,
    pub carrier_service_id: Uuid,
    pub status: CargoStatus,
    pub measurements: Measurements,
    pub is_canceled: bool,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cargo {
    pub fn create(id: Uuid, carrier_service_id: Uuid) -> (Self, CargoEvent) {
        let now = Utc::now();
        let cargo = Self {
            id,
            carrier_service_id,
            status: CargoStatus::Created,
            measurements: Measurements::default(),
            is_canceled: false,
            cancel_reason: None,
            created_at: now,
            updated_at: now,
        };
        (cargo, CargoEvent::Created { carrier_service_id })
    }

    /// Only an open, non-canceled cargo takes new shipments
    pub fn ensure_accepts_shipments(&self) -> Result<(), CargoError> {
        if self.is_canceled || self.status != CargoStatus::Created {
            return Err(CargoError::NotAcceptingShipments(self.status));
        }
        Ok(())
    }
}

impl Entity for Cargo {
    const KIND: EntityKind = EntityKind::Cargo;

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Aggregate for Cargo {
    type Event = CargoEvent;
    type Command = CargoCommand;
    type Error = CargoError;

    fn handle_command(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            CargoCommand::ChangeStatus { to } => {
                if *to == CargoStatus::Canceled {
                    return Err(CargoError::CancelThroughStatusChange);
                }
                if self.status.next().is_none() {
                    return Err(CargoError::Finished(self.status));
                }
                if *to == self.status {
                    return Ok(vec![]);
                }
                if self.status.next() != Some(*to) {
                    return Err(CargoError::InvalidTransition {
                        from: self.status,
                        to: *to,
                    });
                }
                Ok(vec![CargoEvent::StatusChanged {
                    from: self.status,
                    to: *to,
                }])
            }
            CargoCommand::Cancel { reason } => match self.status {
                CargoStatus::Canceled => Err(CargoError::AlreadyCanceled),
                CargoStatus::Done => Err(CargoError::Finished(self.status)),
                _ => Ok(vec![CargoEvent::Canceled {
                    previous_status: self.status,
                    reason: reason.clone(),
                }]),
            },
            CargoCommand::Recompute { measurements } => {
                if *measurements == self.measurements {
                    return Ok(vec![]);
                }
                Ok(vec![CargoEvent::Recomputed {
                    measurements: *measurements,
                }])
            }
        }
    }

    fn apply_event(&mut self, event: &Self::Event) -> Result<(), Self::Error> {
        self.updated_at = Utc::now();

        match event {
            CargoEvent::Created { .. } => {}
            CargoEvent::StatusChanged { to, .. } => self.status = *to,
            CargoEvent::Recomputed { measurements } => self.measurements = *measurements,
            CargoEvent::Canceled { reason, .. } => {
                self.status = CargoStatus::Canceled;
                self.is_canceled = true;
                self.cancel_reason = reason.clone();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cargo() -> Cargo {
        Cargo::create(Uuid::now_v7(), Uuid::now_v7()).0
    }

    #[test]
    fn test_only_created_cargo_accepts_shipments() {
        let mut cargo = cargo();
        assert!(cargo.ensure_accepts_shipments().is_ok());

        cargo
            .execute(&CargoCommand::ChangeStatus {
                to: CargoStatus::Shipped,
            })
            .unwrap();
        assert!(matches!(
            cargo.ensure_accepts_shipments(),
            Err(CargoError::NotAcceptingShipments(CargoStatus::Shipped))
        ));
    }

    #[test]
    fn test_canceled_cargo_rejects_shipments_and_transitions() {
        let mut cargo = cargo();
        cargo
            .execute(&CargoCommand::Cancel {
                reason: Some("carrier no-show".into()),
            })
            .unwrap();

        assert!(cargo.ensure_accepts_shipments().is_err());
        let result = cargo.execute(&CargoCommand::ChangeStatus {
            to: CargoStatus::Shipped,
        });
        assert!(matches!(result, Err(CargoError::Finished(CargoStatus::Canceled))));
    }

    #[test]
    fn test_status_cannot_skip() {
        let mut cargo = cargo();
        let result = cargo.execute(&CargoCommand::ChangeStatus {
            to: CargoStatus::Done,
        });
        assert!(matches!(result, Err(CargoError::InvalidTransition { .. })));
    }
}
