use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::value_objects::{ShipmentItem, ShipmentStatus};
use crate::domain::measurements::{Measurements, Money};
use crate::lifecycle::DomainEvent;

// ============================================================================
// Shipment Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ShipmentEvent {
    Created(ShipmentCreated),
    StatusChanged(ShipmentStatusChanged),
    ProblemChanged(ShipmentProblemChanged),
    CargoChanged(ShipmentCargoChanged),
    Recomputed(ShipmentRecomputed),
    Canceled(ShipmentCanceled),
}

impl DomainEvent for ShipmentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ShipmentEvent::Created(_) => "ShipmentCreated",
            ShipmentEvent::StatusChanged(_) => "ShipmentStatusChanged",
            ShipmentEvent::ProblemChanged(_) => "ShipmentProblemChanged",
            ShipmentEvent::CargoChanged(_) => "ShipmentCargoChanged",
            ShipmentEvent::Recomputed(_) => "ShipmentRecomputed",
            ShipmentEvent::Canceled(_) => "ShipmentCanceled",
        }
    }

    fn is_creation(&self) -> bool {
        matches!(self, ShipmentEvent::Created(_))
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ShipmentCreated {
    pub order_id: Uuid,
    pub delivery_id: Uuid,
    pub items: Vec<ShipmentItem>,
    pub measurements: Measurements,
    pub cost: Money,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ShipmentStatusChanged {
    pub from: ShipmentStatus,
    pub to: ShipmentStatus,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ShipmentProblemChanged {
    pub is_problem: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ShipmentCargoChanged {
    pub old: Option<Uuid>,
    pub new: Option<Uuid>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ShipmentRecomputed {
    pub measurements: Measurements,
    pub cost: Money,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ShipmentCanceled {
    pub previous_status: ShipmentStatus,
    pub return_reason_id: Uuid,
}
