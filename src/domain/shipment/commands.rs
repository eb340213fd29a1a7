use uuid::Uuid;

use super::value_objects::ShipmentStatus;
use crate::domain::measurements::{Measurements, Money};

// ============================================================================
// Shipment Commands
// ============================================================================

#[derive(Debug, Clone)]
pub enum ShipmentCommand {
    ChangeStatus {
        to: ShipmentStatus,
        /// Packing collaborator's answer; only consulted for `Assembled`
        all_items_packed: bool,
    },
    Cancel {
        return_reason_id: Uuid,
    },
    SetProblem {
        is_problem: bool,
    },
    AssignCargo {
        cargo_id: Option<Uuid>,
    },
    Recompute {
        measurements: Measurements,
        cost: Money,
    },
}
