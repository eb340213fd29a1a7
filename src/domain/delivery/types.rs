use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::measurements::{Measurements, Money};
use crate::lifecycle::DomainEvent;

// ============================================================================
// Delivery Value Objects
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMethod {
    Courier,
    Pickup,
    Post,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Created,
    AwaitingConfirmation,
    Assembling,
    Assembled,
    Shipped,
    Delivering,
    Done,
    Canceled,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Created => "created",
            DeliveryStatus::AwaitingConfirmation => "awaiting_confirmation",
            DeliveryStatus::Assembling => "assembling",
            DeliveryStatus::Assembled => "assembled",
            DeliveryStatus::Shipped => "shipped",
            DeliveryStatus::Delivering => "delivering",
            DeliveryStatus::Done => "done",
            DeliveryStatus::Canceled => "canceled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryStatus::Done | DeliveryStatus::Canceled)
    }

    pub fn next(&self) -> Option<DeliveryStatus> {
        match self {
            DeliveryStatus::Created => Some(DeliveryStatus::AwaitingConfirmation),
            DeliveryStatus::AwaitingConfirmation => Some(DeliveryStatus::Assembling),
            DeliveryStatus::Assembling => Some(DeliveryStatus::Assembled),
            DeliveryStatus::Assembled => Some(DeliveryStatus::Shipped),
            DeliveryStatus::Shipped => Some(DeliveryStatus::Delivering),
            DeliveryStatus::Delivering => Some(DeliveryStatus::Done),
            DeliveryStatus::Done | DeliveryStatus::Canceled => None,
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Data a delivery leg is opened with
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryDraft {
    pub method: DeliveryMethod,
    pub carrier_service_id: Uuid,
    /// Shipping price charged to the customer
    pub delivery_cost: Money,
}

// ============================================================================
// Commands
// ============================================================================

#[derive(Debug, Clone)]
pub enum DeliveryCommand {
    ChangeStatus { to: DeliveryStatus },
    Cancel { return_reason_id: Uuid },
    Recompute { measurements: Measurements, cost: Money },
    SetCarrierOrder { carrier_order_id: String },
}

// ============================================================================
// Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum DeliveryEvent {
    Created(DeliveryCreated),
    StatusChanged(DeliveryStatusChanged),
    Recomputed(DeliveryRecomputed),
    CarrierOrderSet(DeliveryCarrierOrderSet),
    Canceled(DeliveryCanceled),
}

impl DomainEvent for DeliveryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DeliveryEvent::Created(_) => "DeliveryCreated",
            DeliveryEvent::StatusChanged(_) => "DeliveryStatusChanged",
            DeliveryEvent::Recomputed(_) => "DeliveryRecomputed",
            DeliveryEvent::CarrierOrderSet(_) => "DeliveryCarrierOrderSet",
            DeliveryEvent::Canceled(_) => "DeliveryCanceled",
        }
    }

    fn is_creation(&self) -> bool {
        matches!(self, DeliveryEvent::Created(_))
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DeliveryCreated {
    pub order_id: Uuid,
    pub method: DeliveryMethod,
    pub carrier_service_id: Uuid,
    pub delivery_cost: Money,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DeliveryStatusChanged {
    pub from: DeliveryStatus,
    pub to: DeliveryStatus,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DeliveryRecomputed {
    pub measurements: Measurements,
    pub cost: Money,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DeliveryCarrierOrderSet {
    pub carrier_order_id: String,
    /// False when an existing carrier order was updated
    pub created: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DeliveryCanceled {
    pub previous_status: DeliveryStatus,
    pub return_reason_id: Uuid,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Invalid delivery status transition: {from} -> {to}")]
    InvalidTransition { from: DeliveryStatus, to: DeliveryStatus },

    #[error("Delivery is already canceled")]
    AlreadyCanceled,

    #[error("Delivery is {0} and can no longer change")]
    Finished(DeliveryStatus),

    #[error("Deliveries are canceled with the cancel operation, not a status change")]
    CancelThroughStatusChange,

    #[error("Delivery cost must not be negative, got {0}")]
    NegativeCost(Money),
}
