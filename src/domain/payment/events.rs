use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::value_objects::{GatewayId, PaymentStatus};
use crate::domain::measurements::Money;
use crate::lifecycle::DomainEvent;

// ============================================================================
// Payment Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PaymentEvent {
    Created(PaymentCreated),
    ExternalAttached(PaymentExternalAttached),
    StatusChanged(PaymentStatusChanged),
    Refunded(PaymentRefunded),
}

impl DomainEvent for PaymentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PaymentEvent::Created(_) => "PaymentCreated",
            PaymentEvent::ExternalAttached(_) => "PaymentExternalAttached",
            PaymentEvent::StatusChanged(_) => "PaymentStatusChanged",
            PaymentEvent::Refunded(_) => "PaymentRefunded",
        }
    }

    fn is_creation(&self) -> bool {
        matches!(self, PaymentEvent::Created(_))
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PaymentCreated {
    pub order_id: Uuid,
    pub sum: Money,
    pub gateway: GatewayId,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PaymentExternalAttached {
    pub external_id: String,
    pub payment_link: Option<String>,
    pub data: BTreeMap<String, String>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PaymentStatusChanged {
    pub from: PaymentStatus,
    pub to: PaymentStatus,
    pub changed_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PaymentRefunded {
    pub refund_id: Uuid,
    pub amount: Money,
    pub total_refunded: Money,
}
