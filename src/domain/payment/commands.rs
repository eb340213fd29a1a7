use std::collections::BTreeMap;
use uuid::Uuid;

use super::value_objects::PaymentStatus;
use crate::domain::measurements::Money;

// ============================================================================
// Payment Commands
// ============================================================================

#[derive(Debug, Clone)]
pub enum PaymentCommand {
    /// Persist the gateway's reference data once the external payment exists
    AttachExternal {
        external_id: String,
        payment_link: Option<String>,
        data: BTreeMap<String, String>,
    },
    /// Status reported by the gateway (push or poll); stale reports are no-ops
    ApplyGatewayStatus { status: PaymentStatus },
    /// Replaying a `refund_id` that is already recorded is a no-op
    RecordRefund { refund_id: Uuid, amount: Money },
}
