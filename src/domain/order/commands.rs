use uuid::Uuid;

use super::value_objects::OrderStatus;
use crate::domain::payment::PaymentStatus;

// ============================================================================
// Order Commands
// ============================================================================

#[derive(Debug, Clone)]
pub enum OrderCommand {
    ChangeStatus { to: OrderStatus },
    /// Store the status derived from the order's payments
    SetPaymentStatus { status: PaymentStatus },
    SetProblem { is_problem: bool },
    Cancel { return_reason_id: Uuid },
}
