use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::measurements::{line_total, Measurements, Money};

// ============================================================================
// Shipment Value Objects
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentStatus {
    Created,
    AwaitingConfirmation,
    Assembling,
    Assembled,
    Shipped,
    OnPointIn,
    Transit,
    OnPointOut,
    Delivering,
    Done,
    CancellationExpected,
    Canceled,
}

impl ShipmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShipmentStatus::Created => "created",
            ShipmentStatus::AwaitingConfirmation => "awaiting_confirmation",
            ShipmentStatus::Assembling => "assembling",
            ShipmentStatus::Assembled => "assembled",
            ShipmentStatus::Shipped => "shipped",
            ShipmentStatus::OnPointIn => "on_point_in",
            ShipmentStatus::Transit => "transit",
            ShipmentStatus::OnPointOut => "on_point_out",
            ShipmentStatus::Delivering => "delivering",
            ShipmentStatus::Done => "done",
            ShipmentStatus::CancellationExpected => "cancellation_expected",
            ShipmentStatus::Canceled => "canceled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ShipmentStatus::Done | ShipmentStatus::Canceled)
    }

    /// Statuses reachable through a plain status change. `Canceled` is
    /// deliberately absent: it needs a return reason and goes through Cancel.
    pub fn allowed_targets(&self) -> &'static [ShipmentStatus] {
        use ShipmentStatus::*;
        match self {
            Created => &[AwaitingConfirmation, Assembling, Assembled],
            AwaitingConfirmation => &[Assembling, Assembled, CancellationExpected],
            Assembling => &[Assembled, CancellationExpected],
            Assembled => &[Shipped, CancellationExpected],
            Shipped => &[OnPointIn, CancellationExpected],
            OnPointIn => &[Transit, Delivering, CancellationExpected],
            Transit => &[OnPointOut, CancellationExpected],
            OnPointOut => &[Delivering, Done, CancellationExpected],
            Delivering => &[Done, CancellationExpected],
            CancellationExpected | Done | Canceled => &[],
        }
    }

    pub fn can_transition_to(&self, to: ShipmentStatus) -> bool {
        self.allowed_targets().contains(&to)
    }

    /// Packages may only change while the shipment is being assembled
    pub fn allows_packing(&self) -> bool {
        matches!(
            self,
            ShipmentStatus::Created | ShipmentStatus::AwaitingConfirmation | ShipmentStatus::Assembling
        )
    }

    /// Shipments that left the warehouse are never deleted
    pub fn allows_deletion(&self) -> bool {
        matches!(
            self,
            ShipmentStatus::Created
                | ShipmentStatus::AwaitingConfirmation
                | ShipmentStatus::Assembling
                | ShipmentStatus::Assembled
        )
    }

    /// Entering these statuses creates or refreshes the carrier order
    pub fn triggers_carrier_order(&self) -> bool {
        matches!(self, ShipmentStatus::Assembling | ShipmentStatus::Assembled)
    }
}

impl fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Basket item placed in a shipment. Unit data comes from the catalog and
/// pricing collaborators at checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentItem {
    pub basket_item_id: Uuid,
    pub offer_id: Uuid,
    pub quantity: u32,
    pub unit: Measurements,
    pub unit_cost: Money,
    pub unit_commission: Money,
}

impl ShipmentItem {
    pub fn total_cost(&self) -> Money {
        line_total(self.unit_cost, self.quantity)
    }

    pub fn total_commission(&self) -> Money {
        line_total(self.unit_commission, self.quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canceled_never_a_status_target() {
        use ShipmentStatus::*;
        for status in [
            Created,
            AwaitingConfirmation,
            Assembling,
            Assembled,
            Shipped,
            OnPointIn,
            Transit,
            OnPointOut,
            Delivering,
            Done,
            CancellationExpected,
            Canceled,
        ] {
            assert!(!status.can_transition_to(Canceled), "{status} -> canceled");
        }
    }

    #[test]
    fn test_created_can_jump_to_assembled() {
        assert!(ShipmentStatus::Created.can_transition_to(ShipmentStatus::Assembled));
        assert!(!ShipmentStatus::Created.can_transition_to(ShipmentStatus::Shipped));
        assert!(!ShipmentStatus::Assembled.can_transition_to(ShipmentStatus::Assembling));
    }

    #[test]
    fn test_cancellation_expected_from_awaiting_confirmation_on() {
        assert!(!ShipmentStatus::Created.can_transition_to(ShipmentStatus::CancellationExpected));
        assert!(ShipmentStatus::AwaitingConfirmation.can_transition_to(ShipmentStatus::CancellationExpected));
        assert!(ShipmentStatus::Delivering.can_transition_to(ShipmentStatus::CancellationExpected));
    }

    #[test]
    fn test_packing_and_deletion_windows() {
        assert!(ShipmentStatus::Assembling.allows_packing());
        assert!(!ShipmentStatus::Assembled.allows_packing());
        assert!(ShipmentStatus::Assembled.allows_deletion());
        assert!(!ShipmentStatus::Shipped.allows_deletion());
    }

    #[test]
    fn test_item_totals() {
        let item = ShipmentItem {
            basket_item_id: Uuid::now_v7(),
            offer_id: Uuid::now_v7(),
            quantity: 3,
            unit: Measurements::weight_only(100),
            unit_cost: 250,
            unit_commission: 25,
        };
        assert_eq!(item.total_cost(), 750);
        assert_eq!(item.total_commission(), 75);
    }
}
