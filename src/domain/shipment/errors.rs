use super::value_objects::ShipmentStatus;

// ============================================================================
// Shipment Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ShipmentError {
    #[error("Invalid shipment status transition: {from} -> {to}")]
    InvalidTransition { from: ShipmentStatus, to: ShipmentStatus },

    #[error("Shipment cannot be assembled before all items are packed")]
    NotPacked,

    #[error("Shipment is already canceled")]
    AlreadyCanceled,

    #[error("Shipment is {0} and can no longer change")]
    Finished(ShipmentStatus),

    #[error("Shipments are canceled with the cancel operation, not a status change")]
    CancelThroughStatusChange,

    #[error("Packages cannot change while the shipment is {0}")]
    PackingClosed(ShipmentStatus),

    #[error("Shipment cannot be deleted once {0}")]
    CannotDelete(ShipmentStatus),

    #[error("Canceled shipment cannot be assigned to a cargo")]
    AssignCanceled,

    #[error("Shipment items cannot be empty")]
    EmptyItems,

    #[error("Invalid item quantity: {0}")]
    InvalidQuantity(u32),
}
