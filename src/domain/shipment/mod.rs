// ============================================================================
// Shipment Domain
// ============================================================================
//
// One warehouse fulfillment unit within a delivery. Holds a weak
// back-reference to its cargo (`cargo_id`); cargo never lists shipments.
//
// ============================================================================

pub mod aggregate;
pub mod commands;
pub mod errors;
pub mod events;
pub mod value_objects;

pub use aggregate::*;
pub use commands::*;
pub use errors::*;
pub use events::*;
pub use value_objects::*;
