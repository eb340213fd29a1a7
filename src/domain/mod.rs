// ============================================================================
// Domain Layer
// ============================================================================
//
// One module per entity. Each aggregate validates its own commands and
// emits events; cross-entity consistency is the cascade's job.
//
// ============================================================================

pub mod cargo;
pub mod delivery;
pub mod measurements;
pub mod order;
pub mod order_return;
pub mod package;
pub mod payment;
pub mod shipment;

pub use measurements::{Measurements, Money};
