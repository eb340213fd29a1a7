// ============================================================================
// Payment Domain
// ============================================================================
//
// A payment is one settlement attempt for an order through one gateway.
// Gateway reports are applied under a monotone precedence: terminal
// statuses are final and non-terminal ones only move forward.
//
// ============================================================================

pub mod aggregate;
pub mod commands;
pub mod errors;
pub mod events;
pub mod status_rules;
pub mod value_objects;

pub use aggregate::*;
pub use commands::*;
pub use errors::*;
pub use events::*;
pub use status_rules::derive_order_payment_status;
pub use value_objects::*;
