// ============================================================================
// Order Domain
// ============================================================================
//
// Root aggregate of a checkout. Its payment status is never set by hand: it
// is derived from the order's payments by the reconciler.
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
