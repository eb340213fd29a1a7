// ============================================================================
// Cascade
// ============================================================================
//
// Propagates the consequences of a committed change: rollups up the entity
// tree, the order problem flag, carrier orders, cargo assignment, returns on
// cancellation, history and notifications.
//
// ============================================================================

pub mod cancellation;
pub mod coordinator;
pub mod rollup_batch;
pub mod side_effects;

pub use cancellation::{CancellationFailure, CancellationReport, CargoCancellation};
pub use coordinator::CascadeCoordinator;
pub use rollup_batch::RollupBatch;
pub use side_effects::{FailedSideEffect, RetryReport, SideEffect, SideEffectLog};
