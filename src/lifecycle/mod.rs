// ============================================================================
// Entity Lifecycle Infrastructure
// ============================================================================
//
// Generic building blocks shared by every entity:
// - Entity / Aggregate traits (command -> events -> state)
// - EventEnvelope / DomainEvent
// - CommandHandler (load, decide, version-checked save, conflict retry)
//
// Entity-specific rules live in `crate::domain`.
//
// ============================================================================

pub mod aggregate;
pub mod command_handler;
pub mod event;

pub use aggregate::{Aggregate, Entity, EntityKind, EntityRef};
pub use command_handler::{CommandContext, CommandHandler, Committed};
pub use event::{DomainEvent, EventEnvelope};
