use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::event::DomainEvent;

// ============================================================================
// Entity & Aggregate Abstractions
// ============================================================================
//
// Every stored entity is an `Entity`. Entities whose status is governed by a
// state machine are also an `Aggregate`:
//
//   command --handle_command--> events --apply_event--> new state
//
// `handle_command` never mutates; it validates the command against the
// current state and returns the facts to apply. An empty event list means
// "nothing changed" and is how idempotent no-ops are expressed.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Order,
    Delivery,
    Shipment,
    Cargo,
    Package,
    Payment,
    OrderReturn,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Order => "order",
            EntityKind::Delivery => "delivery",
            EntityKind::Shipment => "shipment",
            EntityKind::Cargo => "cargo",
            EntityKind::Package => "package",
            EntityKind::Payment => "payment",
            EntityKind::OrderReturn => "order_return",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed reference to an entity (a foreign key, never an owning pointer)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: Uuid,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: Uuid) -> Self {
        Self { kind, id }
    }

    pub fn order(id: Uuid) -> Self {
        Self::new(EntityKind::Order, id)
    }

    pub fn delivery(id: Uuid) -> Self {
        Self::new(EntityKind::Delivery, id)
    }

    pub fn shipment(id: Uuid) -> Self {
        Self::new(EntityKind::Shipment, id)
    }

    pub fn cargo(id: Uuid) -> Self {
        Self::new(EntityKind::Cargo, id)
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Anything that can be stored in a repository
pub trait Entity: Clone + Send + Sync + 'static {
    const KIND: EntityKind;

    fn id(&self) -> Uuid;

    fn entity_ref(&self) -> EntityRef {
        EntityRef::new(Self::KIND, self.id())
    }
}

/// Entity driven by commands through a validated state machine
pub trait Aggregate: Entity {
    type Event: DomainEvent;
    type Command: Clone + Send + Sync;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Validate a command against the current state and emit events
    fn handle_command(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;

    /// Apply an already-validated event
    fn apply_event(&mut self, event: &Self::Event) -> Result<(), Self::Error>;

    /// Validate and apply in one step; state is untouched on rejection
    fn execute(&mut self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        let events = self.handle_command(command)?;
        let mut next = self.clone();
        for event in &events {
            next.apply_event(event)?;
        }
        *self = next;
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_ref_display() {
        let id = Uuid::nil();
        let reference = EntityRef::shipment(id);
        assert_eq!(
            reference.to_string(),
            "shipment:00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn test_entity_kind_serializes_snake_case() {
        let json = serde_json::to_string(&EntityKind::OrderReturn).unwrap();
        assert_eq!(json, "\"order_return\"");
    }
}
