use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

use super::aggregate::EntityRef;

// ============================================================================
// Event Envelope
// ============================================================================
//
// Wraps a committed domain event with the metadata the post-commit hooks
// (history, cascade, notifications) need.
//
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct EventEnvelope<E> {
    pub event_id: Uuid,
    pub aggregate: EntityRef,
    /// Entity version produced by the commit that emitted this event
    pub version: i64,
    pub event_type: String,
    pub event_data: E,
    /// Groups every event caused by one inbound request or callback
    pub correlation_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}

impl<E: DomainEvent> EventEnvelope<E> {
    pub fn new(aggregate: EntityRef, version: i64, event_data: E, correlation_id: Uuid) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            aggregate,
            version,
            event_type: event_data.event_type().to_string(),
            event_data,
            correlation_id,
            actor_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_actor(mut self, actor_id: Option<Uuid>) -> Self {
        self.actor_id = actor_id;
        self
    }
}

// ============================================================================
// Domain Event Trait
// ============================================================================

pub trait DomainEvent:
    Serialize + DeserializeOwned + Clone + std::fmt::Debug + Send + Sync + 'static
{
    fn event_type(&self) -> &'static str;

    /// Creation events are recorded as `create` in the history ledger
    fn is_creation(&self) -> bool {
        false
    }
}
