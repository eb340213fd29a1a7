use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::lifecycle::{DomainEvent, EntityRef, EventEnvelope};
use crate::metrics::Metrics;

pub mod scylla_ledger;

pub use scylla_ledger::ScyllaHistoryLedger;

// ============================================================================
// History Ledger
// ============================================================================
//
// Append-only audit trail. Each record links to one or more "primary"
// entities whose timeline it appears on. The ledger is observational only:
// no business decision ever reads it, and a failed append never fails the
// change it describes.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HistoryEventType {
    Create,
    Update,
    Delete,
    Comment,
    LinkAdd,
    LinkRemove,
}

impl HistoryEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryEventType::Create => "create",
            HistoryEventType::Update => "update",
            HistoryEventType::Delete => "delete",
            HistoryEventType::Comment => "comment",
            HistoryEventType::LinkAdd => "link-add",
            HistoryEventType::LinkRemove => "link-remove",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEvent {
    pub id: Uuid,
    pub event_type: HistoryEventType,
    pub actor_id: Option<Uuid>,
    /// Entity that changed
    pub entity: EntityRef,
    /// Snapshot of the change
    pub changes: serde_json::Value,
    /// Timelines this record appears on
    pub primary: Vec<EntityRef>,
    pub created_at: DateTime<Utc>,
}

impl HistoryEvent {
    pub fn new(
        event_type: HistoryEventType,
        entity: EntityRef,
        primary: Vec<EntityRef>,
        changes: serde_json::Value,
        actor_id: Option<Uuid>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            event_type,
            actor_id,
            entity,
            changes,
            primary,
            created_at: Utc::now(),
        }
    }

    /// Record a committed domain event; creation events become `create`
    pub fn from_envelope<E: DomainEvent>(
        envelope: &EventEnvelope<E>,
        primary: Vec<EntityRef>,
    ) -> Result<Self, serde_json::Error> {
        let event_type = if envelope.event_data.is_creation() {
            HistoryEventType::Create
        } else {
            HistoryEventType::Update
        };
        let changes = serde_json::json!({
            "event": envelope.event_type,
            "version": envelope.version,
            "correlation_id": envelope.correlation_id,
            "payload": serde_json::to_value(&envelope.event_data)?,
        });
        Ok(Self::new(event_type, envelope.aggregate, primary, changes, envelope.actor_id))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("Failed to serialize history changes: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("History backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait HistoryLedger: Send + Sync {
    async fn append(&self, event: HistoryEvent) -> Result<(), HistoryError>;
}

// ============================================================================
// Fire-and-forget recorder used by the engine
// ============================================================================

#[derive(Clone)]
pub struct HistoryRecorder {
    ledger: Arc<dyn HistoryLedger>,
    metrics: Arc<Metrics>,
}

impl HistoryRecorder {
    pub fn new(ledger: Arc<dyn HistoryLedger>, metrics: Arc<Metrics>) -> Self {
        Self { ledger, metrics }
    }

    pub async fn record(&self, event: HistoryEvent) {
        let entity = event.entity;
        let event_type = event.event_type;
        if let Err(e) = self.ledger.append(event).await {
            self.metrics.record_history_failure();
            tracing::warn!(
                entity = %entity,
                event_type = event_type.as_str(),
                error = %e,
                "History append failed"
            );
        }
    }

    pub async fn record_envelopes<E: DomainEvent>(&self, envelopes: &[EventEnvelope<E>], primary: &[EntityRef]) {
        for envelope in envelopes {
            match HistoryEvent::from_envelope(envelope, primary.to_vec()) {
                Ok(event) => self.record(event).await,
                Err(e) => {
                    self.metrics.record_history_failure();
                    tracing::warn!(
                        entity = %envelope.aggregate,
                        event_type = %envelope.event_type,
                        error = %e,
                        "History snapshot could not be serialized"
                    );
                }
            }
        }
    }

    pub async fn record_link(
        &self,
        event_type: HistoryEventType,
        primary: EntityRef,
        linked: EntityRef,
        actor_id: Option<Uuid>,
    ) {
        let changes = serde_json::json!({ "linked": linked });
        self.record(HistoryEvent::new(event_type, linked, vec![primary], changes, actor_id))
            .await;
    }
}

// ============================================================================
// In-memory ledger
// ============================================================================

#[derive(Default)]
pub struct InMemoryHistoryLedger {
    events: RwLock<Vec<HistoryEvent>>,
}

impl InMemoryHistoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Timeline of one primary entity, oldest first
    pub async fn events_for(&self, primary: EntityRef) -> Vec<HistoryEvent> {
        self.events
            .read()
            .await
            .iter()
            .filter(|event| event.primary.contains(&primary))
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }
}

#[async_trait]
impl HistoryLedger for InMemoryHistoryLedger {
    async fn append(&self, event: HistoryEvent) -> Result<(), HistoryError> {
        self.events.write().await.push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cargo::CargoEvent;

    struct BrokenLedger;

    #[async_trait]
    impl HistoryLedger for BrokenLedger {
        async fn append(&self, _event: HistoryEvent) -> Result<(), HistoryError> {
            Err(HistoryError::Backend("disk full".into()))
        }
    }

    #[tokio::test]
    async fn test_envelopes_are_recorded_under_every_primary() {
        let ledger = Arc::new(InMemoryHistoryLedger::new());
        let recorder = HistoryRecorder::new(ledger.clone(), Arc::new(Metrics::new().unwrap()));
        let cargo = EntityRef::cargo(Uuid::now_v7());
        let other = EntityRef::order(Uuid::now_v7());
        let envelope = EventEnvelope::new(
            cargo,
            1,
            CargoEvent::Created {
                carrier_service_id: Uuid::now_v7(),
            },
            Uuid::now_v7(),
        );

        recorder.record_envelopes(&[envelope], &[cargo, other]).await;

        let timeline = ledger.events_for(cargo).await;
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline[0].event_type, HistoryEventType::Create);
        assert_eq!(timeline[0].changes["event"], "CargoCreated");
        assert_eq!(ledger.events_for(other).await.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_append_is_counted_not_propagated() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let recorder = HistoryRecorder::new(Arc::new(BrokenLedger), metrics.clone());

        recorder
            .record_link(
                HistoryEventType::LinkAdd,
                EntityRef::cargo(Uuid::now_v7()),
                EntityRef::shipment(Uuid::now_v7()),
                None,
            )
            .await;

        assert_eq!(metrics.history_append_failures_total.get(), 1);
    }

    #[test]
    fn test_event_type_serializes_kebab_case() {
        let json = serde_json::to_string(&HistoryEventType::LinkRemove).unwrap();
        assert_eq!(json, "\"link-remove\"");
    }
}
