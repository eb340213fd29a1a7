use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::lifecycle::EntityRef;

// ============================================================================
// Side-Effect Failure Log
// ============================================================================
//
// Best-effort effects that failed after their primary change committed.
// Entries are keyed by effect and target, so repeated failures of the same
// call collapse into one record; the corrective pass replays them and a
// successful replay removes the record.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum SideEffect {
    CarrierOrderUpsert { delivery_id: Uuid },
    CargoAssignment { shipment_id: Uuid },
    /// Leave `cargo_id`; a no-op once the shipment is elsewhere
    CargoDetachment { shipment_id: Uuid, cargo_id: Uuid },
}

impl SideEffect {
    pub fn label(&self) -> &'static str {
        match self {
            SideEffect::CarrierOrderUpsert { .. } => "carrier_order_upsert",
            SideEffect::CargoAssignment { .. } => "cargo_assignment",
            SideEffect::CargoDetachment { .. } => "cargo_detachment",
        }
    }

    pub fn target(&self) -> EntityRef {
        match self {
            SideEffect::CarrierOrderUpsert { delivery_id } => EntityRef::delivery(*delivery_id),
            SideEffect::CargoAssignment { shipment_id } | SideEffect::CargoDetachment { shipment_id, .. } => {
                EntityRef::shipment(*shipment_id)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedSideEffect {
    pub effect: SideEffect,
    pub failure_count: u32,
    pub last_error: String,
    pub first_failed_at: DateTime<Utc>,
    pub last_failed_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct SideEffectLog {
    entries: RwLock<BTreeMap<SideEffect, FailedSideEffect>>,
}

impl SideEffectLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, effect: SideEffect, error: &str) -> u32 {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let entry = entries.entry(effect).or_insert_with(|| FailedSideEffect {
            effect,
            failure_count: 0,
            last_error: String::new(),
            first_failed_at: now,
            last_failed_at: now,
        });
        entry.failure_count += 1;
        entry.last_error = error.to_string();
        entry.last_failed_at = now;
        entry.failure_count
    }

    /// Returns true if a pending failure was cleared
    pub async fn resolve(&self, effect: &SideEffect) -> bool {
        self.entries.write().await.remove(effect).is_some()
    }

    pub async fn pending(&self) -> Vec<FailedSideEffect> {
        self.entries.read().await.values().cloned().collect()
    }

    pub async fn get(&self, effect: &SideEffect) -> Option<FailedSideEffect> {
        self.entries.read().await.get(effect).cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

/// Outcome of one corrective pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetryReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub still_failing: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_repeated_failures_collapse_into_one_entry() {
        let log = SideEffectLog::new();
        let effect = SideEffect::CarrierOrderUpsert {
            delivery_id: Uuid::now_v7(),
        };

        assert_eq!(log.record(effect, "timeout").await, 1);
        assert_eq!(log.record(effect, "connection refused").await, 2);

        let entry = log.get(&effect).await.unwrap();
        assert_eq!(log.len().await, 1);
        assert_eq!(entry.failure_count, 2);
        assert_eq!(entry.last_error, "connection refused");
        assert!(entry.first_failed_at <= entry.last_failed_at);
    }

    #[tokio::test]
    async fn test_resolve_removes_entry() {
        let log = SideEffectLog::new();
        let shipment_id = Uuid::now_v7();
        let assignment = SideEffect::CargoAssignment { shipment_id };
        let detachment = SideEffect::CargoDetachment {
            shipment_id,
            cargo_id: Uuid::now_v7(),
        };

        log.record(assignment, "no cargo").await;
        log.record(detachment, "conflict").await;

        assert!(log.resolve(&assignment).await);
        assert!(!log.resolve(&assignment).await);
        assert_eq!(log.len().await, 1);
        assert_eq!(detachment.target(), EntityRef::shipment(shipment_id));
    }
}
