use async_trait::async_trait;
use scylla::client::session::Session;
use scylla::serialize::row::SerializeRow;
use scylla::statement::batch::Batch;
use std::sync::Arc;

use super::{HistoryError, HistoryEvent, HistoryLedger};
use crate::utils::{retry_with_backoff, RetryConfig};

// ============================================================================
// ScyllaDB History Ledger
// ============================================================================
//
// One `history_events` row per record plus one `history_event_links` row per
// primary entity, written in a single batch. The links table is partitioned
// by primary entity so a timeline is a single-partition read.
//
// ============================================================================

const CREATE_EVENTS_TABLE: &str = "CREATE TABLE IF NOT EXISTS history_events (
    id uuid PRIMARY KEY,
    event_type text,
    actor_id uuid,
    entity_kind text,
    entity_id uuid,
    changes text,
    created_at timestamp
)";

const CREATE_LINKS_TABLE: &str = "CREATE TABLE IF NOT EXISTS history_event_links (
    primary_kind text,
    primary_id uuid,
    event_id uuid,
    event_type text,
    created_at timestamp,
    PRIMARY KEY ((primary_kind, primary_id), event_id)
) WITH CLUSTERING ORDER BY (event_id ASC)";

pub struct ScyllaHistoryLedger {
    session: Arc<Session>,
    retry: RetryConfig,
}

impl ScyllaHistoryLedger {
    pub fn new(session: Arc<Session>, retry: RetryConfig) -> Self {
        Self { session, retry }
    }

    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        self.session.query_unpaged(CREATE_EVENTS_TABLE, &[]).await?;
        self.session.query_unpaged(CREATE_LINKS_TABLE, &[]).await?;
        Ok(())
    }

    async fn write(&self, event: &HistoryEvent) -> Result<(), HistoryError> {
        let changes = serde_json::to_string(&event.changes)?;

        let mut batch = Batch::default();
        let mut values: Vec<Box<dyn SerializeRow + Send + Sync>> = vec![];

        batch.append_statement(
            "INSERT INTO history_events (
                id, event_type, actor_id, entity_kind, entity_id, changes, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)",
        );
        values.push(Box::new((
            event.id,
            event.event_type.as_str().to_string(),
            event.actor_id,
            event.entity.kind.as_str().to_string(),
            event.entity.id,
            changes,
            event.created_at,
        )));

        for primary in &event.primary {
            batch.append_statement(
                "INSERT INTO history_event_links (
                    primary_kind, primary_id, event_id, event_type, created_at
                ) VALUES (?, ?, ?, ?, ?)",
            );
            values.push(Box::new((
                primary.kind.as_str().to_string(),
                primary.id,
                event.id,
                event.event_type.as_str().to_string(),
                event.created_at,
            )));
        }

        self.session
            .batch(&batch, values)
            .await
            .map_err(|e| HistoryError::Backend(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl HistoryLedger for ScyllaHistoryLedger {
    async fn append(&self, event: HistoryEvent) -> Result<(), HistoryError> {
        retry_with_backoff(self.retry.clone(), |_attempt| self.write(&event))
            .await
            .into_result()?;

        tracing::debug!(
            event_id = %event.id,
            entity = %event.entity,
            links = event.primary.len(),
            "History event persisted"
        );
        Ok(())
    }
}
