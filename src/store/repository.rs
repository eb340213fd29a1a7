use async_trait::async_trait;
use uuid::Uuid;

use crate::lifecycle::{Entity, EntityRef};

// ============================================================================
// Repository - versioned entity persistence
// ============================================================================
//
// Every write is guarded by the version the writer loaded (optimistic
// concurrency). A mismatch yields `StoreError::Conflict`, which callers treat
// as transient: reload, re-decide, save again.
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct Versioned<A> {
    pub version: i64,
    pub entity: A,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(EntityRef),

    #[error("{0} already exists")]
    AlreadyExists(EntityRef),

    #[error("Concurrency conflict on {entity}: expected version {expected}, but current is {current}")]
    Conflict {
        entity: EntityRef,
        expected: i64,
        current: i64,
    },

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

pub type EntityFilter<'a, A> = &'a (dyn Fn(&A) -> bool + Send + Sync);

#[async_trait]
pub trait Repository<A: Entity>: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<Versioned<A>>, StoreError>;

    /// Insert a new entity at version 1
    async fn insert(&self, entity: A) -> Result<i64, StoreError>;

    /// Replace the entity if its stored version still equals `expected_version`
    async fn save(&self, entity: A, expected_version: i64) -> Result<i64, StoreError>;

    async fn delete(&self, id: Uuid, expected_version: i64) -> Result<(), StoreError>;

    /// Current state of every entity matching `filter`, ordered by id
    async fn find(&self, filter: EntityFilter<'_, A>) -> Result<Vec<A>, StoreError>;

    async fn load(&self, id: Uuid) -> Result<Versioned<A>, StoreError> {
        self.get(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(EntityRef::new(A::KIND, id)))
    }
}
