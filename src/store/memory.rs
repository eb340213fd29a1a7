use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::repository::{EntityFilter, Repository, StoreError, Versioned};
use crate::lifecycle::{Entity, EntityRef};

/// Process-local repository; the write lock makes each version check and
/// write a single atomic step.
pub struct InMemoryRepository<A: Entity> {
    entries: RwLock<HashMap<Uuid, Versioned<A>>>,
}

impl<A: Entity> InMemoryRepository<A> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

impl<A: Entity> Default for InMemoryRepository<A> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<A: Entity> Repository<A> for InMemoryRepository<A> {
    async fn get(&self, id: Uuid) -> Result<Option<Versioned<A>>, StoreError> {
        Ok(self.entries.read().await.get(&id).cloned())
    }

    async fn insert(&self, entity: A) -> Result<i64, StoreError> {
        let mut entries = self.entries.write().await;
        let id = entity.id();
        if entries.contains_key(&id) {
            return Err(StoreError::AlreadyExists(EntityRef::new(A::KIND, id)));
        }
        entries.insert(id, Versioned { version: 1, entity });
        Ok(1)
    }

    async fn save(&self, entity: A, expected_version: i64) -> Result<i64, StoreError> {
        let mut entries = self.entries.write().await;
        let reference = EntityRef::new(A::KIND, entity.id());
        let slot = entries
            .get_mut(&reference.id)
            .ok_or(StoreError::NotFound(reference))?;

        if slot.version != expected_version {
            return Err(StoreError::Conflict {
                entity: reference,
                expected: expected_version,
                current: slot.version,
            });
        }

        slot.version += 1;
        slot.entity = entity;
        Ok(slot.version)
    }

    async fn delete(&self, id: Uuid, expected_version: i64) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        let reference = EntityRef::new(A::KIND, id);
        let current = entries
            .get(&id)
            .map(|slot| slot.version)
            .ok_or(StoreError::NotFound(reference))?;

        if current != expected_version {
            return Err(StoreError::Conflict {
                entity: reference,
                expected: expected_version,
                current,
            });
        }

        entries.remove(&id);
        Ok(())
    }

    async fn find(&self, filter: EntityFilter<'_, A>) -> Result<Vec<A>, StoreError> {
        let entries = self.entries.read().await;
        let mut found: Vec<A> = entries
            .values()
            .filter(|slot| filter(&slot.entity))
            .map(|slot| slot.entity.clone())
            .collect();
        found.sort_by_key(|entity| entity.id());
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::EntityKind;

    #[derive(Debug, Clone, PartialEq)]
    struct Crate {
        id: Uuid,
        label: &'static str,
    }

    impl Entity for Crate {
        const KIND: EntityKind = EntityKind::Cargo;

        fn id(&self) -> Uuid {
            self.id
        }
    }

    fn new_crate(label: &'static str) -> Crate {
        Crate {
            id: Uuid::now_v7(),
            label,
        }
    }

    #[tokio::test]
    async fn test_insert_and_load() {
        let repo = InMemoryRepository::new();
        let item = new_crate("a");

        assert_eq!(repo.insert(item.clone()).await.unwrap(), 1);

        let loaded = repo.load(item.id).await.unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.entity, item);
    }

    #[tokio::test]
    async fn test_duplicate_insert_rejected() {
        let repo = InMemoryRepository::new();
        let item = new_crate("a");
        repo.insert(item.clone()).await.unwrap();

        let result = repo.insert(item).await;
        assert!(matches!(result, Err(StoreError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_stale_save_is_a_conflict() {
        let repo = InMemoryRepository::new();
        let item = new_crate("a");
        repo.insert(item.clone()).await.unwrap();

        let mut first = item.clone();
        first.label = "first";
        assert_eq!(repo.save(first, 1).await.unwrap(), 2);

        let mut second = item.clone();
        second.label = "second";
        let result = repo.save(second, 1).await;

        match result {
            Err(StoreError::Conflict { expected, current, .. }) => {
                assert_eq!(expected, 1);
                assert_eq!(current, 2);
            }
            other => panic!("expected conflict, got {:?}", other),
        }
        assert_eq!(repo.load(item.id).await.unwrap().entity.label, "first");
    }

    #[tokio::test]
    async fn test_delete_checks_version() {
        let repo = InMemoryRepository::new();
        let item = new_crate("a");
        repo.insert(item.clone()).await.unwrap();

        assert!(repo.delete(item.id, 7).await.unwrap_err().is_conflict());
        repo.delete(item.id, 1).await.unwrap();
        assert!(repo.get(item.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_filters_and_orders_by_id() {
        let repo = InMemoryRepository::new();
        let a = new_crate("keep");
        let b = new_crate("skip");
        let c = new_crate("keep");
        for item in [c.clone(), b, a.clone()] {
            repo.insert(item).await.unwrap();
        }

        let found = repo.find(&|item: &Crate| item.label == "keep").await.unwrap();
        assert_eq!(found, vec![a, c]);
    }
}
