use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

use super::aggregate::Aggregate;
use super::event::EventEnvelope;
use crate::error::EngineError;
use crate::metrics::Metrics;
use crate::store::{Repository, StoreError, Versioned};
use crate::utils::{retry_on_transient, RetryConfig};

// ============================================================================
// Generic Command Handler
// ============================================================================
//
// Orchestrates: load -> decide -> Aggregate::execute -> version-checked save
//
// A conflicting concurrent writer makes the save fail with a version
// conflict; the whole cycle is then retried, so the decision is always made
// against freshly loaded state (including any children the decision reads).
//
// ============================================================================

/// Per-request metadata carried into every envelope
#[derive(Debug, Clone, Copy)]
pub struct CommandContext {
    pub correlation_id: Uuid,
    pub actor_id: Option<Uuid>,
}

impl CommandContext {
    pub fn new(actor_id: Option<Uuid>) -> Self {
        Self {
            correlation_id: Uuid::now_v7(),
            actor_id,
        }
    }

    /// Changes made by the engine itself (cascades, reconciliation)
    pub fn system() -> Self {
        Self::new(None)
    }
}

/// Outcome of a committed command; `events` is empty when nothing changed
#[derive(Debug, Clone)]
pub struct Committed<A: Aggregate> {
    pub entity: A,
    pub version: i64,
    pub events: Vec<EventEnvelope<A::Event>>,
}

impl<A: Aggregate> Committed<A> {
    pub fn changed(&self) -> bool {
        !self.events.is_empty()
    }
}

pub struct CommandHandler<A: Aggregate> {
    repository: Arc<dyn Repository<A>>,
    retry: RetryConfig,
    metrics: Arc<Metrics>,
}

impl<A: Aggregate> CommandHandler<A>
where
    EngineError: From<A::Error>,
{
    pub fn new(repository: Arc<dyn Repository<A>>, retry: RetryConfig, metrics: Arc<Metrics>) -> Self {
        Self {
            repository,
            retry,
            metrics,
        }
    }

    pub fn repository(&self) -> &Arc<dyn Repository<A>> {
        &self.repository
    }

    /// Persist a freshly created entity with its creation events
    pub async fn create(
        &self,
        entity: A,
        events: Vec<A::Event>,
        ctx: CommandContext,
    ) -> Result<Committed<A>, EngineError> {
        let version = self.repository.insert(entity.clone()).await?;
        Ok(Committed {
            events: self.wrap(&entity, version, events, ctx),
            entity,
            version,
        })
    }

    pub async fn handle(
        &self,
        id: Uuid,
        command: A::Command,
        ctx: CommandContext,
    ) -> Result<Committed<A>, EngineError> {
        self.handle_with(id, ctx, |_current| {
            let command = command.clone();
            async move { Ok(Some(command)) }
        })
        .await
    }

    /// Like `handle`, but the command is decided from the loaded state on
    /// every attempt. `decide` may read other entities; returning `None`
    /// commits nothing.
    pub async fn handle_with<F, Fut>(
        &self,
        id: Uuid,
        ctx: CommandContext,
        decide: F,
    ) -> Result<Committed<A>, EngineError>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<Option<A::Command>, EngineError>>,
    {
        let decide = &decide;
        retry_on_transient(self.retry.clone(), |_attempt| self.attempt(id, ctx, decide))
            .await
            .into_result()
    }

    /// Delete after `check` accepts the current state
    pub async fn delete<F>(&self, id: Uuid, check: F) -> Result<A, EngineError>
    where
        F: Fn(&A) -> Result<(), EngineError>,
    {
        let check = &check;
        retry_on_transient(self.retry.clone(), |_attempt| async move {
            let Versioned { version, entity } = self.repository.load(id).await?;
            check(&entity)?;
            self.repository
                .delete(id, version)
                .await
                .map_err(|e| self.observe_conflict(e))?;
            Ok::<A, EngineError>(entity)
        })
        .await
        .into_result()
    }

    async fn attempt<F, Fut>(&self, id: Uuid, ctx: CommandContext, decide: &F) -> Result<Committed<A>, EngineError>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<Option<A::Command>, EngineError>>,
    {
        let Versioned { version, entity } = self.repository.load(id).await?;

        let Some(command) = decide(entity.clone()).await? else {
            return Ok(Committed {
                entity,
                version,
                events: Vec::new(),
            });
        };

        let mut next = entity;
        let events = next.execute(&command)?;
        if events.is_empty() {
            return Ok(Committed {
                entity: next,
                version,
                events: Vec::new(),
            });
        }

        let new_version = self
            .repository
            .save(next.clone(), version)
            .await
            .map_err(|e| self.observe_conflict(e))?;

        tracing::debug!(
            entity = %next.entity_ref(),
            version = new_version,
            events = events.len(),
            "Command committed"
        );

        Ok(Committed {
            events: self.wrap(&next, new_version, events, ctx),
            entity: next,
            version: new_version,
        })
    }

    fn wrap(&self, entity: &A, version: i64, events: Vec<A::Event>, ctx: CommandContext) -> Vec<EventEnvelope<A::Event>> {
        events
            .into_iter()
            .map(|event| {
                EventEnvelope::new(entity.entity_ref(), version, event, ctx.correlation_id)
                    .with_actor(ctx.actor_id)
            })
            .collect()
    }

    fn observe_conflict(&self, error: StoreError) -> EngineError {
        if error.is_conflict() {
            self.metrics.record_conflict(A::KIND.as_str());
            tracing::debug!(kind = %A::KIND, error = %error, "Version conflict, state will be reloaded");
        }
        error.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{DomainEvent, Entity, EntityKind};
    use crate::store::InMemoryRepository;
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicU32, Ordering};

    // A counter aggregate is enough to exercise load/decide/save/retry
    #[derive(Debug, Clone)]
    struct Tally {
        id: Uuid,
        total: u32,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    enum TallyEvent {
        Added { amount: u32 },
    }

    impl DomainEvent for TallyEvent {
        fn event_type(&self) -> &'static str {
            "Added"
        }
    }

    impl Entity for Tally {
        const KIND: EntityKind = EntityKind::Package;

        fn id(&self) -> Uuid {
            self.id
        }
    }

    impl Aggregate for Tally {
        type Event = TallyEvent;
        type Command = u32;
        type Error = std::convert::Infallible;

        fn handle_command(&self, amount: &u32) -> Result<Vec<TallyEvent>, Self::Error> {
            if *amount == 0 {
                return Ok(vec![]);
            }
            Ok(vec![TallyEvent::Added { amount: *amount }])
        }

        fn apply_event(&mut self, event: &TallyEvent) -> Result<(), Self::Error> {
            let TallyEvent::Added { amount } = event;
            self.total += amount;
            Ok(())
        }
    }

    impl From<std::convert::Infallible> for EngineError {
        fn from(never: std::convert::Infallible) -> Self {
            match never {}
        }
    }

    fn handler() -> (Arc<InMemoryRepository<Tally>>, CommandHandler<Tally>) {
        let repo = Arc::new(InMemoryRepository::new());
        let handler = CommandHandler::new(
            repo.clone() as Arc<dyn Repository<Tally>>,
            RetryConfig {
                max_attempts: 50,
                initial_delay: std::time::Duration::from_millis(1),
                max_delay: std::time::Duration::from_millis(5),
                multiplier: 1.5,
            },
            Arc::new(Metrics::new().unwrap()),
        );
        (repo, handler)
    }

    #[tokio::test]
    async fn test_handle_wraps_events_with_new_version() {
        let (_repo, handler) = handler();
        let tally = Tally { id: Uuid::now_v7(), total: 0 };
        handler.create(tally.clone(), vec![], CommandContext::system()).await.unwrap();

        let actor = Uuid::now_v7();
        let committed = handler
            .handle(tally.id, 3, CommandContext::new(Some(actor)))
            .await
            .unwrap();

        assert_eq!(committed.version, 2);
        assert_eq!(committed.entity.total, 3);
        assert_eq!(committed.events.len(), 1);
        assert_eq!(committed.events[0].version, 2);
        assert_eq!(committed.events[0].actor_id, Some(actor));
    }

    #[tokio::test]
    async fn test_no_events_means_no_write() {
        let (repo, handler) = handler();
        let tally = Tally { id: Uuid::now_v7(), total: 0 };
        handler.create(tally.clone(), vec![], CommandContext::system()).await.unwrap();

        let committed = handler.handle(tally.id, 0, CommandContext::system()).await.unwrap();

        assert!(!committed.changed());
        assert_eq!(repo.load(tally.id).await.unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_decide_returning_none_commits_nothing() {
        let (_repo, handler) = handler();
        let tally = Tally { id: Uuid::now_v7(), total: 0 };
        handler.create(tally.clone(), vec![], CommandContext::system()).await.unwrap();

        let committed = handler
            .handle_with(tally.id, CommandContext::system(), |_current| async { Ok(None) })
            .await
            .unwrap();

        assert_eq!(committed.version, 1);
        assert!(committed.events.is_empty());
    }

    #[tokio::test]
    async fn test_guard_error_is_not_retried() {
        let (_repo, handler) = handler();
        let tally = Tally { id: Uuid::now_v7(), total: 0 };
        handler.create(tally.clone(), vec![], CommandContext::system()).await.unwrap();
        let calls = AtomicU32::new(0);

        let result = handler
            .handle_with(tally.id, CommandContext::system(), |_current| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<Option<u32>, _>(EngineError::invalid("nope")) }
            })
            .await;

        assert!(matches!(result, Err(EngineError::Invalid(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_commands_do_not_lose_updates() {
        let (repo, handler) = handler();
        let handler = Arc::new(handler);
        let tally = Tally { id: Uuid::now_v7(), total: 0 };
        handler.create(tally.clone(), vec![], CommandContext::system()).await.unwrap();

        let mut tasks = Vec::new();
        for _ in 0..10 {
            let handler = handler.clone();
            let id = tally.id;
            tasks.push(tokio::spawn(async move {
                handler.handle(id, 1, CommandContext::system()).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let stored = repo.load(tally.id).await.unwrap();
        assert_eq!(stored.entity.total, 10);
        assert_eq!(stored.version, 11);
    }

    #[tokio::test]
    async fn test_delete_runs_check() {
        let (repo, handler) = handler();
        let tally = Tally { id: Uuid::now_v7(), total: 0 };
        handler.create(tally.clone(), vec![], CommandContext::system()).await.unwrap();

        let refused = handler
            .delete(tally.id, |_t| Err(EngineError::invalid("locked")))
            .await;
        assert!(refused.is_err());

        handler.delete(tally.id, |_t| Ok(())).await.unwrap();
        assert!(repo.get(tally.id).await.unwrap().is_none());
    }
}
