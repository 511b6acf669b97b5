// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Mutation entry points.
//!
//! Each write returns its outcome together with a [`PostCommit`] hook. The
//! caller answers its client first and only then runs (or spawns) the
//! hook, which invalidates the good's cache slot and publishes the
//! mutation event:
//!
//! ```text
//! service.update(..) ──► commit ──► (Good, PostCommit)
//!                                      │
//!   caller writes response ◄───────────┘
//!   post_commit.spawn() ──► DEL goods:<id> ──► PUBLISH goods.updated
//! ```
//!
//! Hook failures are logged and otherwise ignored; the mutation already
//! committed and the response is already out.

use chrono::Utc;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use crate::cache_aside::CacheAsideReader;
use crate::config::GoodsEngineConfig;
use crate::error::GoodsError;
use crate::events::{EventBus, EventPublisher, Mutation};
use crate::good::{Good, GoodEvent, ListPage, ListQuery, RemoveOutcome, ReprioritizeOutcome};
use crate::rank::RankReorderer;
use crate::storage::traits::{GoodsCache, GoodsRepository};

/// Side effects owed after a committed mutation.
#[must_use = "a PostCommit does nothing until run or spawned"]
pub struct PostCommit {
    reader: Arc<CacheAsideReader>,
    publisher: EventPublisher,
    invalidate: Option<i64>,
    mutation: Mutation,
    event: GoodEvent,
}

impl PostCommit {
    pub fn mutation(&self) -> Mutation {
        self.mutation
    }

    pub fn event(&self) -> &GoodEvent {
        &self.event
    }

    /// Invalidate, then publish. Never fails.
    pub async fn run(self) {
        if let Some(id) = self.invalidate {
            match self.reader.invalidate(id).await {
                Ok(()) => crate::metrics::record_invalidation("success"),
                Err(e) => {
                    crate::metrics::record_invalidation("error");
                    warn!(id, error = %e, "Cache invalidation failed, entry stays until TTL");
                }
            }
        }

        // Publisher logs and counts its own failures
        let _ = self.publisher.publish_mutation(self.mutation, &self.event).await;
    }

    /// Run on a background task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

pub struct GoodsService {
    repo: Arc<dyn GoodsRepository>,
    reader: Arc<CacheAsideReader>,
    reorderer: RankReorderer,
    publisher: EventPublisher,
    default_query: ListQuery,
}

impl GoodsService {
    pub fn new(
        repo: Arc<dyn GoodsRepository>,
        cache: Arc<dyn GoodsCache>,
        bus: Arc<dyn EventBus>,
        config: &GoodsEngineConfig,
    ) -> Self {
        let reader = Arc::new(CacheAsideReader::new(Arc::clone(&repo), cache, config.cache_ttl()));
        Self {
            reorderer: RankReorderer::new(Arc::clone(&repo)),
            repo,
            reader,
            publisher: EventPublisher::new(bus),
            default_query: ListQuery {
                limit: config.list_default_limit,
                offset: config.list_default_offset,
            },
        }
    }

    fn post_commit(&self, mutation: Mutation, invalidate: Option<i64>, event: GoodEvent) -> PostCommit {
        PostCommit {
            reader: Arc::clone(&self.reader),
            publisher: self.publisher.clone(),
            invalidate,
            mutation,
            event,
        }
    }

    /// Append a good to the end of its project's ranking.
    #[instrument(skip(self))]
    pub async fn create(&self, project_id: i64, name: &str) -> Result<(Good, PostCommit), GoodsError> {
        let name = validate_name(name)?;
        let good = self.repo.create_good(project_id, name).await?;
        info!(id = good.id, priority = good.priority, "Good created");

        let event = GoodEvent::from_good(&good, good.created_at);
        Ok((good, self.post_commit(Mutation::Created, None, event)))
    }

    #[instrument(skip(self, description))]
    pub async fn update(
        &self,
        id: i64,
        project_id: i64,
        name: &str,
        description: Option<&str>,
    ) -> Result<(Good, PostCommit), GoodsError> {
        let name = validate_name(name)?;
        let good = self.repo.update_good(id, project_id, name, description).await?;
        info!("Good updated");

        let event = GoodEvent::from_good(&good, Utc::now());
        let hook = self.post_commit(Mutation::Updated, Some(good.id), event);
        Ok((good, hook))
    }

    /// Soft delete. The good keeps its rank.
    #[instrument(skip(self))]
    pub async fn remove(&self, id: i64, project_id: i64) -> Result<(RemoveOutcome, PostCommit), GoodsError> {
        let good = self.repo.remove_good(id, project_id).await?;
        info!("Good removed");

        let event = GoodEvent::from_good(&good, Utc::now());
        let outcome = RemoveOutcome {
            id: good.id,
            project_id: good.project_id,
            removed: good.removed,
        };
        Ok((outcome, self.post_commit(Mutation::Removed, Some(good.id), event)))
    }

    #[instrument(skip(self))]
    pub async fn reprioritize(
        &self,
        id: i64,
        project_id: i64,
        new_priority: i64,
    ) -> Result<(ReprioritizeOutcome, PostCommit), GoodsError> {
        let (name, description) = self.reorderer.reprioritize(id, project_id, new_priority).await?;

        // Goes out on goods.removed flagged removed; consumers expect it
        let event = GoodEvent {
            id,
            project_id,
            name,
            description,
            priority: new_priority,
            removed: true,
            event_time: Utc::now(),
        };
        let outcome = ReprioritizeOutcome { id, priority: new_priority };
        Ok((outcome, self.post_commit(Mutation::Reprioritized, Some(id), event)))
    }

    /// Cache-aside page read. Missing paging values fall back to the
    /// configured defaults.
    pub async fn list(&self, limit: Option<i64>, offset: Option<i64>) -> ListPage {
        let query = ListQuery {
            limit: limit.unwrap_or(self.default_query.limit),
            offset: offset.unwrap_or(self.default_query.offset),
        };
        self.reader.list(query).await
    }

    pub fn reader(&self) -> &Arc<CacheAsideReader> {
        &self.reader
    }
}

fn validate_name(name: &str) -> Result<&str, GoodsError> {
    if name.trim().is_empty() {
        return Err(GoodsError::InvalidInput("name must not be empty".to_string()));
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{InMemoryEventBus, Topic};
    use crate::storage::memory::InMemoryCache;
    use crate::storage::sql::SqlGoodsStore;
    use futures_util::StreamExt;

    struct Harness {
        service: GoodsService,
        cache: Arc<InMemoryCache>,
        bus: Arc<InMemoryEventBus>,
    }

    async fn harness() -> Harness {
        let repo = Arc::new(SqlGoodsStore::new("sqlite::memory:").await.unwrap());
        let cache = Arc::new(InMemoryCache::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let service = GoodsService::new(repo, cache.clone(), bus.clone(), &GoodsEngineConfig::default());
        Harness { service, cache, bus }
    }

    async fn next_event(stream: &mut crate::events::PayloadStream) -> GoodEvent {
        serde_json::from_slice(&stream.next().await.unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_create_rejects_blank_name() {
        let h = harness().await;
        let err = h.service.create(1, "   ").await.err().unwrap();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_create_publishes_with_creation_time() {
        let h = harness().await;
        let mut created = h.bus.subscribe(Topic::Created.as_str()).await.unwrap();

        let (good, hook) = h.service.create(1, "Tea").await.unwrap();
        assert_eq!(good.priority, 1);
        hook.run().await;

        let event = next_event(&mut created).await;
        assert_eq!(event.id, good.id);
        assert_eq!(event.event_time, good.created_at);
        assert!(!event.removed);
    }

    #[tokio::test]
    async fn test_update_invalidates_then_publishes() {
        let h = harness().await;
        let (good, hook) = h.service.create(1, "Tea").await.unwrap();
        hook.run().await;

        // Warm the slot
        h.service.list(Some(1), Some(good.id)).await;
        assert_eq!(h.cache.len(), 1);

        let mut updated = h.bus.subscribe(Topic::Updated.as_str()).await.unwrap();
        let (good, hook) = h.service.update(good.id, 1, "Green tea", Some("loose")).await.unwrap();
        hook.run().await;

        assert!(h.cache.is_empty());
        let event = next_event(&mut updated).await;
        assert_eq!(event.name, "Green tea");
        assert_eq!(event.description.as_deref(), Some("loose"));

        let page = h.service.list(Some(1), Some(good.id)).await;
        assert_eq!(page.goods[0].name, "Green tea");
    }

    #[tokio::test]
    async fn test_update_returns_good_and_hook_for_same_id() {
        let h = harness().await;
        h.service.create(1, "Tea").await.unwrap();
        let (second, _) = h.service.create(1, "Coffee").await.unwrap();

        let (good, hook) = h.service.update(second.id, 1, "Espresso", None).await.unwrap();
        assert_eq!(good.id, second.id);
        assert_eq!(good.name, "Espresso");
        assert_eq!(hook.mutation(), Mutation::Updated);
        assert_eq!(hook.event().id, good.id);
        assert_eq!(hook.event().name, "Espresso");
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found_and_emits_nothing() {
        let h = harness().await;
        let result = h.service.update(42, 1, "x", None).await;
        assert!(matches!(result, Err(GoodsError::NotFound)));
    }

    #[tokio::test]
    async fn test_remove_outcome_and_event() {
        let h = harness().await;
        let (good, _) = h.service.create(3, "Tea").await.unwrap();
        let mut removed = h.bus.subscribe(Topic::Removed.as_str()).await.unwrap();

        let (outcome, hook) = h.service.remove(good.id, 3).await.unwrap();
        assert_eq!(outcome, RemoveOutcome { id: good.id, project_id: 3, removed: true });
        hook.run().await;

        let event = next_event(&mut removed).await;
        assert!(event.removed);
        assert_eq!(event.priority, good.priority);
    }

    #[tokio::test]
    async fn test_reprioritize_event_goes_out_as_removed() {
        let h = harness().await;
        for name in ["A", "B", "C", "D"] {
            h.service.create(1, name).await.unwrap();
        }
        let mut removed = h.bus.subscribe(Topic::Removed.as_str()).await.unwrap();

        let (outcome, hook) = h.service.reprioritize(4, 1, 1).await.unwrap();
        assert_eq!(outcome, ReprioritizeOutcome { id: 4, priority: 1 });
        assert_eq!(hook.mutation(), Mutation::Reprioritized);
        hook.run().await;

        let event = next_event(&mut removed).await;
        assert_eq!(event.name, "D");
        assert_eq!(event.priority, 1);
        assert!(event.removed);
    }

    #[tokio::test]
    async fn test_reprioritize_missing_is_not_found() {
        let h = harness().await;
        let result = h.service.reprioritize(9, 1, 1).await;
        assert!(matches!(result, Err(GoodsError::NotFound)));
    }

    #[tokio::test]
    async fn test_list_uses_configured_defaults() {
        let h = harness().await;
        for i in 0..12 {
            h.service.create(1, &format!("good-{i}")).await.unwrap();
        }
        let page = h.service.list(None, None).await;
        assert_eq!(page.meta.limit, 10);
        assert_eq!(page.meta.offset, 1);
        assert_eq!(page.meta.total, 12);
        assert_eq!(page.goods.len(), 10);
    }

    #[tokio::test]
    async fn test_spawned_hook_completes() {
        let h = harness().await;
        let mut created = h.bus.subscribe(Topic::Created.as_str()).await.unwrap();
        let (_, hook) = h.service.create(1, "Tea").await.unwrap();

        hook.spawn().await.unwrap();
        assert_eq!(next_event(&mut created).await.name, "Tea");
    }
}
