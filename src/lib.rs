// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # Goods Engine
//!
//! Rank maintenance and event fan-out for a per-project goods catalog.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  GoodsService (mutations)                   │
//! │  • create / update / remove commit in the relational store  │
//! │  • reprioritize shifts the project ranking in one tx        │
//! │  • returns (outcome, PostCommit) to the caller              │
//! └─────────────────────────────────────────────────────────────┘
//!          │ PostCommit (after the response)        ▲ list()
//!          ▼                                        │
//! ┌──────────────────────────┐      ┌──────────────────────────┐
//! │  DEL goods:<id>          │      │   CacheAsideReader       │
//! │  PUBLISH goods.<topic>   │      │  goods:<n> hit / load    │
//! └──────────────────────────┘      └──────────────────────────┘
//!          │
//!          ▼  EventBus (Redis Pub/Sub, at-least-once)
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      BatchIngestor                          │
//! │  • EventBuffer swapped out at 100 events or every 5 s       │
//! │  • one RowBinary INSERT stream per batch, no retry          │
//! └─────────────────────────────────────────────────────────────┘
//!          │
//!          ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │           Analytics store (ClickHouse `events`)             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use goods_engine::{
//!     BatchIngestor, ClickHouseSink, GoodsEngineConfig, GoodsService,
//!     RedisEventBus, RedisGoodsCache, SqlGoodsStore, Topic,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), goods_engine::GoodsError> {
//!     let config = GoodsEngineConfig::default();
//!     let repo = Arc::new(SqlGoodsStore::new("postgres://goods@localhost/goods").await?);
//!     let cache = Arc::new(RedisGoodsCache::new("redis://localhost:6379").await?);
//!     let bus = Arc::new(RedisEventBus::new("redis://localhost:6379").await?);
//!
//!     let sink = ClickHouseSink::new("http://localhost:8123", "default", "", "default");
//!     sink.create_table().await?;
//!     let ingestor = Arc::new(BatchIngestor::from_config(Arc::new(sink), &config));
//!     let handle = ingestor.start(bus.clone(), &Topic::ALL).await?;
//!
//!     let service = GoodsService::new(repo, cache, bus, &config);
//!     let (good, post_commit) = service.create(1, "Tea").await?;
//!     println!("created {}", good.id);
//!     post_commit.run().await;
//!
//!     handle.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`service`]: mutation entry points and post-commit hooks
//! - [`rank`]: the reorder plan and its transactional executor
//! - [`cache_aside`]: paged list reads through the cache
//! - [`events`]: bus transports and the publisher
//! - [`batching`] / [`ingestor`]: buffering and flushing into analytics
//! - [`analytics`]: analytics store backends
//! - [`storage`]: relational store and cache backends

pub mod analytics;
pub mod batching;
pub mod cache_aside;
pub mod config;
pub mod error;
pub mod events;
pub mod good;
pub mod ingestor;
pub mod metrics;
pub mod rank;
pub mod retry;
pub mod service;
pub mod storage;

pub use analytics::{AnalyticsRow, AnalyticsSink, ClickHouseSink, MemorySink};
pub use batching::{EventBuffer, FlushBatch, FlushReason};
pub use cache_aside::{CacheAsideReader, SkipReason};
pub use config::GoodsEngineConfig;
pub use error::{ErrorBody, GoodsError};
pub use events::{EventBus, EventPublisher, InMemoryEventBus, Mutation, RedisEventBus, Topic};
pub use good::{Good, GoodEvent, ListMeta, ListPage, ListQuery, RemoveOutcome, ReprioritizeOutcome};
pub use ingestor::{BatchIngestor, IngestorHandle, IngestorStats};
pub use rank::{RankReorderer, Shift};
pub use service::{GoodsService, PostCommit};
pub use storage::memory::InMemoryCache;
pub use storage::redis::RedisGoodsCache;
pub use storage::sql::SqlGoodsStore;
pub use storage::traits::{GoodsCache, GoodsRepository, Reordered};
