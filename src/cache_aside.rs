// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cache-aside list reads.
//!
//! A page of `limit` slots starting at `offset` is assembled slot by slot:
//!
//! ```text
//! goods:<offset+i> ──► cache hit ──────────────► use cached projection
//!                  └─► cache miss ─► store ────► populate (TTL) and use
//!                  └─► cache error / bad entry ─► skip the slot
//! ```
//!
//! Slots are keyed by list position and the numeric suffix is looked up as a
//! good id. Once ids stop being contiguous from 1 a slot can hold another
//! good's projection; writers invalidate by good id, which only matches the
//! slot while the two coincide.
//!
//! At most a handful of slots are resolved at once, in page order. Positions
//! past `i64::MAX` cannot be keyed and count as skipped.
//!
//! Skipped slots shrink the page silently. The `(total, removed)` aggregate
//! is best effort: if counting fails the page is still returned with zeros.

use futures_util::{pin_mut, stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::error::GoodsError;
use crate::good::{Good, ListMeta, ListPage, ListQuery};
use crate::storage::traits::{GoodsCache, GoodsRepository};
use crate::storage::{cache_key, parse_cache_key};

/// Why a list slot was dropped from the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Key suffix is not a number.
    BadKey,
    /// Cache backend failed on read.
    CacheError,
    /// Cached value did not deserialize.
    CorruptEntry,
    /// No good with that id.
    Missing,
    /// Relational store failed on the fallback read.
    StoreError,
    /// Position is past `i64::MAX` and has no key.
    OutOfRange,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadKey => "bad_key",
            Self::CacheError => "cache_error",
            Self::CorruptEntry => "corrupt_entry",
            Self::Missing => "missing",
            Self::StoreError => "store_error",
            Self::OutOfRange => "out_of_range",
        }
    }
}

/// Slot lookups in flight per page. Kept under the store's pool size.
const SLOT_CONCURRENCY: usize = 8;

/// Number of slots in `limit` whose position `offset + i` fits in an `i64`.
fn keyable_slots(offset: i64, limit: i64) -> i64 {
    let limit = limit.max(0);
    if offset < 0 {
        return limit;
    }
    limit.min((i64::MAX - offset).saturating_add(1))
}

#[derive(Debug)]
enum Slot {
    Hit(Good),
    Loaded(Good),
    Skipped(SkipReason),
}

pub struct CacheAsideReader {
    repo: Arc<dyn GoodsRepository>,
    cache: Arc<dyn GoodsCache>,
    ttl: Duration,
}

impl CacheAsideReader {
    pub fn new(repo: Arc<dyn GoodsRepository>, cache: Arc<dyn GoodsCache>, ttl: Duration) -> Self {
        Self { repo, cache, ttl }
    }

    /// Read one page. Never fails; unreadable slots are dropped.
    #[instrument(skip(self), fields(hits, loaded, skipped))]
    pub async fn list(&self, query: ListQuery) -> ListPage {
        let keyable = keyable_slots(query.offset, query.limit);
        let (mut hits, mut loaded, mut skipped) = (0u64, 0u64, 0u64);

        let out_of_range = query.limit.max(0) - keyable;
        if out_of_range > 0 {
            warn!(out_of_range, "Page runs past the last addressable slot");
            skipped += out_of_range as u64;
            crate::metrics::record_skipped_slots(SkipReason::OutOfRange.as_str(), out_of_range as u64);
        }

        // At most SLOT_CONCURRENCY lookups in flight; buffered keeps page order
        let offset = query.offset;
        let slots = stream::iter(0..keyable)
            .map(move |i| {
                let key = cache_key(offset + i);
                async move { self.read_slot(&key).await }
            })
            .buffered(SLOT_CONCURRENCY);
        pin_mut!(slots);

        let mut goods = Vec::new();
        while let Some(slot) = slots.next().await {
            match slot {
                Slot::Hit(good) => {
                    hits += 1;
                    goods.push(good);
                }
                Slot::Loaded(good) => {
                    loaded += 1;
                    goods.push(good);
                }
                Slot::Skipped(_) => skipped += 1,
            }
        }
        let span = tracing::Span::current();
        span.record("hits", hits);
        span.record("loaded", loaded);
        span.record("skipped", skipped);

        let (total, removed) = match self.repo.count_total_and_removed().await {
            Ok(counts) => counts,
            Err(e) => {
                warn!(error = %e, "Failed to count goods, returning page without aggregates");
                (0, 0)
            }
        };

        ListPage {
            meta: ListMeta {
                total,
                removed,
                limit: query.limit,
                offset: query.offset,
            },
            goods,
        }
    }

    /// Drop the cached projection for a good.
    pub async fn invalidate(&self, good_id: i64) -> Result<(), GoodsError> {
        self.cache.delete(&cache_key(good_id)).await
    }

    async fn read_slot(&self, key: &str) -> Slot {
        let slot = match self.cache.get(key).await {
            Ok(Some(cached)) => match serde_json::from_str::<Good>(&cached) {
                Ok(good) => Slot::Hit(good),
                Err(e) => {
                    warn!(key, error = %e, "Corrupt cache entry");
                    Slot::Skipped(SkipReason::CorruptEntry)
                }
            },
            Ok(None) => self.load_and_populate(key).await,
            Err(e) => {
                warn!(key, error = %e, "Cache read failed");
                Slot::Skipped(SkipReason::CacheError)
            }
        };

        match &slot {
            Slot::Hit(_) => crate::metrics::record_cache_hit(),
            Slot::Loaded(_) => crate::metrics::record_cache_miss(),
            Slot::Skipped(reason) => crate::metrics::record_skipped_slot(reason.as_str()),
        }
        slot
    }

    async fn load_and_populate(&self, key: &str) -> Slot {
        let Some(id) = parse_cache_key(key) else {
            warn!(key, "Malformed cache key");
            return Slot::Skipped(SkipReason::BadKey);
        };

        let good = match self.repo.get_good_by_id(id).await {
            Ok(good) => good,
            Err(GoodsError::NotFound) => {
                debug!(key, "No good behind list slot");
                return Slot::Skipped(SkipReason::Missing);
            }
            Err(e) => {
                warn!(key, error = %e, "Failed to load good for list slot");
                return Slot::Skipped(SkipReason::StoreError);
            }
        };

        // Population is best effort; the freshly loaded value is served either way
        match serde_json::to_string(&good) {
            Ok(json) => {
                if let Err(e) = self.cache.set(key, &json, self.ttl).await {
                    warn!(key, error = %e, "Failed to populate cache");
                }
            }
            Err(e) => warn!(key, error = %e, "Failed to serialize good for cache"),
        }
        Slot::Loaded(good)
    }
}
