// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::GoodsError;
use crate::good::Good;

/// Outcome of a committed reorder transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reordered {
    pub name: String,
    pub description: Option<String>,
    /// Priority the good held before the transaction.
    pub previous_priority: i64,
}

/// Source of truth for goods.
///
/// Every mutating method runs as one transaction; `NotFound` is reported
/// distinctly from every other failure.
#[async_trait]
pub trait GoodsRepository: Send + Sync {
    /// Insert a good at the bottom of its project's ranking.
    async fn create_good(&self, project_id: i64, name: &str) -> Result<Good, GoodsError>;

    async fn update_good(
        &self,
        id: i64,
        project_id: i64,
        name: &str,
        description: Option<&str>,
    ) -> Result<Good, GoodsError>;

    /// Soft delete. Priorities are not renumbered.
    async fn remove_good(&self, id: i64, project_id: i64) -> Result<Good, GoodsError>;

    /// Point lookup by id alone.
    async fn get_good_by_id(&self, id: i64) -> Result<Good, GoodsError>;

    /// `(total, removed)` across the whole table.
    async fn count_total_and_removed(&self) -> Result<(i64, i64), GoodsError>;

    /// Atomic rank shift; see [`crate::rank`].
    async fn reprioritize(
        &self,
        good_id: i64,
        project_id: i64,
        new_priority: i64,
    ) -> Result<Reordered, GoodsError>;
}

/// Key-value cache for list projections.
///
/// `get` distinguishes a miss (`Ok(None)`) from a backend failure (`Err`).
#[async_trait]
pub trait GoodsCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, GoodsError>;
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), GoodsError>;
    async fn delete(&self, key: &str) -> Result<(), GoodsError>;
}
