// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Relational store for goods.
//!
//! Postgres in production, SQLite for tests and local runs, both through the
//! sqlx `Any` driver:
//! ```sql
//! CREATE TABLE goods (
//!   id          BIGSERIAL PRIMARY KEY,
//!   project_id  BIGINT NOT NULL,
//!   name        TEXT NOT NULL,
//!   description TEXT,
//!   priority    BIGINT NOT NULL,
//!   removed     BIGINT NOT NULL DEFAULT 0,    -- 0/1
//!   created_at  BIGINT NOT NULL               -- epoch millis
//! )
//! ```
//!
//! ## sqlx Any Driver Quirks
//!
//! `Any` has no timestamp or cross-dialect boolean mapping, so `created_at`
//! is stored as epoch milliseconds and `removed` as an integer flag.
//! Placeholders use the `$N` form, which both Postgres and SQLite accept.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{Any, AnyPool, Row, Transaction};
use std::sync::Once;
use std::time::Duration;
use tracing::{debug, instrument};

use super::traits::{GoodsRepository, Reordered};
use crate::error::GoodsError;
use crate::good::Good;
use crate::rank::Shift;
use crate::retry::{connect_with_backoff, Backoff};

// SQLx `Any` driver requires runtime installation
static INSTALL_DRIVERS: Once = Once::new();

fn install_drivers() {
    INSTALL_DRIVERS.call_once(|| {
        sqlx::any::install_default_drivers();
    });
}

const GOOD_COLUMNS: &str = "id, project_id, name, description, priority, removed, created_at";

pub struct SqlGoodsStore {
    pool: AnyPool,
    is_sqlite: bool,
}

impl SqlGoodsStore {
    /// Connect and create the schema if needed.
    pub async fn new(connection_string: &str) -> Result<Self, GoodsError> {
        install_drivers();

        let is_sqlite = connection_string.starts_with("sqlite:");
        // An in-memory SQLite database lives and dies with its connection
        let in_memory = is_sqlite && connection_string.contains(":memory:");

        let options = if in_memory {
            AnyPoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            AnyPoolOptions::new()
                .max_connections(20)
                .acquire_timeout(Duration::from_secs(10))
                .idle_timeout(Duration::from_secs(300))
        };

        let pool = connect_with_backoff("sql", &Backoff::startup(), || {
            options.clone().connect(connection_string)
        })
        .await
        .map_err(GoodsError::store)?;

        let store = Self { pool, is_sqlite };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> AnyPool {
        self.pool.clone()
    }

    async fn init_schema(&self) -> Result<(), GoodsError> {
        let table = if self.is_sqlite {
            r#"
            CREATE TABLE IF NOT EXISTS goods (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                description TEXT,
                priority INTEGER NOT NULL,
                removed INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            )
            "#
        } else {
            r#"
            CREATE TABLE IF NOT EXISTS goods (
                id BIGSERIAL PRIMARY KEY,
                project_id BIGINT NOT NULL,
                name TEXT NOT NULL,
                description TEXT,
                priority BIGINT NOT NULL,
                removed BIGINT NOT NULL DEFAULT 0,
                created_at BIGINT NOT NULL
            )
            "#
        };

        sqlx::query(table)
            .execute(&self.pool)
            .await
            .map_err(|e| GoodsError::Store(format!("Failed to create goods table: {}", e)))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_goods_project_priority ON goods (project_id, priority)")
            .execute(&self.pool)
            .await
            .map_err(|e| GoodsError::Store(format!("Failed to create goods index: {}", e)))?;

        Ok(())
    }

    /// All goods of a project (removed included), ordered by priority.
    pub async fn project_ranking(&self, project_id: i64) -> Result<Vec<Good>, GoodsError> {
        let sql = format!(
            "SELECT {} FROM goods WHERE project_id = $1 ORDER BY priority, id",
            GOOD_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(project_id)
            .fetch_all(&self.pool)
            .await
            .map_err(GoodsError::store)?;

        rows.iter().map(good_from_row).collect()
    }

    /// Serialize writers of one project for the rest of the transaction.
    ///
    /// Postgres: transaction-scoped advisory lock keyed by project.
    /// SQLite: a single writer already holds the database lock.
    async fn lock_project(
        &self,
        tx: &mut Transaction<'_, Any>,
        project_id: i64,
    ) -> Result<(), GoodsError> {
        if self.is_sqlite {
            return Ok(());
        }
        // Select a constant: `Any` cannot decode the function's void result
        sqlx::query("SELECT 1 AS locked FROM pg_advisory_xact_lock($1)")
            .bind(project_id)
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| GoodsError::Store(format!("Failed to lock project {}: {}", project_id, e)))?;
        Ok(())
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn millis_to_datetime(millis: i64) -> Result<DateTime<Utc>, GoodsError> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| GoodsError::Store(format!("Invalid created_at value: {}", millis)))
}

fn good_from_row(row: &AnyRow) -> Result<Good, GoodsError> {
    let removed: i64 = row.try_get("removed").map_err(GoodsError::store)?;
    let created_at: i64 = row.try_get("created_at").map_err(GoodsError::store)?;

    Ok(Good {
        id: row.try_get("id").map_err(GoodsError::store)?,
        project_id: row.try_get("project_id").map_err(GoodsError::store)?,
        name: row.try_get("name").map_err(GoodsError::store)?,
        description: row.try_get("description").map_err(GoodsError::store)?,
        priority: row.try_get("priority").map_err(GoodsError::store)?,
        removed: removed != 0,
        created_at: millis_to_datetime(created_at)?,
    })
}

#[async_trait]
impl GoodsRepository for SqlGoodsStore {
    #[instrument(skip(self))]
    async fn create_good(&self, project_id: i64, name: &str) -> Result<Good, GoodsError> {
        let mut tx = self.pool.begin().await.map_err(GoodsError::store)?;
        self.lock_project(&mut tx, project_id).await?;

        let sql = format!(
            "INSERT INTO goods (project_id, name, priority, removed, created_at) \
             VALUES ($1, $2, (SELECT COALESCE(MAX(priority), 0) + 1 FROM goods WHERE project_id = $1), 0, $3) \
             RETURNING {}",
            GOOD_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(project_id)
            .bind(name.to_string())
            .bind(now_millis())
            .fetch_one(&mut *tx)
            .await
            .map_err(GoodsError::store)?;
        let good = good_from_row(&row)?;

        tx.commit().await.map_err(GoodsError::store)?;
        debug!(good_id = good.id, priority = good.priority, "Good created");
        Ok(good)
    }

    async fn update_good(
        &self,
        id: i64,
        project_id: i64,
        name: &str,
        description: Option<&str>,
    ) -> Result<Good, GoodsError> {
        let sql = format!(
            "UPDATE goods SET name = $1, description = $2 WHERE id = $3 AND project_id = $4 RETURNING {}",
            GOOD_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(name.to_string())
            .bind(description.map(str::to_string))
            .bind(id)
            .bind(project_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(GoodsError::store)?;

        match row {
            Some(row) => good_from_row(&row),
            None => Err(GoodsError::NotFound),
        }
    }

    async fn remove_good(&self, id: i64, project_id: i64) -> Result<Good, GoodsError> {
        let sql = format!(
            "UPDATE goods SET removed = 1 WHERE id = $1 AND project_id = $2 RETURNING {}",
            GOOD_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(project_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(GoodsError::store)?;

        match row {
            Some(row) => good_from_row(&row),
            None => Err(GoodsError::NotFound),
        }
    }

    async fn get_good_by_id(&self, id: i64) -> Result<Good, GoodsError> {
        let sql = format!("SELECT {} FROM goods WHERE id = $1", GOOD_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(GoodsError::store)?;

        match row {
            Some(row) => good_from_row(&row),
            None => Err(GoodsError::NotFound),
        }
    }

    async fn count_total_and_removed(&self) -> Result<(i64, i64), GoodsError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total, \
             COALESCE(SUM(CASE WHEN removed = 1 THEN 1 ELSE 0 END), 0) AS removed \
             FROM goods",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(GoodsError::store)?;

        let total: i64 = row.try_get("total").map_err(GoodsError::store)?;
        let removed: i64 = row.try_get("removed").map_err(GoodsError::store)?;
        Ok((total, removed))
    }

    /// Shift the project's ranking and move the good, all in one transaction.
    ///
    /// Any early return drops `tx` uncommitted, which rolls it back.
    #[instrument(skip(self))]
    async fn reprioritize(
        &self,
        good_id: i64,
        project_id: i64,
        new_priority: i64,
    ) -> Result<Reordered, GoodsError> {
        let mut tx = self.pool.begin().await.map_err(GoodsError::store)?;
        self.lock_project(&mut tx, project_id).await?;

        let row = sqlx::query("SELECT priority FROM goods WHERE id = $1 AND project_id = $2")
            .bind(good_id)
            .bind(project_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(GoodsError::store)?;
        let Some(row) = row else {
            return Err(GoodsError::NotFound);
        };
        let current: i64 = row.try_get("priority").map_err(GoodsError::store)?;

        let shift = Shift::plan(current, new_priority);
        let shifted = match shift {
            Shift::Increment { from, until } => Some(
                sqlx::query(
                    "UPDATE goods SET priority = priority + 1 \
                     WHERE project_id = $1 AND priority >= $2 AND priority < $3",
                )
                .bind(project_id)
                .bind(from)
                .bind(until),
            ),
            Shift::Decrement { after, to } => Some(
                sqlx::query(
                    "UPDATE goods SET priority = priority - 1 \
                     WHERE project_id = $1 AND priority > $2 AND priority <= $3",
                )
                .bind(project_id)
                .bind(after)
                .bind(to),
            ),
            Shift::Unchanged => None,
        };
        if let Some(query) = shifted {
            let result = query.execute(&mut *tx).await.map_err(GoodsError::store)?;
            debug!(moved = result.rows_affected(), direction = shift.direction(), "Ranking shifted");
        }

        let row = sqlx::query(
            "UPDATE goods SET priority = $1 WHERE id = $2 AND project_id = $3 RETURNING name, description",
        )
        .bind(new_priority)
        .bind(good_id)
        .bind(project_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(GoodsError::store)?;

        let name: String = row.try_get("name").map_err(GoodsError::store)?;
        let description: Option<String> = row.try_get("description").map_err(GoodsError::store)?;

        tx.commit().await.map_err(GoodsError::store)?;

        Ok(Reordered {
            name,
            description,
            previous_priority: current,
        })
    }
}
