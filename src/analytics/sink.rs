// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Append-only analytics store for mutation events.
//!
//! # Table
//!
//! ```text
//! CREATE TABLE IF NOT EXISTS events (
//!     id Int64, ProjectId Int64, Name String, Description String,
//!     Priority Int64, Removed UInt8, EventTime DateTime
//! ) ENGINE = MergeTree() ORDER BY (id, ProjectId, Name)
//! ```
//!
//! Rows are never updated. A batch goes out through one `INSERT` stream in
//! RowBinary, so it lands whole or not at all. `EventTime` travels as epoch
//! seconds, the wire form of `DateTime`, and reads back as
//! `YYYY-MM-DD HH:MM:SS` in UTC.

use async_trait::async_trait;
use chrono::DateTime;
use clickhouse::{Client, Row};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::GoodsError;
use crate::good::GoodEvent;

pub const EVENTS_TABLE: &str = "events";

/// One `events` row in the analytics encoding.
#[derive(Debug, Clone, PartialEq, Eq, Row, Serialize)]
pub struct AnalyticsRow {
    pub id: i64,
    #[serde(rename = "ProjectId")]
    pub project_id: i64,
    #[serde(rename = "Name")]
    pub name: String,
    /// Empty when the good has none.
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Priority")]
    pub priority: i64,
    #[serde(rename = "Removed")]
    pub removed: u8,
    /// Seconds since the epoch, UTC.
    #[serde(rename = "EventTime")]
    pub event_time: u32,
}

impl AnalyticsRow {
    /// `EventTime` as the table displays it.
    pub fn event_time_text(&self) -> String {
        DateTime::from_timestamp(i64::from(self.event_time), 0)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default()
    }
}

impl From<&GoodEvent> for AnalyticsRow {
    fn from(event: &GoodEvent) -> Self {
        // DateTime covers 1970..2106
        let event_time = event.event_time.timestamp().clamp(0, i64::from(u32::MAX)) as u32;
        Self {
            id: event.id,
            project_id: event.project_id,
            name: event.name.clone(),
            description: event.description.clone().unwrap_or_default(),
            priority: event.priority,
            removed: u8::from(event.removed),
            event_time,
        }
    }
}

#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    /// Single-row write. Not used by the ingest pipeline.
    async fn insert_event(&self, event: &GoodEvent) -> Result<(), GoodsError>;

    /// Write a whole batch in one insert.
    async fn insert_batch(&self, events: &[GoodEvent]) -> Result<(), GoodsError>;
}

/// ClickHouse over HTTP.
pub struct ClickHouseSink {
    client: Client,
}

impl ClickHouseSink {
    pub fn new(url: &str, user: &str, password: &str, database: &str) -> Self {
        let client = Client::default()
            .with_url(url)
            .with_user(user)
            .with_password(password)
            .with_database(database);
        Self { client }
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    pub async fn create_table(&self) -> Result<(), GoodsError> {
        self.client
            .query(
                "CREATE TABLE IF NOT EXISTS events (
                    id Int64,
                    ProjectId Int64,
                    Name String,
                    Description String,
                    Priority Int64,
                    Removed UInt8,
                    EventTime DateTime
                ) ENGINE = MergeTree()
                ORDER BY (id, ProjectId, Name)",
            )
            .execute()
            .await
            .map_err(GoodsError::store)?;

        info!(table = EVENTS_TABLE, "Analytics table ready");
        Ok(())
    }

    async fn insert_rows(&self, rows: &[AnalyticsRow]) -> Result<(), GoodsError> {
        let mut insert = self
            .client
            .insert::<AnalyticsRow>(EVENTS_TABLE)
            .map_err(GoodsError::store)?;
        for row in rows {
            insert.write(row).await.map_err(GoodsError::store)?;
        }
        insert.end().await.map_err(GoodsError::store)
    }
}

#[async_trait]
impl AnalyticsSink for ClickHouseSink {
    async fn insert_event(&self, event: &GoodEvent) -> Result<(), GoodsError> {
        self.insert_rows(&[AnalyticsRow::from(event)]).await
    }

    async fn insert_batch(&self, events: &[GoodEvent]) -> Result<(), GoodsError> {
        if events.is_empty() {
            return Ok(());
        }
        let rows: Vec<AnalyticsRow> = events.iter().map(AnalyticsRow::from).collect();
        self.insert_rows(&rows).await?;
        debug!(rows = rows.len(), "Analytics batch inserted");
        Ok(())
    }
}
