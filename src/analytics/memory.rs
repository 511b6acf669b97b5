// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use super::sink::{AnalyticsRow, AnalyticsSink};
use crate::error::GoodsError;
use crate::good::GoodEvent;

/// In-process [`AnalyticsSink`] that keeps every accepted batch.
///
/// Can be switched into a failing mode to simulate an unreachable store.
#[derive(Default)]
pub struct MemorySink {
    batches: Mutex<Vec<Vec<AnalyticsRow>>>,
    failing: AtomicBool,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every write until switched back.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Accepted batches, in write order.
    #[must_use]
    pub fn batches(&self) -> Vec<Vec<AnalyticsRow>> {
        self.batches.lock().clone()
    }

    /// All accepted rows, flattened.
    #[must_use]
    pub fn rows(&self) -> Vec<AnalyticsRow> {
        self.batches.lock().iter().flatten().cloned().collect()
    }

    fn accept(&self, rows: Vec<AnalyticsRow>) -> Result<(), GoodsError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(GoodsError::store("analytics store unavailable"));
        }
        self.batches.lock().push(rows);
        Ok(())
    }
}

#[async_trait]
impl AnalyticsSink for MemorySink {
    async fn insert_event(&self, event: &GoodEvent) -> Result<(), GoodsError> {
        self.accept(vec![AnalyticsRow::from(event)])
    }

    async fn insert_batch(&self, events: &[GoodEvent]) -> Result<(), GoodsError> {
        if events.is_empty() {
            return Ok(());
        }
        self.accept(events.iter().map(AnalyticsRow::from).collect())
    }
}
