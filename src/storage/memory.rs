// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

use super::traits::GoodsCache;
use crate::error::GoodsError;

/// In-process [`GoodsCache`] with passive TTL expiry.
///
/// Expiry follows the tokio clock, so paused-time tests can step past a TTL.
pub struct InMemoryCache {
    data: DashMap<String, (String, Instant)>,
}

impl InMemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }

    /// Entry count, including entries that have expired but not been read.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn clear(&self) {
        self.data.clear();
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GoodsCache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, GoodsError> {
        let expired = match self.data.get(key) {
            None => return Ok(None),
            Some(entry) => {
                let (value, expires_at) = entry.value();
                if Instant::now() < *expires_at {
                    return Ok(Some(value.clone()));
                }
                true
            }
        };
        if expired {
            self.data.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), GoodsError> {
        self.data
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), GoodsError> {
        self.data.remove(key);
        Ok(())
    }
}
