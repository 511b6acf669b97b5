// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Redis backend for the list cache.
//!
//! Values are the JSON list projection of a good, stored as plain strings:
//! ```text
//! SET goods:17 '{"id":17,"projectId":1,...}' EX 60
//! GET goods:17
//! DEL goods:17
//! ```

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::time::Duration;

use super::traits::GoodsCache;
use crate::error::GoodsError;
use crate::retry::{connect_with_backoff, Backoff};

pub struct RedisGoodsCache {
    connection: ConnectionManager,
}

impl RedisGoodsCache {
    /// Connect, failing fast (~5s) if Redis is unreachable.
    pub async fn new(connection_string: &str) -> Result<Self, GoodsError> {
        let client = Client::open(connection_string).map_err(GoodsError::store)?;

        let connection = connect_with_backoff("redis", &Backoff::startup(), || {
            ConnectionManager::new(client.clone())
        })
        .await
        .map_err(GoodsError::store)?;

        Ok(Self { connection })
    }

    /// Clone of the underlying connection manager.
    pub fn connection(&self) -> ConnectionManager {
        self.connection.clone()
    }
}

#[async_trait]
impl GoodsCache for RedisGoodsCache {
    async fn get(&self, key: &str) -> Result<Option<String>, GoodsError> {
        let mut conn = self.connection.clone();
        let value: Option<String> = conn.get(key).await.map_err(GoodsError::store)?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), GoodsError> {
        let mut conn = self.connection.clone();
        // SET EX rejects 0
        let secs = ttl.as_secs().max(1);
        let _: () = conn.set_ex(key, value, secs).await.map_err(GoodsError::store)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), GoodsError> {
        let mut conn = self.connection.clone();
        let _: i64 = conn.del(key).await.map_err(GoodsError::store)?;
        Ok(())
    }
}
