// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Pub/sub transport for mutation events.
//!
//! Payloads are opaque bytes (JSON `GoodEvent`s in practice). Delivery is
//! at-least-once at best and unordered across topics; subscribers must
//! tolerate duplicates.

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::stream::{BoxStream, StreamExt};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::warn;

use crate::error::GoodsError;
use crate::retry::{connect_with_backoff, Backoff};

/// Stream of raw payloads received on one topic.
pub type PayloadStream = BoxStream<'static, Vec<u8>>;

#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), GoodsError>;
    async fn subscribe(&self, topic: &str) -> Result<PayloadStream, GoodsError>;
}

/// Redis Pub/Sub transport.
///
/// Publishes share one `ConnectionManager`; every subscription opens its
/// own dedicated pub/sub connection.
pub struct RedisEventBus {
    client: Client,
    connection: ConnectionManager,
}

impl RedisEventBus {
    pub async fn new(connection_string: &str) -> Result<Self, GoodsError> {
        let client = Client::open(connection_string).map_err(GoodsError::store)?;

        let connection = connect_with_backoff("redis_bus", &Backoff::startup(), || {
            ConnectionManager::new(client.clone())
        })
        .await
        .map_err(GoodsError::store)?;

        Ok(Self { client, connection })
    }
}

#[async_trait]
impl EventBus for RedisEventBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), GoodsError> {
        let mut conn = self.connection.clone();
        // Receiver count; zero subscribers is not an error
        let _: i64 = conn.publish(topic, payload).await.map_err(GoodsError::store)?;
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<PayloadStream, GoodsError> {
        let mut pubsub = self.client.get_async_pubsub().await.map_err(GoodsError::store)?;
        pubsub.subscribe(topic).await.map_err(GoodsError::store)?;

        let topic = topic.to_string();
        let stream = pubsub.into_on_message().filter_map(move |msg| {
            let payload = match msg.get_payload::<Vec<u8>>() {
                Ok(payload) => Some(payload),
                Err(e) => {
                    warn!(topic = %topic, error = %e, "Unreadable pub/sub message");
                    None
                }
            };
            async move { payload }
        });
        Ok(stream.boxed())
    }
}

/// In-process transport over tokio broadcast channels.
///
/// A subscriber that falls more than `capacity` messages behind loses the
/// overflow, mirroring a pub/sub broker dropping slow consumers.
pub struct InMemoryEventBus {
    topics: DashMap<String, broadcast::Sender<Vec<u8>>>,
    capacity: usize,
}

impl InMemoryEventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            topics: DashMap::new(),
            capacity,
        }
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<Vec<u8>> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Live subscriptions on a topic.
    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .get(topic)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), GoodsError> {
        // Err only means nobody is listening
        let _ = self.sender(topic).send(payload);
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<PayloadStream, GoodsError> {
        let topic_name = topic.to_string();
        let stream = BroadcastStream::new(self.sender(topic).subscribe()).filter_map(move |received| {
            let payload = match received {
                Ok(payload) => Some(payload),
                Err(e) => {
                    warn!(topic = %topic_name, error = %e, "Subscriber lagged, messages dropped");
                    None
                }
            };
            async move { payload }
        });
        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = InMemoryEventBus::new();
        assert!(bus.publish("goods.created", b"{}".to_vec()).await.is_ok());
        assert_eq!(bus.subscriber_count("goods.created"), 0);
    }

    #[tokio::test]
    async fn test_subscriber_receives_in_publish_order() {
        let bus = InMemoryEventBus::new();
        let mut stream = bus.subscribe("goods.updated").await.unwrap();
        assert_eq!(bus.subscriber_count("goods.updated"), 1);

        bus.publish("goods.updated", b"one".to_vec()).await.unwrap();
        bus.publish("goods.updated", b"two".to_vec()).await.unwrap();

        assert_eq!(stream.next().await.unwrap(), b"one".to_vec());
        assert_eq!(stream.next().await.unwrap(), b"two".to_vec());
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let bus = InMemoryEventBus::new();
        let mut created = bus.subscribe("goods.created").await.unwrap();

        bus.publish("goods.removed", b"removed".to_vec()).await.unwrap();
        bus.publish("goods.created", b"created".to_vec()).await.unwrap();

        assert_eq!(created.next().await.unwrap(), b"created".to_vec());
    }

    #[tokio::test]
    async fn test_every_subscriber_gets_a_copy() {
        let bus = InMemoryEventBus::new();
        let mut first = bus.subscribe("goods.created").await.unwrap();
        let mut second = bus.subscribe("goods.created").await.unwrap();

        bus.publish("goods.created", b"x".to_vec()).await.unwrap();

        assert_eq!(first.next().await.unwrap(), b"x".to_vec());
        assert_eq!(second.next().await.unwrap(), b"x".to_vec());
    }

    #[tokio::test]
    async fn test_lagged_subscriber_skips_overflow() {
        let bus = InMemoryEventBus::with_capacity(2);
        let mut stream = bus.subscribe("goods.created").await.unwrap();

        for i in 0..4u8 {
            bus.publish("goods.created", vec![i]).await.unwrap();
        }

        // Oldest two were overwritten
        assert_eq!(stream.next().await.unwrap(), vec![2]);
        assert_eq!(stream.next().await.unwrap(), vec![3]);
    }
}
