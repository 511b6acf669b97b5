// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Mutation event emission.
//!
//! Every committed mutation is announced on one of three topics as a JSON
//! [`GoodEvent`]:
//!
//! ```text
//! PUBLISH goods.created '{"id":17,"projectId":1,"name":"Tea","priority":4,"removed":false,"createdAt":"2026-01-05T10:00:00Z"}'
//! PUBLISH goods.updated '{... current state ...}'
//! PUBLISH goods.removed '{... "removed":true ...}'
//! ```
//!
//! Reprioritize has no topic of its own and goes out on `goods.removed`
//! with `removed: true`; downstream consumers already rely on that shape.

use std::sync::Arc;
use tracing::{debug, warn};

use super::bus::EventBus;
use crate::error::GoodsError;
use crate::good::GoodEvent;

/// Bus topic for a mutation event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Created,
    Updated,
    Removed,
}

impl Topic {
    /// Every topic the ingestor listens on.
    pub const ALL: [Topic; 3] = [Topic::Created, Topic::Updated, Topic::Removed];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Created => "goods.created",
            Topic::Updated => "goods.updated",
            Topic::Removed => "goods.removed",
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of committed mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    Created,
    Updated,
    Removed,
    Reprioritized,
}

impl Mutation {
    #[must_use]
    pub fn topic(&self) -> Topic {
        match self {
            Mutation::Created => Topic::Created,
            Mutation::Updated => Topic::Updated,
            Mutation::Removed | Mutation::Reprioritized => Topic::Removed,
        }
    }
}

/// Serializes events and hands them to the bus.
///
/// Fire-and-forget from the caller's point of view: a failed publish is
/// logged and reported, never retried, and never undoes the commit.
#[derive(Clone)]
pub struct EventPublisher {
    bus: Arc<dyn EventBus>,
}

impl EventPublisher {
    pub fn new(bus: Arc<dyn EventBus>) -> Self {
        Self { bus }
    }

    pub async fn publish(&self, topic: Topic, event: &GoodEvent) -> Result<(), GoodsError> {
        let payload = serde_json::to_vec(event).map_err(GoodsError::store)?;

        match self.bus.publish(topic.as_str(), payload).await {
            Ok(()) => {
                crate::metrics::record_publish(topic.as_str(), "success");
                debug!(topic = %topic, id = event.id, "Event published");
                Ok(())
            }
            Err(e) => {
                crate::metrics::record_publish(topic.as_str(), "error");
                warn!(topic = %topic, id = event.id, error = %e, "Event publish failed");
                Err(e)
            }
        }
    }

    /// Publish on the topic a mutation maps to.
    pub async fn publish_mutation(&self, mutation: Mutation, event: &GoodEvent) -> Result<(), GoodsError> {
        self.publish(mutation.topic(), event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::bus::InMemoryEventBus;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use futures_util::StreamExt;

    use crate::events::bus::PayloadStream;

    fn event(removed: bool) -> GoodEvent {
        GoodEvent {
            id: 17,
            project_id: 1,
            name: "Tea".to_string(),
            description: None,
            priority: 4,
            removed,
            event_time: Utc.with_ymd_and_hms(2026, 1, 5, 10, 0, 0).unwrap(),
        }
    }

    struct DownBus;

    #[async_trait]
    impl EventBus for DownBus {
        async fn publish(&self, _topic: &str, _payload: Vec<u8>) -> Result<(), GoodsError> {
            Err(GoodsError::store("connection refused"))
        }
        async fn subscribe(&self, _topic: &str) -> Result<PayloadStream, GoodsError> {
            Err(GoodsError::store("connection refused"))
        }
    }

    #[test]
    fn test_topic_names() {
        assert_eq!(Topic::Created.as_str(), "goods.created");
        assert_eq!(Topic::Updated.as_str(), "goods.updated");
        assert_eq!(Topic::Removed.to_string(), "goods.removed");
    }

    #[test]
    fn test_reprioritize_rides_the_removed_topic() {
        assert_eq!(Mutation::Reprioritized.topic(), Topic::Removed);
        assert_eq!(Mutation::Removed.topic(), Topic::Removed);
        assert_eq!(Mutation::Created.topic(), Topic::Created);
    }

    #[tokio::test]
    async fn test_publish_writes_json_event() {
        let bus = Arc::new(InMemoryEventBus::new());
        let mut stream = bus.subscribe("goods.created").await.unwrap();
        let publisher = EventPublisher::new(bus.clone());

        publisher.publish(Topic::Created, &event(false)).await.unwrap();

        let payload = stream.next().await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(json["id"], 17);
        assert_eq!(json["projectId"], 1);
        assert_eq!(json["removed"], false);
        assert_eq!(json["createdAt"], "2026-01-05T10:00:00Z");
        assert!(json.get("description").is_none());

        let decoded: GoodEvent = serde_json::from_slice(&payload).unwrap();
        assert_eq!(decoded, event(false));
    }

    #[tokio::test]
    async fn test_publish_failure_is_returned() {
        let publisher = EventPublisher::new(Arc::new(DownBus));
        let err = publisher.publish(Topic::Updated, &event(false)).await.unwrap_err();
        assert!(matches!(err, GoodsError::Store(_)));
    }
}
