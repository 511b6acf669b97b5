// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Goods and the values derived from them.
//!
//! A [`Good`] is the durable record owned by the relational store. A
//! [`GoodEvent`] is the immutable snapshot emitted for every mutation and
//! carried over the bus into the analytics store.
//!
//! # Example
//!
//! ```
//! use goods_engine::{Good, GoodEvent};
//! use chrono::Utc;
//!
//! let good = Good {
//!     id: 7,
//!     project_id: 1,
//!     name: "Tea".into(),
//!     description: None,
//!     priority: 3,
//!     removed: false,
//!     created_at: Utc::now(),
//! };
//!
//! let event = GoodEvent::from_good(&good, good.created_at);
//! assert_eq!(event.id, 7);
//! assert!(!event.removed);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A catalog entry. Never physically deleted; `removed` is a soft flag.
///
/// This is also the list projection cached under `goods:<n>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Good {
    pub id: i64,
    pub project_id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Rank within the project. Unique per project once a reorder commits.
    pub priority: i64,
    pub removed: bool,
    /// Set once at creation.
    pub created_at: DateTime<Utc>,
}

/// Snapshot of a good at mutation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoodEvent {
    pub id: i64,
    pub project_id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub priority: i64,
    pub removed: bool,
    #[serde(rename = "createdAt", alias = "eventTime")]
    pub event_time: DateTime<Utc>,
}

impl GoodEvent {
    /// Snapshot a good as it currently stands.
    pub fn from_good(good: &Good, event_time: DateTime<Utc>) -> Self {
        Self {
            id: good.id,
            project_id: good.project_id,
            name: good.name.clone(),
            description: good.description.clone(),
            priority: good.priority,
            removed: good.removed,
            event_time,
        }
    }
}

/// Result of a soft delete, as returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveOutcome {
    pub id: i64,
    pub project_id: i64,
    pub removed: bool,
}

/// Result of a reprioritize, as returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReprioritizeOutcome {
    pub id: i64,
    pub priority: i64,
}

/// Paging parameters for `list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListQuery {
    pub limit: i64,
    pub offset: i64,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self { limit: 10, offset: 1 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ListMeta {
    pub total: i64,
    pub removed: i64,
    pub limit: i64,
    pub offset: i64,
}

/// One page of the cache-aside list read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListPage {
    pub meta: ListMeta,
    pub goods: Vec<Good>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn good() -> Good {
        Good {
            id: 4,
            project_id: 1,
            name: "Coffee".into(),
            description: Some("arabica".into()),
            priority: 2,
            removed: false,
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_good_wire_names_are_camel_case() {
        let json = serde_json::to_value(good()).unwrap();
        assert_eq!(json["projectId"], 1);
        assert_eq!(json["createdAt"], "2024-03-01T12:00:00Z");
        assert!(json.get("project_id").is_none());
    }

    #[test]
    fn test_event_omits_absent_description() {
        let mut g = good();
        g.description = None;
        let event = GoodEvent::from_good(&g, g.created_at);

        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("description").is_none());
        assert_eq!(json["createdAt"], "2024-03-01T12:00:00Z");
    }

    #[test]
    fn test_event_accepts_event_time_alias() {
        let payload = r#"{"id":1,"projectId":2,"name":"x","priority":1,"removed":true,"eventTime":"2024-03-01T12:00:00Z"}"#;
        let event: GoodEvent = serde_json::from_str(payload).unwrap();
        assert_eq!(event.event_time, Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());
        assert!(event.removed);
    }

    #[test]
    fn test_list_query_defaults() {
        let q = ListQuery::default();
        assert_eq!(q.limit, 10);
        assert_eq!(q.offset, 1);
    }
}
