// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for goods-engine.
//!
//! Uses the `metrics` crate facade; the embedding process picks the exporter.
//!
//! # Metric Naming Convention
//! - `goods_engine_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record a list slot served from the cache
pub fn record_cache_hit() {
    counter!("goods_engine_cache_hits_total").increment(1);
}

/// Record a list slot loaded from the relational store
pub fn record_cache_miss() {
    counter!("goods_engine_cache_misses_total").increment(1);
}

/// Record a list slot that was dropped from the page
pub fn record_skipped_slot(reason: &str) {
    record_skipped_slots(reason, 1);
}

/// Record several slots dropped for the same reason at once
pub fn record_skipped_slots(reason: &str, count: u64) {
    counter!(
        "goods_engine_skipped_slots_total",
        "reason" => reason.to_string()
    )
    .increment(count);
}

/// Record a committed reorder (`raise`, `lower` or `none`)
pub fn record_reorder(direction: &str) {
    counter!(
        "goods_engine_reorders_total",
        "direction" => direction.to_string()
    )
    .increment(1);
}

/// Record a publish attempt
pub fn record_publish(topic: &str, status: &str) {
    counter!(
        "goods_engine_events_published_total",
        "topic" => topic.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a cache invalidation attempt
pub fn record_invalidation(status: &str) {
    counter!(
        "goods_engine_cache_invalidations_total",
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record an event accepted into the ingest buffer
pub fn record_event_ingested() {
    counter!("goods_engine_events_ingested_total").increment(1);
}

/// Record a malformed bus payload
pub fn record_malformed_payload(topic: &str) {
    counter!(
        "goods_engine_malformed_payloads_total",
        "topic" => topic.to_string()
    )
    .increment(1);
}

/// Set current ingest buffer depth
pub fn set_buffer_depth(depth: usize) {
    gauge!("goods_engine_buffer_depth").set(depth as f64);
}

/// Record a completed batch write
pub fn record_flush(reason: &str, count: usize, duration: Duration) {
    counter!(
        "goods_engine_batches_flushed_total",
        "reason" => reason.to_string()
    )
    .increment(1);
    counter!("goods_engine_events_flushed_total").increment(count as u64);
    histogram!("goods_engine_flush_seconds").record(duration.as_secs_f64());
}

/// Record a failed batch write; its events are gone
pub fn record_flush_failure(reason: &str, lost: usize) {
    counter!(
        "goods_engine_batches_failed_total",
        "reason" => reason.to_string()
    )
    .increment(1);
    counter!("goods_engine_events_lost_total").increment(lost as u64);
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    fn counter_value(snapshot: &[(String, Vec<(String, String)>, DebugValue)], name: &str) -> u64 {
        snapshot
            .iter()
            .filter(|(n, _, _)| n == name)
            .map(|(_, _, v)| match v {
                DebugValue::Counter(c) => *c,
                _ => 0,
            })
            .sum()
    }

    fn capture(f: impl FnOnce()) -> Vec<(String, Vec<(String, String)>, DebugValue)> {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        metrics::with_local_recorder(&recorder, f);

        snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .map(|(key, _, _, value)| {
                let (_, key) = key.into_parts();
                let labels = key
                    .labels()
                    .map(|l| (l.key().to_string(), l.value().to_string()))
                    .collect();
                (key.name().to_string(), labels, value)
            })
            .collect()
    }

    #[test]
    fn test_flush_success_and_failure_counters() {
        let snapshot = capture(|| {
            record_flush("count", 100, Duration::from_millis(12));
            record_flush("time", 3, Duration::from_millis(4));
            record_flush_failure("time", 7);
        });

        assert_eq!(counter_value(&snapshot, "goods_engine_batches_flushed_total"), 2);
        assert_eq!(counter_value(&snapshot, "goods_engine_events_flushed_total"), 103);
        assert_eq!(counter_value(&snapshot, "goods_engine_batches_failed_total"), 1);
        assert_eq!(counter_value(&snapshot, "goods_engine_events_lost_total"), 7);
    }

    #[test]
    fn test_skipped_slots_are_labelled_by_reason() {
        let snapshot = capture(|| {
            record_skipped_slot("cache_error");
            record_skipped_slot("cache_error");
            record_skipped_slot("missing");
            record_skipped_slots("out_of_range", 5);
        });

        let cache_errors = snapshot
            .iter()
            .find(|(n, labels, _)| {
                n == "goods_engine_skipped_slots_total"
                    && labels.contains(&("reason".to_string(), "cache_error".to_string()))
            })
            .map(|(_, _, v)| v);
        assert!(matches!(cache_errors, Some(DebugValue::Counter(2))));

        let out_of_range = snapshot
            .iter()
            .find(|(n, labels, _)| {
                n == "goods_engine_skipped_slots_total"
                    && labels.contains(&("reason".to_string(), "out_of_range".to_string()))
            })
            .map(|(_, _, v)| v);
        assert!(matches!(out_of_range, Some(DebugValue::Counter(5))));
        assert_eq!(counter_value(&snapshot, "goods_engine_skipped_slots_total"), 8);
    }

    #[test]
    fn test_buffer_depth_gauge_tracks_latest_value() {
        let snapshot = capture(|| {
            set_buffer_depth(40);
            set_buffer_depth(3);
        });

        let depth = snapshot
            .iter()
            .find(|(n, _, _)| n == "goods_engine_buffer_depth")
            .and_then(|(_, _, v)| match v {
                DebugValue::Gauge(g) => Some(g.into_inner()),
                _ => None,
            });
        assert_eq!(depth, Some(3.0));
    }
}
