// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic goods-engine walkthrough, fully in-process.
//!
//! Demonstrates:
//! 1. Wiring the service over SQLite, the in-memory cache and bus
//! 2. Creating goods and reordering a project
//! 3. A cache-aside page read before and after invalidation
//! 4. Events flowing through the batch ingestor into a sink
//! 5. Dumping the captured metrics
//!
//! # Run
//!
//! ```bash
//! cargo run --example basic_usage
//! ```

use std::sync::Arc;

use goods_engine::{
    BatchIngestor, GoodsEngineConfig, GoodsService, InMemoryCache, InMemoryEventBus, MemorySink,
    SqlGoodsStore, Topic,
};
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .map_err(|_| "metrics recorder already installed")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "goods_engine=info".into()),
        )
        .with_target(false)
        .compact()
        .init();

    // 1. Wiring
    let config = GoodsEngineConfig {
        batch_max_size: 5,
        flush_interval_ms: 500,
        ..Default::default()
    };
    let repo = Arc::new(SqlGoodsStore::new("sqlite::memory:").await?);
    let cache = Arc::new(InMemoryCache::new());
    let bus = Arc::new(InMemoryEventBus::new());
    let sink = Arc::new(MemorySink::new());

    let ingestor = Arc::new(BatchIngestor::from_config(sink.clone(), &config))
        .start(bus.clone(), &Topic::ALL)
        .await?;
    let service = GoodsService::new(repo.clone(), cache.clone(), bus, &config);

    // 2. Create and reorder
    println!("\nCreating goods in project 1...");
    for name in ["Apples", "Bread", "Cheese", "Dates"] {
        let (good, hook) = service.create(1, name).await?;
        println!("  {} -> priority {}", good.name, good.priority);
        hook.run().await;
    }

    println!("\nMoving Dates (id 4) to the top...");
    let (moved, hook) = service.reprioritize(4, 1, 1).await?;
    hook.run().await;
    println!("  id {} now at priority {}", moved.id, moved.priority);
    for good in repo.project_ranking(1).await? {
        println!("  {:>2}. {}", good.priority, good.name);
    }

    // 3. Cache-aside reads
    println!("\nListing (cold cache)...");
    let page = service.list(None, None).await;
    println!(
        "  {} goods, total={} removed={}, cache entries={}",
        page.goods.len(),
        page.meta.total,
        page.meta.removed,
        cache.len()
    );

    let (_, hook) = service.update(2, 1, "Sourdough", Some("day-old")).await?;
    hook.run().await;
    let page = service.list(Some(2), Some(1)).await;
    println!("  after update, slot 2 reads: {}", page.goods[1].name);

    // 4. Analytics
    tokio::time::sleep(std::time::Duration::from_millis(700)).await;
    ingestor.shutdown().await;
    println!("\nAnalytics rows: {}", sink.rows().len());
    for row in sink.rows() {
        println!(
            "  id={} priority={} removed={} at {} {}",
            row.id, row.priority, row.removed, row.event_time_text(), row.name
        );
    }

    // 5. Metrics
    println!("\nMetrics:");
    dump_metrics(&snapshotter);

    Ok(())
}

fn dump_metrics(snapshotter: &Snapshotter) {
    let mut lines = Vec::new();
    for (composite_key, _, _, value) in snapshotter.snapshot().into_vec() {
        let (_, key) = composite_key.into_parts();
        let labels: Vec<String> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
        let labels = if labels.is_empty() {
            String::new()
        } else {
            format!("{{{}}}", labels.join(","))
        };

        let rendered = match value {
            DebugValue::Counter(v) => v.to_string(),
            DebugValue::Gauge(v) => format!("{:.2}", v.into_inner()),
            DebugValue::Histogram(samples) => format!("{} samples", samples.len()),
        };
        lines.push(format!("  {}{} = {}", key.name(), labels, rendered));
    }
    lines.sort();
    for line in lines {
        println!("{line}");
    }
}
