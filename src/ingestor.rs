// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Bus-to-analytics batch ingestion.
//!
//! ```text
//!   goods.created ─┐
//!   goods.updated ─┼─► decode ─► EventBuffer ──(full)──► spawn write ─► AnalyticsSink
//!   goods.removed ─┘                 ▲
//!                                    └──(every flush interval)── periodic flusher
//! ```
//!
//! A batch leaves the buffer when it reaches the maximum size or when the
//! flusher ticks, whichever comes first. Writes run on their own task so
//! the buffer lock is never held during I/O. A failed write is logged and
//! its events are dropped; nothing is retried.

use futures_util::StreamExt;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::analytics::AnalyticsSink;
use crate::batching::{EventBuffer, FlushBatch, FlushReason};
use crate::config::GoodsEngineConfig;
use crate::error::GoodsError;
use crate::events::{EventBus, PayloadStream, Topic};
use crate::good::GoodEvent;

/// Running totals for one ingestor.
#[derive(Debug, Default)]
pub struct IngestorStats {
    events_ingested: AtomicU64,
    malformed_payloads: AtomicU64,
    batches_flushed: AtomicU64,
    batches_failed: AtomicU64,
    events_lost: AtomicU64,
}

impl IngestorStats {
    pub fn events_ingested(&self) -> u64 {
        self.events_ingested.load(Ordering::Relaxed)
    }

    pub fn malformed_payloads(&self) -> u64 {
        self.malformed_payloads.load(Ordering::Relaxed)
    }

    pub fn batches_flushed(&self) -> u64 {
        self.batches_flushed.load(Ordering::Relaxed)
    }

    pub fn batches_failed(&self) -> u64 {
        self.batches_failed.load(Ordering::Relaxed)
    }

    /// Events that were in a failed batch.
    pub fn events_lost(&self) -> u64 {
        self.events_lost.load(Ordering::Relaxed)
    }
}

pub struct BatchIngestor {
    buffer: EventBuffer,
    sink: Arc<dyn AnalyticsSink>,
    stats: Arc<IngestorStats>,
    flush_interval: Duration,
    writes: Mutex<Vec<JoinHandle<()>>>,
}

impl BatchIngestor {
    pub fn new(sink: Arc<dyn AnalyticsSink>, max_batch_size: usize, flush_interval: Duration) -> Self {
        Self {
            buffer: EventBuffer::new(max_batch_size),
            sink,
            stats: Arc::new(IngestorStats::default()),
            flush_interval,
            writes: Mutex::new(Vec::new()),
        }
    }

    pub fn from_config(sink: Arc<dyn AnalyticsSink>, config: &GoodsEngineConfig) -> Self {
        Self::new(sink, config.batch_max_size, config.flush_interval())
    }

    pub fn stats(&self) -> &IngestorStats {
        &self.stats
    }

    /// Events waiting for the next flush.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Buffer one event, writing the batch out if this filled the buffer.
    pub fn ingest(&self, event: GoodEvent) {
        self.stats.events_ingested.fetch_add(1, Ordering::Relaxed);
        crate::metrics::record_event_ingested();

        if let Some(batch) = self.buffer.push(event) {
            self.spawn_write(batch);
        }
        crate::metrics::set_buffer_depth(self.buffer.len());
    }

    /// Decode a bus payload and ingest it. Malformed payloads are logged and
    /// skipped; returns whether the payload was accepted.
    pub fn ingest_payload(&self, topic: &str, payload: &[u8]) -> bool {
        match serde_json::from_slice::<GoodEvent>(payload) {
            Ok(event) => {
                self.ingest(event);
                true
            }
            Err(e) => {
                self.stats.malformed_payloads.fetch_add(1, Ordering::Relaxed);
                crate::metrics::record_malformed_payload(topic);
                warn!(topic, error = %e, "Skipping malformed event payload");
                false
            }
        }
    }

    /// Write out whatever is buffered. Returns false when there was nothing.
    pub fn flush(&self, reason: FlushReason) -> bool {
        match self.buffer.take(reason) {
            Some(batch) => {
                self.spawn_write(batch);
                crate::metrics::set_buffer_depth(self.buffer.len());
                true
            }
            None => false,
        }
    }

    /// Wait for every write spawned so far to finish.
    pub async fn wait_for_writes(&self) {
        let handles = std::mem::take(&mut *self.writes.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Batch write task panicked");
            }
        }
    }

    fn spawn_write(&self, batch: FlushBatch) {
        let handle = tokio::spawn(write_batch(Arc::clone(&self.sink), Arc::clone(&self.stats), batch));
        let mut writes = self.writes.lock();
        writes.retain(|h| !h.is_finished());
        writes.push(handle);
    }

    /// Flush on a fixed period until `shutdown` flips to true.
    ///
    /// The first tick fires one full period after start.
    pub async fn run_flusher(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let period = self.flush_interval;
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if !self.flush(FlushReason::Time) {
                        debug!("Flusher tick with empty buffer");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("Periodic flusher stopped");
    }

    /// Subscribe to `topics` and start ingesting.
    ///
    /// Subscriptions are live when this returns.
    pub async fn start(self: Arc<Self>, bus: Arc<dyn EventBus>, topics: &[Topic]) -> Result<IngestorHandle, GoodsError> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::with_capacity(topics.len() + 1);

        for topic in topics {
            let stream = bus.subscribe(topic.as_str()).await?;
            tasks.push(tokio::spawn(consume(Arc::clone(&self), *topic, stream, shutdown_rx.clone())));
        }
        tasks.push(tokio::spawn(Arc::clone(&self).run_flusher(shutdown_rx)));

        info!(
            topics = topics.len(),
            max_batch_size = self.buffer.max_size(),
            flush_interval_ms = self.flush_interval.as_millis() as u64,
            "Batch ingestor started"
        );

        Ok(IngestorHandle {
            ingestor: self,
            shutdown: shutdown_tx,
            tasks,
        })
    }
}

async fn consume(ingestor: Arc<BatchIngestor>, topic: Topic, mut stream: PayloadStream, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            message = stream.next() => match message {
                Some(payload) => {
                    ingestor.ingest_payload(topic.as_str(), &payload);
                }
                None => {
                    warn!(topic = %topic, "Subscription closed");
                    break;
                }
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

async fn write_batch(sink: Arc<dyn AnalyticsSink>, stats: Arc<IngestorStats>, batch: FlushBatch) {
    let start = Instant::now();
    let count = batch.len();
    let reason = batch.reason.as_str();

    match sink.insert_batch(&batch.events).await {
        Ok(()) => {
            stats.batches_flushed.fetch_add(1, Ordering::Relaxed);
            crate::metrics::record_flush(reason, count, start.elapsed());
            info!(batch_id = %batch.id, count, reason, "Batch written to analytics store");
        }
        Err(e) => {
            stats.batches_failed.fetch_add(1, Ordering::Relaxed);
            stats.events_lost.fetch_add(count as u64, Ordering::Relaxed);
            crate::metrics::record_flush_failure(reason, count);
            error!(batch_id = %batch.id, count, reason, error = %e, "Batch write failed, events dropped");
        }
    }
}

/// Owns the running ingestor tasks.
pub struct IngestorHandle {
    ingestor: Arc<BatchIngestor>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl IngestorHandle {
    pub fn ingestor(&self) -> &Arc<BatchIngestor> {
        &self.ingestor
    }

    /// Stop consuming, write out what is buffered, and wait for every
    /// outstanding write.
    pub async fn shutdown(self) {
        info!("Stopping batch ingestor");
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Ingestor task panicked");
            }
        }

        if self.ingestor.flush(FlushReason::Shutdown) {
            debug!("Final batch flushed on shutdown");
        }
        self.ingestor.wait_for_writes().await;

        let stats = self.ingestor.stats();
        info!(
            events_ingested = stats.events_ingested(),
            batches_flushed = stats.batches_flushed(),
            batches_failed = stats.batches_failed(),
            events_lost = stats.events_lost(),
            "Batch ingestor stopped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::MemorySink;
    use crate::events::InMemoryEventBus;
    use chrono::Utc;

    fn event(id: i64) -> GoodEvent {
        GoodEvent {
            id,
            project_id: 1,
            name: format!("good-{id}"),
            description: None,
            priority: id,
            removed: false,
            event_time: Utc::now(),
        }
    }

    fn ingestor(sink: &Arc<MemorySink>) -> Arc<BatchIngestor> {
        Arc::new(BatchIngestor::new(sink.clone(), 100, Duration::from_secs(5)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_buffer_flushes_before_timer() {
        let sink = Arc::new(MemorySink::new());
        let ingestor = ingestor(&sink);

        for id in 1..=100 {
            ingestor.ingest(event(id));
        }
        ingestor.wait_for_writes().await;

        let batches = sink.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 100);
        assert_eq!(ingestor.buffered(), 0);
        assert_eq!(ingestor.stats().batches_flushed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_buffer_waits_for_the_tick() {
        let sink = Arc::new(MemorySink::new());
        let ingestor = ingestor(&sink);
        let (tx, rx) = watch::channel(false);
        let flusher = tokio::spawn(Arc::clone(&ingestor).run_flusher(rx));

        for id in 1..=3 {
            ingestor.ingest(event(id));
        }

        tokio::time::sleep(Duration::from_millis(4_900)).await;
        ingestor.wait_for_writes().await;
        assert!(sink.batches().is_empty());
        assert_eq!(ingestor.buffered(), 3);

        tokio::time::sleep(Duration::from_millis(200)).await;
        ingestor.wait_for_writes().await;
        assert_eq!(sink.batches().len(), 1);
        assert_eq!(sink.rows().len(), 3);

        tx.send(true).unwrap();
        flusher.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_tick_writes_nothing() {
        let sink = Arc::new(MemorySink::new());
        let ingestor = ingestor(&sink);
        let (tx, rx) = watch::channel(false);
        let flusher = tokio::spawn(Arc::clone(&ingestor).run_flusher(rx));

        tokio::time::sleep(Duration::from_secs(11)).await;
        ingestor.wait_for_writes().await;
        assert!(sink.batches().is_empty());
        assert_eq!(ingestor.stats().batches_flushed(), 0);

        tx.send(true).unwrap();
        flusher.await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_write_drops_events_without_retry() {
        let sink = Arc::new(MemorySink::new());
        sink.set_failing(true);
        let ingestor = ingestor(&sink);

        ingestor.ingest(event(1));
        ingestor.ingest(event(2));
        assert!(ingestor.flush(FlushReason::Manual));
        ingestor.wait_for_writes().await;

        assert_eq!(ingestor.buffered(), 0);
        assert_eq!(ingestor.stats().batches_failed(), 1);
        assert_eq!(ingestor.stats().events_lost(), 2);

        // Recovery does not bring the lost events back
        sink.set_failing(false);
        assert!(!ingestor.flush(FlushReason::Manual));
        ingestor.wait_for_writes().await;
        assert!(sink.rows().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_payload_is_skipped() {
        let sink = Arc::new(MemorySink::new());
        let ingestor = ingestor(&sink);

        assert!(!ingestor.ingest_payload("goods.created", b"not json"));
        let good = serde_json::to_vec(&event(4)).unwrap();
        assert!(ingestor.ingest_payload("goods.created", &good));

        assert_eq!(ingestor.stats().malformed_payloads(), 1);
        assert_eq!(ingestor.stats().events_ingested(), 1);
        assert_eq!(ingestor.buffered(), 1);
    }

    #[tokio::test]
    async fn test_duplicates_are_kept() {
        let sink = Arc::new(MemorySink::new());
        let ingestor = ingestor(&sink);

        ingestor.ingest(event(9));
        ingestor.ingest(event(9));
        ingestor.flush(FlushReason::Manual);
        ingestor.wait_for_writes().await;

        assert_eq!(sink.rows().len(), 2);
    }

    #[tokio::test]
    async fn test_start_consumes_bus_and_shutdown_flushes_remainder() {
        let sink = Arc::new(MemorySink::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let handle = ingestor(&sink).start(bus.clone(), &Topic::ALL).await.unwrap();

        for (topic, id) in [(Topic::Created, 1), (Topic::Updated, 2), (Topic::Removed, 3)] {
            let payload = serde_json::to_vec(&event(id)).unwrap();
            bus.publish(topic.as_str(), payload).await.unwrap();
        }
        bus.publish("goods.created", b"{broken".to_vec()).await.unwrap();

        // Let the consumers drain the channels
        for _ in 0..100 {
            if handle.ingestor().stats().events_ingested() == 3
                && handle.ingestor().stats().malformed_payloads() == 1
            {
                break;
            }
            tokio::task::yield_now().await;
        }
        let ingestor = Arc::clone(handle.ingestor());
        handle.shutdown().await;

        let mut ids: Vec<i64> = sink.rows().iter().map(|r| r.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(ingestor.stats().batches_flushed(), 1);
        assert_eq!(ingestor.stats().malformed_payloads(), 1);
        assert_eq!(bus.subscriber_count("goods.created"), 0);
    }
}
