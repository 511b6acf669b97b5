// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Bounded in-memory buffer of events awaiting an analytics write.
//!
//! The buffer is drained by swapping its contents out under the lock, so a
//! write never holds the lock and concurrent producers keep appending to a
//! fresh, empty buffer:
//!
//! ```text
//! push ─► [e1 e2 … e99] ─► push e100 ─► len == max ─► swap ─► FlushBatch(Count)
//!                                                     │
//! tick (every flush interval) ──────────────────────────► swap ─► FlushBatch(Time)
//! shutdown ─────────────────────────────────────────────► swap ─► FlushBatch(Shutdown)
//! ```
//!
//! # Example
//!
//! ```
//! use goods_engine::batching::{EventBuffer, FlushReason};
//!
//! let buffer = EventBuffer::new(2);
//! assert!(buffer.take(FlushReason::Time).is_none());
//! ```

use parking_lot::Mutex;
use uuid::Uuid;

use crate::good::GoodEvent;

/// Why a batch left the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// Buffer reached its maximum size
    Count,
    /// Periodic flusher tick
    Time,
    /// Explicit flush request
    Manual,
    /// Final flush while the ingestor stops
    Shutdown,
}

impl FlushReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlushReason::Count => "count",
            FlushReason::Time => "time",
            FlushReason::Manual => "manual",
            FlushReason::Shutdown => "shutdown",
        }
    }
}

/// Events swapped out of the buffer, ready to write.
#[derive(Debug)]
pub struct FlushBatch {
    /// Correlates the log lines of one write.
    pub id: Uuid,
    pub events: Vec<GoodEvent>,
    pub reason: FlushReason,
}

impl FlushBatch {
    fn new(events: Vec<GoodEvent>, reason: FlushReason) -> Self {
        Self {
            id: Uuid::new_v4(),
            events,
            reason,
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

pub struct EventBuffer {
    events: Mutex<Vec<GoodEvent>>,
    max_size: usize,
}

impl EventBuffer {
    /// `max_size` is clamped to at least one event.
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            events: Mutex::new(Vec::with_capacity(max_size)),
            max_size,
        }
    }

    /// Append an event. Returns the full batch when this push filled the
    /// buffer; the buffer is empty again afterwards.
    pub fn push(&self, event: GoodEvent) -> Option<FlushBatch> {
        let mut events = self.events.lock();
        events.push(event);
        if events.len() >= self.max_size {
            let batch = std::mem::replace(&mut *events, Vec::with_capacity(self.max_size));
            return Some(FlushBatch::new(batch, FlushReason::Count));
        }
        None
    }

    /// Swap out whatever is buffered. `None` when empty.
    pub fn take(&self, reason: FlushReason) -> Option<FlushBatch> {
        let mut events = self.events.lock();
        if events.is_empty() {
            return None;
        }
        let batch = std::mem::replace(&mut *events, Vec::with_capacity(self.max_size));
        Some(FlushBatch::new(batch, reason))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    #[must_use]
    pub fn max_size(&self) -> usize {
        self.max_size
    }
}
