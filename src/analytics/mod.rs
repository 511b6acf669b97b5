// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Analytics store backends.

pub mod memory;
pub mod sink;

pub use memory::MemorySink;
pub use sink::{AnalyticsRow, AnalyticsSink, ClickHouseSink, EVENTS_TABLE};
