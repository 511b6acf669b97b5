// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Mutation events: the bus transport and the publisher on top of it.

pub mod bus;
pub mod publisher;

pub use bus::{EventBus, InMemoryEventBus, PayloadStream, RedisEventBus};
pub use publisher::{EventPublisher, Mutation, Topic};
