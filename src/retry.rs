// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Connection bootstrap with exponential backoff.
//!
//! Only used while establishing connections to external collaborators.
//! Core operations (reorders, list reads, publishes, flushes) never retry.
//!
//! ```
//! use goods_engine::retry::Backoff;
//! use std::time::Duration;
//!
//! let startup = Backoff::startup();
//! assert_eq!(startup.max_attempts, 5);
//! assert_eq!(startup.initial_delay, Duration::from_millis(200));
//! ```

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct Backoff {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
    pub max_attempts: usize,
}

impl Backoff {
    /// Fast-fail for initial connections: 5 attempts, ~5 seconds total.
    #[must_use]
    pub fn startup() -> Self {
        Self {
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
            factor: 2.0,
            max_attempts: 5,
        }
    }

    /// Delay to wait after the given (1-indexed) failed attempt.
    #[must_use]
    pub fn delay_after(&self, attempt: usize) -> Duration {
        let mut delay = self.initial_delay;
        for _ in 1..attempt {
            delay = delay.mul_f64(self.factor).min(self.max_delay);
        }
        delay
    }
}

/// Run `connect` until it succeeds or the attempts are exhausted.
pub async fn connect_with_backoff<F, Fut, T, E>(
    target: &str,
    backoff: &Backoff,
    mut connect: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match connect().await {
            Ok(conn) => {
                if attempt > 1 {
                    info!(target_backend = target, attempt, "Connected after retry");
                }
                return Ok(conn);
            }
            Err(err) if attempt >= backoff.max_attempts => return Err(err),
            Err(err) => {
                let delay = backoff.delay_after(attempt);
                warn!(
                    target_backend = target,
                    attempt,
                    max_attempts = backoff.max_attempts,
                    error = %err,
                    ?delay,
                    "Connection attempt failed"
                );
                sleep(delay).await;
            }
        }
    }
}
