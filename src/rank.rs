// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-project priority ranking.
//!
//! Moving one good from `current` to `new` shifts every good strictly between
//! the two ranks (plus the destination slot) by exactly one, so the project's
//! ranks stay unique and contiguous:
//!
//! ```text
//! new < current:  [new, current)  each +1   (opens a gap at `new`)
//! new > current:  (current, new]  each -1   (closes the old gap, opens `new`)
//! new == current: nothing moves
//! ```
//!
//! [`Shift`] is the pure plan. The relational store executes it inside one
//! transaction (read current, shift range, set target, commit), and
//! [`RankReorderer`] is the entry point the mutation path calls.
//!
//! ```
//! use goods_engine::rank::Shift;
//!
//! // D (priority 4) moves to the top of [A=1, B=2, C=3, D=4]
//! let shift = Shift::plan(4, 1);
//! assert_eq!(shift, Shift::Increment { from: 1, until: 4 });
//! let shifted: Vec<i64> = [1, 2, 3].iter().map(|p| shift.apply(*p)).collect();
//! assert_eq!(shifted, vec![2, 3, 4]);
//! ```

use std::sync::Arc;
use tracing::{debug, error, instrument};

use crate::error::GoodsError;
use crate::storage::traits::{GoodsRepository, Reordered};

/// How the other goods of a project move when one good is reprioritized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shift {
    /// Priorities in `[from, until)` each gain one.
    Increment { from: i64, until: i64 },
    /// Priorities in `(after, to]` each lose one.
    Decrement { after: i64, to: i64 },
    /// Target keeps its slot.
    Unchanged,
}

impl Shift {
    #[must_use]
    pub fn plan(current: i64, new: i64) -> Self {
        use std::cmp::Ordering;
        match new.cmp(&current) {
            Ordering::Less => Self::Increment { from: new, until: current },
            Ordering::Greater => Self::Decrement { after: current, to: new },
            Ordering::Equal => Self::Unchanged,
        }
    }

    /// Whether a non-target good at `priority` is moved by this shift.
    #[must_use]
    pub fn affects(&self, priority: i64) -> bool {
        match *self {
            Self::Increment { from, until } => priority >= from && priority < until,
            Self::Decrement { after, to } => priority > after && priority <= to,
            Self::Unchanged => false,
        }
    }

    /// Priority of a non-target good after the shift.
    #[must_use]
    pub fn apply(&self, priority: i64) -> i64 {
        if !self.affects(priority) {
            return priority;
        }
        match self {
            Self::Increment { .. } => priority + 1,
            Self::Decrement { .. } => priority - 1,
            Self::Unchanged => priority,
        }
    }

    /// Label for logs and metrics.
    #[must_use]
    pub fn direction(&self) -> &'static str {
        match self {
            Self::Increment { .. } => "raise",
            Self::Decrement { .. } => "lower",
            Self::Unchanged => "none",
        }
    }
}

/// Entry point for rank changes.
///
/// All-or-nothing semantics come from the repository transaction; this type
/// adds the logging and metrics around it.
pub struct RankReorderer {
    repo: Arc<dyn GoodsRepository>,
}

impl RankReorderer {
    pub fn new(repo: Arc<dyn GoodsRepository>) -> Self {
        Self { repo }
    }

    /// Move `good_id` to `new_priority` within `project_id`.
    ///
    /// Returns the good's name and description. `NotFound` when no row
    /// matches; in that case no priority has changed.
    #[instrument(skip(self))]
    pub async fn reprioritize(
        &self,
        good_id: i64,
        project_id: i64,
        new_priority: i64,
    ) -> Result<(String, Option<String>), GoodsError> {
        match self.repo.reprioritize(good_id, project_id, new_priority).await {
            Ok(Reordered { name, description, previous_priority }) => {
                let shift = Shift::plan(previous_priority, new_priority);
                crate::metrics::record_reorder(shift.direction());
                debug!(
                    previous_priority,
                    new_priority,
                    direction = shift.direction(),
                    "Reorder committed"
                );
                Ok((name, description))
            }
            Err(GoodsError::NotFound) => {
                debug!("Reorder target not found");
                Err(GoodsError::NotFound)
            }
            Err(e) => {
                error!(error = %e, "Reorder rolled back");
                Err(e)
            }
        }
    }
}
