// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error taxonomy for the goods core.
//!
//! Every caller-facing failure is one of three kinds. The HTTP layer renders
//! them through [`GoodsError::status_code`] and [`GoodsError::to_body`] so
//! that every endpoint reports `NotFound` identically:
//!
//! ```
//! use goods_engine::GoodsError;
//!
//! let err = GoodsError::NotFound;
//! assert_eq!(err.status_code(), 404);
//! assert_eq!(
//!     serde_json::to_string(&err.to_body()).unwrap(),
//!     r#"{"code":3,"message":"errors.good.notFound","details":{}}"#
//! );
//! ```

use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GoodsError {
    /// No row for the given id / project.
    #[error("Good not found")]
    NotFound,
    /// Caller supplied an unusable value (e.g. empty name).
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// Relational, cache, bus or analytics backend failure.
    #[error("Storage backend error: {0}")]
    Store(String),
}

/// Wire body for error responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub code: u32,
    pub message: &'static str,
    pub details: BTreeMap<String, String>,
}

impl GoodsError {
    /// Shorthand for wrapping any backend error.
    pub fn store(err: impl std::fmt::Display) -> Self {
        Self::Store(err.to_string())
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// HTTP status the boundary should answer with.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound => 404,
            Self::InvalidInput(_) => 400,
            Self::Store(_) => 500,
        }
    }

    /// Structured body. Backend detail stays in the logs, never in the body.
    #[must_use]
    pub fn to_body(&self) -> ErrorBody {
        let (code, message) = match self {
            Self::NotFound => (3, "errors.good.notFound"),
            Self::InvalidInput(_) => (2, "errors.good.invalid"),
            Self::Store(_) => (1, "errors.internal"),
        };
        ErrorBody {
            code,
            message,
            details: BTreeMap::new(),
        }
    }
}
