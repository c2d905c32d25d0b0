// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

/// Errors from the string table.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InternerError {
    /// The 16-bit id space is exhausted.
    #[error("string table full: 65536 distinct strings reached")]
    Full,
    /// An id was presented that the table never handed out.
    #[error("string id {id} out of range, dictionary holds {len} strings")]
    BadId { id: u16, len: usize },
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BitsetError {
    #[error("bitset size mismatch: {left} bits vs {right} bits")]
    SizeMismatch { left: usize, right: usize },
}

/// Errors from the columnar store and the hotel table.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("columnar store is at capacity ({capacity} rows)")]
    CapacityExceeded { capacity: usize },
    #[error("row {index} out of bounds, store holds {len} rows")]
    OutOfBounds { index: u32, len: usize },
    #[error("hotel id {0} inserted twice")]
    DuplicateHotel(u32),
}

/// Fatal ingest failures. Soft conditions (skipped records, dropped
/// offers) are counted in [crate::api::LoadStats] instead.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("header mismatch in {path}: {reason}")]
    HeaderMismatch { path: PathBuf, reason: String },
    #[error("parse error at line {line}: {reason}")]
    ParseError { line: u64, reason: String },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Interner(#[from] InternerError),
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("no dataset loaded")]
    NoDataLoaded,
    #[error("invalid criteria: {0}")]
    InvalidCriteria(String),
    /// An internal invariant was violated. This is a bug, not a caller
    /// error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<InternerError> for QueryError {
    fn from(value: InternerError) -> Self {
        QueryError::Internal(value.to_string())
    }
}

impl From<StoreError> for QueryError {
    fn from(value: StoreError) -> Self {
        QueryError::Internal(value.to_string())
    }
}
