//! Storage layer error types
//!
//! Defines all errors that can occur while buffering, committing and
//! querying partition files.

use chrono::NaiveDate;
use std::path::PathBuf;
use thiserror::Error;

use crate::storage::types::Category;

/// Errors that can occur in the storage layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Partition document could not be encoded or decoded
    #[error("XML error: {0}")]
    Xml(String),

    /// Partition file exists but cannot be parsed
    #[error("Corrupt partition {path:?}: {reason}")]
    Corruption { path: PathBuf, reason: String },

    /// Query bounds are reversed
    #[error("Invalid date range: {start} is after {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    /// Measures are durations or counts and never negative
    #[error("Invalid measure: {0} is negative")]
    InvalidMeasure(i64),

    /// Interval event ends before it starts
    #[error("Invalid interval: end precedes start")]
    InvalidInterval,

    /// Event routed to a storer of another category
    #[error("Category mismatch: storer holds {expected}, event is {found}")]
    CategoryMismatch { expected: Category, found: Category },

    /// Lock acquisition failed
    #[error("Lock error: {0}")]
    Lock(String),
}

impl From<quick_xml::Error> for StorageError {
    fn from(err: quick_xml::Error) -> Self {
        StorageError::Xml(err.to_string())
    }
}

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// A persisted record that could not be turned into a result object
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConvertError {
    /// Record belongs to another category than the converter expects
    #[error("unexpected record kind: {0}")]
    UnexpectedKind(Category),

    /// Referenced entity no longer resolves (e.g. deleted file)
    #[error("unresolvable reference: {0}")]
    Unresolvable(String),

    /// Record carries a value the converter rejects
    #[error("invalid record: {0}")]
    Invalid(String),
}
