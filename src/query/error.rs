//! Query error types
//!
//! Defines all error conditions that can occur during condition parsing and execution.

use thiserror::Error;

/// Errors that can occur during query operations
#[derive(Error, Debug)]
pub enum QueryError {
    /// Condition parsing failed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Condition names a dimension that does not exist
    #[error("Unknown dimension: {0}")]
    UnknownDimension(String),

    /// Role given for a dimension that does not support it
    #[error("Invalid role: {0}")]
    InvalidRole(String),

    /// Storage layer error
    #[error("Storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;
