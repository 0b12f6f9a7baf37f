//! Storage layer error types
//!
//! Defines all errors that can occur below the query layer.

use thiserror::Error;

/// Errors that can occur in the storage and index layers
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Compression or decompression failed
    #[error("Compression error: {0}")]
    Compression(String),

    /// Data corruption detected (checksum mismatch, invalid magic, etc.)
    #[error("Corrupt data: {0}")]
    Corruption(String),

    /// A key was appended below the last key of an ordered store
    #[error("Out of order append: key {key} after {last}")]
    OutOfOrder { key: u64, last: u64 },

    /// The index set or engine was already disposed
    #[error("Use after dispose: {0}")]
    Disposed(String),

    /// An eviction targeted an index that is not resident
    #[error("Index {value_id} of set '{set}' is not resident")]
    NotResident { set: String, value_id: u32 },

    /// A per-behavior counter reached its maximum value
    #[error("Event counter saturated for behavior {0}")]
    CounterSaturated(u32),

    /// A key is too large for the split index domain
    #[error("Index overflow: {0}")]
    IndexOverflow(u64),

    /// Background batch failed or the worker pool is gone
    #[error("Executor error: {0}")]
    Executor(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
