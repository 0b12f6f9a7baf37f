//! Tracedex Storage Layer
//!
//! This module provides the ordered tuple store the indexes are built on:
//!
//! - **types**: Core data structures (EventId, Role, Tuple variants)
//! - **pagefile**: Shared file of fixed-size pages with an LRU page cache
//! - **codec**: Delta encoding + LZ4 compression of tuple pages
//! - **tuple_store**: Ordered postings list, snapshots and cursors
//! - **cursor**: The bidirectional cursor trait
//! - **executor**: Grouped worker pool applying write batches
//! - **error**: Error types
//!
//! # Architecture
//!
//! ```text
//! Write Path:
//!   Tuple → TupleStore tail → full? → encode → sealed page in PageFile
//!
//! Read Path:
//!   snapshot() → cursor_at(key) → page cache → decode → tuples
//!
//! Eviction:
//!   TupleStore → serialize_to() → StoreDescriptor (64 bytes) → deserialize_from()
//! ```

pub mod codec;
pub mod cursor;
pub mod error;
pub mod executor;
pub mod pagefile;
pub mod tuple_store;
pub mod types;

// Re-export commonly used types
pub use codec::{decode_page, encode_page, page_capacity, CompressionType};
pub use cursor::{BidiCursor, BoxedCursor, VecCursor};
pub use error::{StorageError, StorageResult};
pub use executor::{ExecutorStats, Task, TaskExecutor};
pub use pagefile::{PageFile, PageFileStats, PageId, NO_PAGE};
pub use tuple_store::{PageRef, StoreCursor, StoreDescriptor, StoreSnapshot, TupleStore, DESCRIPTOR_SIZE};
pub use types::{EventId, PlainTuple, Role, RoleTuple, Stamp, TieBreak, Timestamp, Tuple};
