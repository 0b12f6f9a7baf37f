//! # Tracedex
//!
//! Event index and query engine for execution traces. Every recorded event
//! gets a dense id; secondary indexes map attribute values (thread, depth,
//! behavior, object, ...) to the ordered list of events carrying them, and
//! boolean conditions are answered by merging those lists.
//!
//! ## Features
//!
//! - **Bounded memory**: postings lists are evicted to a shared page file and
//!   reloaded on demand, least recently used first
//! - **Batched ingestion**: writes are applied by a worker pool, in order per index
//! - **Role-aware merges**: conjunctions match the role an object plays in an event
//! - **Histograms**: per-slot event counts over any time range
//!
//! ## Modules
//!
//! - [`storage`]: Page file, tuple codec, ordered tuple stores, worker pool
//! - [`index`]: Timestamp index, index sets, residency, the `Indexes` aggregate
//! - [`query`]: Condition language, merge cursors, histograms, executor
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tracedex::index::{IndexConfig, Indexes};
//! use tracedex::query::QueryExecutor;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let indexes = Arc::new(Indexes::open("./trace".as_ref(), IndexConfig::default())?);
//!
//!     // Record two events
//!     for (ts, thread) in [(100, 1), (250, 2)] {
//!         let event = indexes.register_timestamp(ts)?;
//!         indexes.index_thread(thread, event)?;
//!     }
//!     indexes.flush_tasks()?;
//!
//!     // Filter them
//!     let executor = QueryExecutor::new(Arc::clone(&indexes));
//!     let hits = executor.events_str("thread = 2", 0, 10)?;
//!     println!("Found {} events", hits.len());
//!
//!     indexes.dispose()?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod index;
pub mod query;
pub mod storage;

// Re-export top-level types for convenience
pub use storage::{BidiCursor, EventId, Role, StorageError, StorageResult, Timestamp};

pub use index::{Dimension, IndexConfig, IndexStats, Indexes};

pub use query::{Condition, EventMatch, QueryError, QueryExecutor, QueryResult};

pub use config::{Config, ConfigError, LoggingConfig};
