//! Tracedex Query Engine
//!
//! Filters the event stream with boolean conditions over the indexed
//! dimensions:
//!
//! - **AST**: Condition tree types
//! - **Parser**: Parse condition strings into the AST
//! - **Merge**: Conjunction and disjunction of bidirectional cursors
//! - **Filter**: Role restriction and duplicate suppression
//! - **Histogram**: Per-slot event counts over a time range
//! - **Executor**: Compile conditions into cursors and walk them
//!
//! # Condition Language
//!
//! ```text
//! dimension = value [: role] [AND|OR ...]
//! ```
//!
//! # Examples
//!
//! ```rust,ignore
//! use tracedex::query::{Condition, QueryExecutor};
//! use tracedex::index::Dimension;
//!
//! let executor = QueryExecutor::new(indexes);
//!
//! // Built by hand
//! let cond = Condition::and(vec![
//!     Condition::leaf(Dimension::Thread, 3),
//!     Condition::leaf(Dimension::Depth, 2),
//! ]);
//! let first = executor.events(&cond, 0, 100)?;
//!
//! // Parsed from a string
//! let hits = executor.events_str("behavior = 12 : called OR field = 4", 0, 100)?;
//!
//! // Histogram over [t1, t2)
//! let counts = executor.counts(&cond, t1, t2, 64)?;
//! ```

mod ast;
mod cursor;
mod error;
mod executor;
mod filter;
mod histogram;
mod merge;
mod parser;

pub use ast::{Condition, Leaf};
pub use cursor::{collect_backward, collect_forward, remaining_keys, Widen};
pub use error::{QueryError, QueryResult};
pub use executor::{EventMatch, QueryExecutor};
pub use filter::{DuplicateFilter, RoleFilter};
pub use histogram::{generic_counts, slot_of};
pub use merge::{Conjunction, Disjunction};
pub use parser::parse_condition;
