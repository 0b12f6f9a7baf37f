//! Tracedex Index Structures
//!
//! Secondary indexes over the event stream, keyed by event id:
//!
//! - **TimestampIndex**: event id ↔ timestamp
//! - **IndexSet**: one postings list per attribute value of a dimension
//! - **ResidencyManager**: bounds how many postings lists stay in memory
//! - **Indexes**: the aggregate the ingestion and query layers talk to
//!
//! # Architecture
//!
//! ```text
//! Query: "events of thread 3 at depth 2"
//!        ↓
//! Indexes: thread set → value 3 → snapshot
//!          depth set  → value 2 → snapshot (reloaded from its slot if discarded)
//!        ↓
//! Merge: conjunction of both cursors → event ids in order
//! ```

mod manager;
mod residency;
mod set;
mod split;
mod time_index;

pub use manager::{IndexConfig, Indexes, INDEX_FILE_NAME};
pub use residency::{Evictable, OwnerKey, ResidencyManager, ResidencyStats, SetId};
pub use set::{Batch, BatchBuilder, IndexSet, PlainIndexSet, RoleIndexSet, SetStats};
pub use split::{join_key, split_key, MAX_SPLIT_KEY};
pub use time_index::TimestampIndex;

use crate::storage::{ExecutorStats, PageFileStats};
use std::fmt;
use std::str::FromStr;

/// A dimension events can be filtered on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    Type,
    Thread,
    Depth,
    Location,
    AdviceSource,
    AdviceCflow,
    Role,
    Behavior,
    Field,
    Variable,
    Object,
    ArrayIndex,
}

impl Dimension {
    pub const ALL: [Dimension; 12] = [
        Dimension::Type,
        Dimension::Thread,
        Dimension::Depth,
        Dimension::Location,
        Dimension::AdviceSource,
        Dimension::AdviceCflow,
        Dimension::Role,
        Dimension::Behavior,
        Dimension::Field,
        Dimension::Variable,
        Dimension::Object,
        Dimension::ArrayIndex,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Dimension::Type => "type",
            Dimension::Thread => "thread",
            Dimension::Depth => "depth",
            Dimension::Location => "location",
            Dimension::AdviceSource => "advice_source",
            Dimension::AdviceCflow => "advice_cflow",
            Dimension::Role => "role",
            Dimension::Behavior => "behavior",
            Dimension::Field => "field",
            Dimension::Variable => "variable",
            Dimension::Object => "object",
            Dimension::ArrayIndex => "array_index",
        }
    }

    /// Whether the dimension's tuples carry a role
    pub fn is_role_tagged(self) -> bool {
        matches!(
            self,
            Dimension::Behavior | Dimension::Field | Dimension::Variable | Dimension::Object
        )
    }

    /// Whether keys are split across two partial sets
    pub fn is_split(self) -> bool {
        matches!(self, Dimension::Object | Dimension::ArrayIndex)
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dimension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Dimension::ALL
            .iter()
            .copied()
            .find(|d| d.name() == lower)
            .ok_or_else(|| format!("unknown dimension '{}'", s))
    }
}

/// Statistics about index usage
#[derive(Debug, Clone, Default)]
pub struct IndexStats {
    /// Per-set counters, in a fixed order
    pub sets: Vec<SetStats>,
    /// Number of events registered
    pub events: u64,
    pub max_object_id: u64,
    pub residency: ResidencyStats,
    pub pages: PageFileStats,
    pub executor: ExecutorStats,
}

impl IndexStats {
    pub fn created(&self) -> u64 {
        self.sets.iter().map(|s| s.created).sum()
    }

    pub fn discarded(&self) -> u64 {
        self.sets.iter().map(|s| s.discarded).sum()
    }

    pub fn reloaded(&self) -> u64 {
        self.sets.iter().map(|s| s.reloaded).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_names_round_trip() {
        for dimension in Dimension::ALL {
            assert_eq!(dimension.name().parse::<Dimension>().unwrap(), dimension);
        }
        assert_eq!("THREAD".parse::<Dimension>().unwrap(), Dimension::Thread);
        assert!("colour".parse::<Dimension>().is_err());
    }

    #[test]
    fn test_dimension_shapes() {
        assert!(Dimension::Object.is_role_tagged());
        assert!(Dimension::Object.is_split());
        assert!(!Dimension::ArrayIndex.is_role_tagged());
        assert!(!Dimension::Thread.is_split());
    }
}
