//! Query Executor
//!
//! Compiles a `Condition` into one bidirectional cursor over role tuples and
//! walks it:
//! 1. Each leaf opens the postings list(s) of its value
//! 2. Role restrictions become role filters on those lists
//! 3. Split dimensions join their two partial lists
//! 4. `And` / `Or` become conjunctions / disjunctions
//!
//! # Execution Pipeline
//!
//! ```text
//! Condition → Leaves → Snapshots → Cursors at start event → Merge → Events
//! ```
//!
//! Batches still pending in the worker pool are not visible; call
//! `Indexes::flush_tasks` before querying recently written events.

use crate::index::{Dimension, Indexes};
use crate::query::ast::{Condition, Leaf};
use crate::query::cursor::{collect_backward, collect_forward, Widen};
use crate::query::error::{QueryError, QueryResult};
use crate::query::filter::{DuplicateFilter, RoleFilter};
use crate::query::histogram::generic_counts;
use crate::query::merge::{Conjunction, Disjunction};
use crate::storage::{
    BidiCursor, BoxedCursor, EventId, PlainTuple, Role, RoleTuple, StorageError, StoreSnapshot, Timestamp,
};
use serde::Serialize;
use std::sync::Arc;

/// One event selected by a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EventMatch {
    pub event_id: EventId,
    pub timestamp: Timestamp,
    /// Role of the matching tuple; `any` for plain dimensions
    pub role: i8,
}

/// Query executor
pub struct QueryExecutor {
    indexes: Arc<Indexes>,
}

impl QueryExecutor {
    pub fn new(indexes: Arc<Indexes>) -> Self {
        Self { indexes }
    }

    pub fn indexes(&self) -> &Arc<Indexes> {
        &self.indexes
    }

    /// Parse and run a condition string, see `events`
    pub fn events_str(&self, condition: &str, from: Timestamp, limit: usize) -> QueryResult<Vec<EventMatch>> {
        let condition = crate::query::parser::parse_condition(condition)?;
        self.events(&condition, from, limit)
    }

    /// Up to `limit` matching events at or after `from`, oldest first
    pub fn events(&self, condition: &Condition, from: Timestamp, limit: usize) -> QueryResult<Vec<EventMatch>> {
        let start = self.indexes.event_id_lower_bound(from)?;
        let mut cursor = self.compile(condition, start)?;
        cursor.seek(start)?;
        let tuples = collect_forward(&mut cursor, limit)?;
        self.materialize(&tuples)
    }

    /// Up to `limit` matching events strictly before `before`, newest first
    pub fn events_before(
        &self,
        condition: &Condition,
        before: Timestamp,
        limit: usize,
    ) -> QueryResult<Vec<EventMatch>> {
        let start = self.indexes.event_id_lower_bound(before)?;
        let mut cursor = self.compile(condition, start)?;
        cursor.seek(start)?;
        let tuples = collect_backward(&mut cursor, limit)?;
        self.materialize(&tuples)
    }

    /// Matching events per time slot over `[t1, t2)`
    ///
    /// A single plain leaf is counted directly on its index; anything else is
    /// compiled and walked.
    pub fn counts(&self, condition: &Condition, t1: Timestamp, t2: Timestamp, slots: usize) -> QueryResult<Vec<u64>> {
        if let Condition::Leaf(leaf) = condition {
            if leaf.role.is_none() && self.indexes.plain_set(leaf.dimension).is_some() {
                let snapshot = self.plain_snapshot(leaf)?;
                return Ok(self.indexes.fast_counts(&snapshot, t1, t2, slots)?);
            }
        }

        let start = self.indexes.event_id_lower_bound(t1)?;
        let mut cursor = self.compile(condition, start)?;
        Ok(generic_counts(&self.indexes, &mut cursor, t1, t2, slots)?)
    }

    /// Build the merged cursor of `condition`, positioned at `start`
    pub fn compile(&self, condition: &Condition, start: EventId) -> QueryResult<BoxedCursor<RoleTuple>> {
        match condition {
            Condition::Leaf(leaf) => self.compile_leaf(leaf, start),
            Condition::And(ops) => {
                let heads = ops
                    .iter()
                    .map(|op| self.compile(op, start))
                    .collect::<QueryResult<Vec<_>>>()?;
                Ok(Box::new(Conjunction::new(heads, false)?))
            }
            Condition::Or(ops) => {
                let heads = ops
                    .iter()
                    .map(|op| self.compile(op, start))
                    .collect::<QueryResult<Vec<_>>>()?;
                Ok(Box::new(Disjunction::new(heads)?))
            }
        }
    }

    fn compile_leaf(&self, leaf: &Leaf, start: EventId) -> QueryResult<BoxedCursor<RoleTuple>> {
        match leaf.dimension {
            Dimension::Object => {
                let allowed = self.allowed_roles(leaf)?;
                let heads = self
                    .indexes
                    .object_parts(leaf.value)?
                    .iter()
                    .map(|part| role_cursor(part, start, allowed.clone()))
                    .collect::<QueryResult<Vec<_>>>()?;
                Ok(Box::new(Conjunction::new(heads, true)?))
            }
            Dimension::ArrayIndex => {
                reject_role(leaf)?;
                let heads = self
                    .indexes
                    .array_index_parts(leaf.value)?
                    .iter()
                    .map(|part| -> QueryResult<BoxedCursor<RoleTuple>> {
                        Ok(Box::new(Widen::new(part.cursor_at(start)?)))
                    })
                    .collect::<QueryResult<Vec<_>>>()?;
                Ok(Box::new(Conjunction::new(heads, false)?))
            }
            dimension => {
                if self.indexes.plain_set(dimension).is_some() {
                    reject_role(leaf)?;
                    let snapshot = self.plain_snapshot(leaf)?;
                    return Ok(Box::new(Widen::new(snapshot.cursor_at(start)?)));
                }

                let set = self
                    .indexes
                    .role_set(dimension)
                    .ok_or_else(|| QueryError::UnknownDimension(dimension.to_string()))?;
                let snapshot = set.get_index(value_id(leaf.value)?)?;
                let allowed = self.allowed_roles(leaf)?;
                let cursor = role_cursor(&snapshot, start, allowed)?;
                Ok(Box::new(DuplicateFilter::new(cursor)))
            }
        }
    }

    fn plain_snapshot(&self, leaf: &Leaf) -> QueryResult<StoreSnapshot<PlainTuple>> {
        let set = self
            .indexes
            .plain_set(leaf.dimension)
            .ok_or_else(|| QueryError::UnknownDimension(leaf.dimension.to_string()))?;
        Ok(set.get_index(value_id(leaf.value)?)?)
    }

    /// Concrete roles a leaf accepts, `None` meaning every role
    fn allowed_roles(&self, leaf: &Leaf) -> QueryResult<Option<Vec<Role>>> {
        let Some(role) = leaf.role else {
            return Ok(None);
        };
        match leaf.dimension {
            Dimension::Behavior => Ok(Some(role.behavior_expansion())),
            d if d.is_role_tagged() => Ok(role.object_expansion()),
            _ => Err(invalid_role(leaf)),
        }
    }

    fn materialize(&self, tuples: &[RoleTuple]) -> QueryResult<Vec<EventMatch>> {
        let timestamps = self.indexes.timestamps().snapshot();
        let mut out = Vec::with_capacity(tuples.len());
        for tuple in tuples {
            let timestamp = timestamps
                .get(tuple.event_id)?
                .map(|s| s.timestamp)
                .ok_or_else(|| {
                    QueryError::Storage(StorageError::Corruption(format!(
                        "event {} has no timestamp",
                        tuple.event_id
                    )))
                })?;
            out.push(EventMatch {
                event_id: tuple.event_id,
                timestamp,
                role: tuple.role.0,
            });
        }
        Ok(out)
    }
}

fn role_cursor(
    snapshot: &StoreSnapshot<RoleTuple>,
    start: EventId,
    allowed: Option<Vec<Role>>,
) -> QueryResult<BoxedCursor<RoleTuple>> {
    let cursor = snapshot.cursor_at(start)?;
    let boxed: BoxedCursor<RoleTuple> = match allowed {
        Some(roles) => Box::new(RoleFilter::new(cursor, roles)),
        None => Box::new(cursor),
    };
    Ok(boxed)
}

fn value_id(value: u64) -> QueryResult<u32> {
    u32::try_from(value).map_err(|_| QueryError::Storage(StorageError::IndexOverflow(value)))
}

fn reject_role(leaf: &Leaf) -> QueryResult<()> {
    match leaf.role {
        Some(_) => Err(invalid_role(leaf)),
        None => Ok(()),
    }
}

fn invalid_role(leaf: &Leaf) -> QueryError {
    QueryError::InvalidRole(format!("dimension '{}' does not carry roles", leaf.dimension))
}
