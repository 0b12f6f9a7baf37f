//! Bidirectional tuple cursors
//!
//! A cursor sits in a gap between two tuples: `next` returns the tuple after
//! the gap and moves past it, `previous` returns the tuple before the gap and
//! moves back over it. Calling `next` k times then `previous` k times leaves
//! the cursor where it started.

use crate::storage::error::StorageResult;
use crate::storage::types::Tuple;

pub trait BidiCursor: Send {
    type Item: Tuple;

    fn peek_next(&mut self) -> StorageResult<Option<Self::Item>>;

    fn peek_previous(&mut self) -> StorageResult<Option<Self::Item>>;

    fn next(&mut self) -> StorageResult<Option<Self::Item>>;

    fn previous(&mut self) -> StorageResult<Option<Self::Item>>;

    /// Moves the gap so that `next` yields the first tuple whose key is >= `key`.
    ///
    /// The default walks tuple by tuple; stores override it with a direct lookup.
    fn seek(&mut self, key: u64) -> StorageResult<()> {
        while let Some(tuple) = self.peek_previous()? {
            if tuple.key() < key {
                break;
            }
            self.previous()?;
        }
        while let Some(tuple) = self.peek_next()? {
            if tuple.key() >= key {
                break;
            }
            self.next()?;
        }
        Ok(())
    }
}

/// Type-erased cursor, used wherever heterogeneous sources are merged
pub type BoxedCursor<T> = Box<dyn BidiCursor<Item = T>>;

impl<C: BidiCursor + ?Sized> BidiCursor for Box<C> {
    type Item = C::Item;

    fn peek_next(&mut self) -> StorageResult<Option<Self::Item>> {
        (**self).peek_next()
    }

    fn peek_previous(&mut self) -> StorageResult<Option<Self::Item>> {
        (**self).peek_previous()
    }

    fn next(&mut self) -> StorageResult<Option<Self::Item>> {
        (**self).next()
    }

    fn previous(&mut self) -> StorageResult<Option<Self::Item>> {
        (**self).previous()
    }

    fn seek(&mut self, key: u64) -> StorageResult<()> {
        (**self).seek(key)
    }
}

/// In-memory cursor over a sorted vector
#[derive(Debug, Clone)]
pub struct VecCursor<T: Tuple> {
    tuples: Vec<T>,
    position: usize,
}

impl<T: Tuple> VecCursor<T> {
    /// Tuples must already be in key order
    pub fn new(tuples: Vec<T>) -> Self {
        Self {
            tuples,
            position: 0,
        }
    }
}

impl<T: Tuple> BidiCursor for VecCursor<T> {
    type Item = T;

    fn peek_next(&mut self) -> StorageResult<Option<T>> {
        Ok(self.tuples.get(self.position).copied())
    }

    fn peek_previous(&mut self) -> StorageResult<Option<T>> {
        Ok(self
            .position
            .checked_sub(1)
            .and_then(|p| self.tuples.get(p).copied()))
    }

    fn next(&mut self) -> StorageResult<Option<T>> {
        let tuple = self.peek_next()?;
        if tuple.is_some() {
            self.position += 1;
        }
        Ok(tuple)
    }

    fn previous(&mut self) -> StorageResult<Option<T>> {
        let tuple = self.peek_previous()?;
        if tuple.is_some() {
            self.position -= 1;
        }
        Ok(tuple)
    }

    fn seek(&mut self, key: u64) -> StorageResult<()> {
        self.position = self.tuples.partition_point(|t| t.key() < key);
        Ok(())
    }
}
