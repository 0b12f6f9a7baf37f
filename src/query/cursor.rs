//! Cursor adapters used by the query layer

use crate::storage::{BidiCursor, PlainTuple, RoleTuple, StorageResult, Tuple};

/// Presents a plain cursor as a role cursor whose tuples all carry `Role::ANY`
pub struct Widen<C> {
    inner: C,
}

impl<C> Widen<C>
where
    C: BidiCursor<Item = PlainTuple>,
{
    pub fn new(inner: C) -> Self {
        Self { inner }
    }
}

impl<C> BidiCursor for Widen<C>
where
    C: BidiCursor<Item = PlainTuple>,
{
    type Item = RoleTuple;

    fn peek_next(&mut self) -> StorageResult<Option<RoleTuple>> {
        Ok(self.inner.peek_next()?.map(RoleTuple::from))
    }

    fn peek_previous(&mut self) -> StorageResult<Option<RoleTuple>> {
        Ok(self.inner.peek_previous()?.map(RoleTuple::from))
    }

    fn next(&mut self) -> StorageResult<Option<RoleTuple>> {
        Ok(self.inner.next()?.map(RoleTuple::from))
    }

    fn previous(&mut self) -> StorageResult<Option<RoleTuple>> {
        Ok(self.inner.previous()?.map(RoleTuple::from))
    }

    fn seek(&mut self, key: u64) -> StorageResult<()> {
        self.inner.seek(key)
    }
}

/// Take up to `limit` tuples going forward
pub fn collect_forward<C: BidiCursor + ?Sized>(cursor: &mut C, limit: usize) -> StorageResult<Vec<C::Item>> {
    let mut out = Vec::new();
    while out.len() < limit {
        match cursor.next()? {
            Some(tuple) => out.push(tuple),
            None => break,
        }
    }
    Ok(out)
}

/// Take up to `limit` tuples going backward, nearest first
pub fn collect_backward<C: BidiCursor + ?Sized>(cursor: &mut C, limit: usize) -> StorageResult<Vec<C::Item>> {
    let mut out = Vec::new();
    while out.len() < limit {
        match cursor.previous()? {
            Some(tuple) => out.push(tuple),
            None => break,
        }
    }
    Ok(out)
}

/// Keys of every remaining tuple going forward
pub fn remaining_keys<C: BidiCursor + ?Sized>(cursor: &mut C) -> StorageResult<Vec<u64>> {
    Ok(collect_forward(cursor, usize::MAX)?
        .iter()
        .map(Tuple::key)
        .collect())
}
