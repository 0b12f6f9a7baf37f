//! Single-input cursor filters
//!
//! - **DuplicateFilter**: returns one tuple per run of equal keys
//! - **RoleFilter**: drops tuples whose role is not allowed

use crate::storage::{BidiCursor, Role, StorageResult, Tuple};

/// Collapses runs of equal keys into the first tuple of the run
///
/// Every step moves over a whole run, so the gap of the inner cursor always
/// sits between two runs and any sequence of steps can be undone by the
/// opposite sequence.
pub struct DuplicateFilter<C: BidiCursor> {
    inner: C,
}

impl<C: BidiCursor> DuplicateFilter<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> C {
        self.inner
    }

    /// Move back over the run before the gap, returning its first tuple and its length
    fn step_back_run(&mut self) -> StorageResult<Option<(C::Item, usize)>> {
        let mut first = match self.inner.previous()? {
            Some(tuple) => tuple,
            None => return Ok(None),
        };
        let mut steps = 1;
        while let Some(tuple) = self.inner.peek_previous()? {
            if tuple.key() != first.key() {
                break;
            }
            first = tuple;
            self.inner.previous()?;
            steps += 1;
        }
        Ok(Some((first, steps)))
    }
}

impl<C: BidiCursor> BidiCursor for DuplicateFilter<C> {
    type Item = C::Item;

    fn peek_next(&mut self) -> StorageResult<Option<C::Item>> {
        self.inner.peek_next()
    }

    fn peek_previous(&mut self) -> StorageResult<Option<C::Item>> {
        let (first, steps) = match self.step_back_run()? {
            Some(run) => run,
            None => return Ok(None),
        };
        for _ in 0..steps {
            self.inner.next()?;
        }
        Ok(Some(first))
    }

    fn next(&mut self) -> StorageResult<Option<C::Item>> {
        let first = match self.inner.next()? {
            Some(tuple) => tuple,
            None => return Ok(None),
        };
        while let Some(tuple) = self.inner.peek_next()? {
            if tuple.key() != first.key() {
                break;
            }
            self.inner.next()?;
        }
        Ok(Some(first))
    }

    fn previous(&mut self) -> StorageResult<Option<C::Item>> {
        Ok(self.step_back_run()?.map(|(first, _)| first))
    }

    fn seek(&mut self, key: u64) -> StorageResult<()> {
        self.inner.seek(key)
    }
}

/// Keeps only tuples whose role is in an allowed set
pub struct RoleFilter<C: BidiCursor> {
    inner: C,
    allowed: Vec<Role>,
}

impl<C: BidiCursor> RoleFilter<C> {
    pub fn new(inner: C, allowed: Vec<Role>) -> Self {
        Self { inner, allowed }
    }

    fn accepts(&self, tuple: &C::Item) -> bool {
        match tuple.role() {
            Some(role) => self.allowed.contains(&role),
            None => true,
        }
    }
}

impl<C: BidiCursor> BidiCursor for RoleFilter<C> {
    type Item = C::Item;

    fn peek_next(&mut self) -> StorageResult<Option<C::Item>> {
        while let Some(tuple) = self.inner.peek_next()? {
            if self.accepts(&tuple) {
                return Ok(Some(tuple));
            }
            self.inner.next()?;
        }
        Ok(None)
    }

    fn peek_previous(&mut self) -> StorageResult<Option<C::Item>> {
        while let Some(tuple) = self.inner.peek_previous()? {
            if self.accepts(&tuple) {
                return Ok(Some(tuple));
            }
            self.inner.previous()?;
        }
        Ok(None)
    }

    fn next(&mut self) -> StorageResult<Option<C::Item>> {
        while let Some(tuple) = self.inner.next()? {
            if self.accepts(&tuple) {
                return Ok(Some(tuple));
            }
        }
        Ok(None)
    }

    fn previous(&mut self) -> StorageResult<Option<C::Item>> {
        while let Some(tuple) = self.inner.previous()? {
            if self.accepts(&tuple) {
                return Ok(Some(tuple));
            }
        }
        Ok(None)
    }

    fn seek(&mut self, key: u64) -> StorageResult<()> {
        self.inner.seek(key)
    }
}
