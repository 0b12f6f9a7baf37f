//! Merge-join over ordered cursors
//!
//! Both operators keep a single boundary key `g` instead of per-input
//! state: results with key < `g` are behind the merged cursor and results
//! with key >= `g` are ahead of it. Every step re-seeks the inputs to the
//! boundary, so a step forward and a step back always look at the same
//! candidates and the merged cursor is symmetric by construction.
//!
//! ```text
//!            g
//!  A: 1  4   | 7  9
//!  B: 2  4   | 7  8
//!  A ∧ B:    4 | 7          A ∨ B: 1 2 4 | 7 8 9
//! ```
//!
//! Each emitted key is emitted once; when several tuples share it the first
//! tuple of the lowest input that qualifies is returned, going either way.

use crate::storage::{BidiCursor, StorageResult, Tuple};

/// Whether two tuples may be joined on their roles
fn roles_compatible<T: Tuple>(a: &T, b: &T) -> bool {
    match (a.role(), b.role()) {
        (Some(x), Some(y)) => x.compatible(y),
        _ => true,
    }
}

/// Boundary that keeps the merged position where the inputs already are
fn initial_boundary<C: BidiCursor>(heads: &mut [C]) -> StorageResult<u64> {
    let mut boundary = 0;
    for head in heads.iter_mut() {
        if let Some(tuple) = head.peek_previous()? {
            boundary = boundary.max(tuple.key().saturating_add(1));
        }
    }
    Ok(boundary)
}

/// Every tuple of `head` at exactly `key`
fn run_at<C: BidiCursor>(head: &mut C, key: u64) -> StorageResult<Vec<C::Item>> {
    head.seek(key)?;
    let mut run = Vec::new();
    while let Some(tuple) = head.peek_next()? {
        if tuple.key() != key {
            break;
        }
        run.push(tuple);
        head.next()?;
    }
    head.seek(key)?;
    Ok(run)
}

/// Intersection of N ordered cursors, optionally requiring compatible roles
pub struct Conjunction<C: BidiCursor> {
    heads: Vec<C>,
    match_roles: bool,
    boundary: u64,
}

impl<C: BidiCursor> Conjunction<C> {
    /// Inputs should already be positioned at the same starting key
    pub fn new(mut heads: Vec<C>, match_roles: bool) -> StorageResult<Self> {
        let boundary = initial_boundary(&mut heads)?;
        Ok(Self {
            heads,
            match_roles,
            boundary,
        })
    }

    fn single(&mut self) -> Option<&mut C> {
        match self.heads.as_mut_slice() {
            [only] => Some(only),
            _ => None,
        }
    }

    /// Tuple to emit for a key present in every input, if roles allow it
    fn pick(&mut self, key: u64) -> StorageResult<Option<C::Item>> {
        if !self.match_roles {
            self.heads[0].seek(key)?;
            return self.heads[0].peek_next();
        }

        let mut runs = Vec::with_capacity(self.heads.len());
        for head in self.heads.iter_mut() {
            runs.push(run_at(head, key)?);
        }
        let (first, others) = runs.split_at(1);
        Ok(first[0]
            .iter()
            .find(|t| others.iter().all(|run| run.iter().any(|o| roles_compatible(*t, o))))
            .copied())
    }

    fn find_forward(&mut self) -> StorageResult<Option<C::Item>> {
        if self.heads.is_empty() {
            return Ok(None);
        }

        let mut goal = self.boundary;
        loop {
            let mut min = u64::MAX;
            let mut max = 0;
            for head in self.heads.iter_mut() {
                head.seek(goal)?;
                match head.peek_next()? {
                    Some(tuple) => {
                        min = min.min(tuple.key());
                        max = max.max(tuple.key());
                    }
                    None => return Ok(None),
                }
            }

            if min != max {
                goal = max;
                continue;
            }
            if let Some(tuple) = self.pick(min)? {
                return Ok(Some(tuple));
            }
            match min.checked_add(1) {
                Some(next) => goal = next,
                None => return Ok(None),
            }
        }
    }

    fn find_backward(&mut self) -> StorageResult<Option<C::Item>> {
        if self.heads.is_empty() {
            return Ok(None);
        }

        let mut goal = self.boundary;
        loop {
            let mut min = u64::MAX;
            let mut max = 0;
            for head in self.heads.iter_mut() {
                head.seek(goal)?;
                match head.peek_previous()? {
                    Some(tuple) => {
                        min = min.min(tuple.key());
                        max = max.max(tuple.key());
                    }
                    None => return Ok(None),
                }
            }

            if min != max {
                goal = min + 1;
                continue;
            }
            if let Some(tuple) = self.pick(min)? {
                return Ok(Some(tuple));
            }
            goal = min;
        }
    }
}

impl<C: BidiCursor> BidiCursor for Conjunction<C> {
    type Item = C::Item;

    fn peek_next(&mut self) -> StorageResult<Option<C::Item>> {
        if let Some(only) = self.single() {
            return only.peek_next();
        }
        self.find_forward()
    }

    fn peek_previous(&mut self) -> StorageResult<Option<C::Item>> {
        if let Some(only) = self.single() {
            return only.peek_previous();
        }
        self.find_backward()
    }

    fn next(&mut self) -> StorageResult<Option<C::Item>> {
        if let Some(only) = self.single() {
            return only.next();
        }
        let found = self.find_forward()?;
        if let Some(tuple) = &found {
            self.boundary = tuple.key().saturating_add(1);
        }
        Ok(found)
    }

    fn previous(&mut self) -> StorageResult<Option<C::Item>> {
        if let Some(only) = self.single() {
            return only.previous();
        }
        let found = self.find_backward()?;
        if let Some(tuple) = &found {
            self.boundary = tuple.key();
        }
        Ok(found)
    }

    fn seek(&mut self, key: u64) -> StorageResult<()> {
        if let Some(only) = self.single() {
            return only.seek(key);
        }
        self.boundary = key;
        Ok(())
    }
}

/// Union of N ordered cursors, one tuple per key
pub struct Disjunction<C: BidiCursor> {
    heads: Vec<C>,
    boundary: u64,
}

impl<C: BidiCursor> Disjunction<C> {
    pub fn new(mut heads: Vec<C>) -> StorageResult<Self> {
        let boundary = initial_boundary(&mut heads)?;
        Ok(Self { heads, boundary })
    }

    fn single(&mut self) -> Option<&mut C> {
        match self.heads.as_mut_slice() {
            [only] => Some(only),
            _ => None,
        }
    }

    fn find_forward(&mut self) -> StorageResult<Option<C::Item>> {
        let mut best: Option<C::Item> = None;
        for head in self.heads.iter_mut() {
            head.seek(self.boundary)?;
            if let Some(tuple) = head.peek_next()? {
                if best.map_or(true, |b| tuple.key() < b.key()) {
                    best = Some(tuple);
                }
            }
        }
        Ok(best)
    }

    fn find_backward(&mut self) -> StorageResult<Option<C::Item>> {
        let mut best: Option<(usize, u64)> = None;
        for (i, head) in self.heads.iter_mut().enumerate() {
            head.seek(self.boundary)?;
            if let Some(tuple) = head.peek_previous()? {
                if best.map_or(true, |(_, k)| tuple.key() > k) {
                    best = Some((i, tuple.key()));
                }
            }
        }

        match best {
            Some((i, key)) => {
                // Same tuple a forward step would return for this key.
                let head = &mut self.heads[i];
                head.seek(key)?;
                head.peek_next()
            }
            None => Ok(None),
        }
    }
}

impl<C: BidiCursor> BidiCursor for Disjunction<C> {
    type Item = C::Item;

    fn peek_next(&mut self) -> StorageResult<Option<C::Item>> {
        if let Some(only) = self.single() {
            return only.peek_next();
        }
        self.find_forward()
    }

    fn peek_previous(&mut self) -> StorageResult<Option<C::Item>> {
        if let Some(only) = self.single() {
            return only.peek_previous();
        }
        self.find_backward()
    }

    fn next(&mut self) -> StorageResult<Option<C::Item>> {
        if let Some(only) = self.single() {
            return only.next();
        }
        let found = self.find_forward()?;
        if let Some(tuple) = &found {
            self.boundary = tuple.key().saturating_add(1);
        }
        Ok(found)
    }

    fn previous(&mut self) -> StorageResult<Option<C::Item>> {
        if let Some(only) = self.single() {
            return only.previous();
        }
        let found = self.find_backward()?;
        if let Some(tuple) = &found {
            self.boundary = tuple.key();
        }
        Ok(found)
    }

    fn seek(&mut self, key: u64) -> StorageResult<()> {
        if let Some(only) = self.single() {
            return only.seek(key);
        }
        self.boundary = key;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::cursor::{collect_backward, collect_forward, remaining_keys};
    use crate::storage::{PlainTuple, Role, RoleTuple, VecCursor};
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn plain(keys: &[u64]) -> VecCursor<PlainTuple> {
        VecCursor::new(keys.iter().copied().map(PlainTuple::new).collect())
    }

    fn roles(tuples: &[(u64, Role)]) -> VecCursor<RoleTuple> {
        VecCursor::new(tuples.iter().map(|&(k, r)| RoleTuple::new(k, r)).collect())
    }

    #[test]
    fn test_conjunction_intersects() {
        let mut conj = Conjunction::new(vec![plain(&[1, 3, 5, 7, 9]), plain(&[3, 4, 5, 9, 10])], false).unwrap();
        assert_eq!(remaining_keys(&mut conj).unwrap(), vec![3, 5, 9]);
        assert_eq!(conj.next().unwrap(), None);
        assert_eq!(conj.previous().unwrap(), Some(PlainTuple::new(9)));
    }

    #[test]
    fn test_conjunction_three_way() {
        let mut conj = Conjunction::new(
            vec![plain(&[1, 2, 3, 4, 5, 6]), plain(&[2, 4, 6]), plain(&[3, 6])],
            false,
        )
        .unwrap();
        assert_eq!(remaining_keys(&mut conj).unwrap(), vec![6]);
    }

    #[test]
    fn test_conjunction_identity_keeps_duplicates() {
        let tuples = [(1, Role::TARGET), (1, Role::VALUE), (4, Role::RESULT)];
        let mut conj = Conjunction::new(vec![roles(&tuples)], true).unwrap();
        let forward = collect_forward(&mut conj, 10).unwrap();
        assert_eq!(forward.len(), 3);
        let backward = collect_backward(&mut conj, 10).unwrap();
        assert_eq!(backward, forward.into_iter().rev().collect::<Vec<_>>());
    }

    #[test]
    fn test_conjunction_matches_roles() {
        let a = [(1, Role::TARGET), (2, Role::VALUE), (3, Role::TARGET), (3, Role::RESULT)];
        let b = [(1, Role::VALUE), (2, Role::VALUE), (3, Role::RESULT)];

        let mut loose = Conjunction::new(vec![roles(&a), roles(&b)], false).unwrap();
        assert_eq!(remaining_keys(&mut loose).unwrap(), vec![1, 2, 3]);

        let mut strict = Conjunction::new(vec![roles(&a), roles(&b)], true).unwrap();
        let found = collect_forward(&mut strict, 10).unwrap();
        assert_eq!(
            found,
            vec![RoleTuple::new(2, Role::VALUE), RoleTuple::new(3, Role::RESULT)]
        );
        let back = collect_backward(&mut strict, 10).unwrap();
        assert_eq!(back, found.into_iter().rev().collect::<Vec<_>>());
    }

    #[test]
    fn test_conjunction_wildcard_roles() {
        let a = [(1, Role::ANY), (2, Role::ANY_ARG), (3, Role::ANY_ARG)];
        let b = [(1, Role::EXCEPTION), (2, Role(2)), (3, Role::TARGET)];
        let mut conj = Conjunction::new(vec![roles(&a), roles(&b)], true).unwrap();
        assert_eq!(remaining_keys(&mut conj).unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_conjunction_starts_where_inputs_are() {
        let mut a = plain(&[1, 5, 9]);
        let mut b = plain(&[1, 5, 9]);
        a.seek(5).unwrap();
        b.seek(5).unwrap();
        let mut conj = Conjunction::new(vec![a, b], false).unwrap();
        assert_eq!(conj.peek_previous().unwrap(), Some(PlainTuple::new(1)));
        assert_eq!(conj.peek_next().unwrap(), Some(PlainTuple::new(5)));
    }

    #[test]
    fn test_disjunction_deduplicates() {
        let mut disj = Disjunction::new(vec![plain(&[1, 4, 6]), plain(&[2, 4, 7]), plain(&[4])]).unwrap();
        assert_eq!(remaining_keys(&mut disj).unwrap(), vec![1, 2, 4, 6, 7]);
        let back: Vec<u64> = collect_backward(&mut disj, 10)
            .unwrap()
            .iter()
            .map(|t| t.key())
            .collect();
        assert_eq!(back, vec![7, 6, 4, 2, 1]);
    }

    #[test]
    fn test_disjunction_same_tuple_both_ways() {
        let a = [(4, Role::VALUE)];
        let b = [(4, Role::TARGET)];
        let mut disj = Disjunction::new(vec![roles(&a), roles(&b)]).unwrap();
        let forward = disj.next().unwrap();
        let backward = disj.previous().unwrap();
        assert_eq!(forward, Some(RoleTuple::new(4, Role::VALUE)));
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_seek_moves_boundary() {
        let mut disj = Disjunction::new(vec![plain(&[1, 5]), plain(&[3, 8])]).unwrap();
        disj.seek(4).unwrap();
        assert_eq!(disj.peek_next().unwrap(), Some(PlainTuple::new(5)));
        assert_eq!(disj.peek_previous().unwrap(), Some(PlainTuple::new(3)));
    }

    #[test]
    fn test_empty_inputs() {
        let mut conj = Conjunction::<VecCursor<PlainTuple>>::new(vec![], false).unwrap();
        assert_eq!(conj.next().unwrap(), None);
        let mut disj = Disjunction::new(vec![plain(&[]), plain(&[])]).unwrap();
        assert_eq!(disj.next().unwrap(), None);
        assert_eq!(disj.previous().unwrap(), None);
    }

    fn key_set() -> impl Strategy<Value = BTreeSet<u64>> {
        prop::collection::btree_set(0u64..200, 0..60)
    }

    proptest! {
        #[test]
        fn prop_conjunction_is_intersection(a in key_set(), b in key_set()) {
            let av: Vec<u64> = a.iter().copied().collect();
            let bv: Vec<u64> = b.iter().copied().collect();
            let mut conj = Conjunction::new(vec![plain(&av), plain(&bv)], false).unwrap();
            let expected: Vec<u64> = a.intersection(&b).copied().collect();
            prop_assert_eq!(remaining_keys(&mut conj).unwrap(), expected);
        }

        #[test]
        fn prop_disjunction_is_union(a in key_set(), b in key_set(), c in key_set()) {
            let cursors = [&a, &b, &c]
                .iter()
                .map(|s| plain(&s.iter().copied().collect::<Vec<_>>()))
                .collect();
            let mut disj = Disjunction::new(cursors).unwrap();
            let mut expected: BTreeSet<u64> = a.union(&b).copied().collect();
            expected.extend(c.iter().copied());
            prop_assert_eq!(remaining_keys(&mut disj).unwrap(), expected.into_iter().collect::<Vec<_>>());
        }

        #[test]
        fn prop_round_trip_is_symmetric(
            a in key_set(),
            b in key_set(),
            start in 0u64..200,
            steps in 0usize..40,
            use_conjunction in any::<bool>(),
        ) {
            let av: Vec<u64> = a.iter().copied().collect();
            let bv: Vec<u64> = b.iter().copied().collect();
            let mut cursor: Box<dyn BidiCursor<Item = PlainTuple>> = if use_conjunction {
                Box::new(Conjunction::new(vec![plain(&av), plain(&bv)], false).unwrap())
            } else {
                Box::new(Disjunction::new(vec![plain(&av), plain(&bv)]).unwrap())
            };
            cursor.seek(start).unwrap();

            let before_next = cursor.peek_next().unwrap();
            let before_prev = cursor.peek_previous().unwrap();

            let forward = collect_forward(&mut cursor, steps).unwrap();
            let backward = collect_backward(&mut cursor, forward.len()).unwrap();
            prop_assert_eq!(backward, forward.into_iter().rev().collect::<Vec<_>>());

            prop_assert_eq!(cursor.peek_next().unwrap(), before_next);
            prop_assert_eq!(cursor.peek_previous().unwrap(), before_prev);
        }
    }
}
