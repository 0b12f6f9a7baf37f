//! Histogram builder
//!
//! Counts tuples per time slot over `[t1, t2)`. Slot `i` receives the
//! events whose timestamp `t` satisfies
//! `floor((t - t1) * slots / (t2 - t1)) == i`.
//!
//! Two ways to get there:
//! - **generic**: walk any cursor from the first event at `t1`
//! - **fast**: one range count per slot on a single index, see
//!   `Indexes::fast_counts`

use crate::index::Indexes;
use crate::storage::{BidiCursor, StorageResult, Timestamp, Tuple};

/// Slot of timestamp `t`, which must lie in `[t1, t2)`
pub fn slot_of(t: Timestamp, t1: Timestamp, t2: Timestamp, slots: usize) -> usize {
    (((t - t1) as u128 * slots as u128) / (t2 - t1) as u128) as usize
}

/// Per-slot counts obtained by walking `cursor`
///
/// The cursor is moved to the first event at or after `t1` and walked
/// until the first event at or after `t2`.
pub fn generic_counts<C: BidiCursor + ?Sized>(
    indexes: &Indexes,
    cursor: &mut C,
    t1: Timestamp,
    t2: Timestamp,
    slots: usize,
) -> StorageResult<Vec<u64>> {
    let mut counts = vec![0u64; slots];
    if slots == 0 || t2 <= t1 {
        return Ok(counts);
    }

    let timestamps = indexes.timestamps().snapshot();
    let end = timestamps.lower_bound(t2)?;
    cursor.seek(timestamps.lower_bound(t1)?)?;

    while let Some(tuple) = cursor.next()? {
        let event_id = tuple.key();
        if event_id >= end {
            break;
        }
        let Some(stamp) = timestamps.get(event_id)? else {
            break;
        };
        counts[slot_of(stamp.timestamp, t1, t2, slots)] += 1;
    }
    Ok(counts)
}
