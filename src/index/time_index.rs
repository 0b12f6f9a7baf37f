//! Timestamp Index - maps dense event ids to timestamps
//!
//! Timestamps are stored in registration order, so the position of a stamp
//! in the store is the event id of its event. Since timestamps never
//! decrease, the store is also sorted by timestamp and a timestamp lookup is
//! a binary search over it.
//!
//! # Tie-breaks
//!
//! ```text
//! event id:   0   1   2
//! timestamp: 10  10  20
//!
//! position_of(10, AtOrAfter)  = 0
//! position_of(10, AtOrBefore) = 1
//! position_of(15, AtOrAfter)  = 2
//! position_of(15, AtOrBefore) = 1
//! ```
//!
//! Event ids are assigned synchronously by `register`; the stamps themselves
//! are appended by the worker pool like any other batch.

use crate::storage::{
    EventId, Stamp, StorageError, StorageResult, StoreSnapshot, TaskExecutor, TieBreak, Timestamp, TupleStore,
    PageFile,
};
use parking_lot::Mutex;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Worker group used for timestamp batches
const TIMESTAMP_GROUP: u64 = u64::MAX;

struct Registration {
    last: Option<Timestamp>,
    next_id: EventId,
    pending: Vec<Stamp>,
}

pub struct TimestampIndex {
    store: Arc<Mutex<TupleStore<Stamp>>>,
    registration: Mutex<Registration>,
    executor: Arc<TaskExecutor>,
    task_size: usize,
    disposed: AtomicBool,
}

impl TimestampIndex {
    pub fn new(file: Arc<PageFile>, executor: Arc<TaskExecutor>, task_size: usize) -> Self {
        let task_size = task_size.max(1);
        Self {
            store: Arc::new(Mutex::new(TupleStore::new(file))),
            registration: Mutex::new(Registration {
                last: None,
                next_id: 0,
                pending: Vec::with_capacity(task_size),
            }),
            executor,
            task_size,
            disposed: AtomicBool::new(false),
        }
    }

    /// Record the timestamp of the next event and return its id
    pub fn register(&self, timestamp: Timestamp) -> StorageResult<EventId> {
        self.check_live()?;

        let mut reg = self.registration.lock();
        if let Some(last) = reg.last {
            if timestamp < last {
                return Err(StorageError::OutOfOrder { key: timestamp, last });
            }
        }

        let id = reg.next_id;
        reg.next_id += 1;
        reg.last = Some(timestamp);
        reg.pending.push(Stamp { timestamp });

        if reg.pending.len() >= self.task_size {
            let batch = std::mem::replace(&mut reg.pending, Vec::with_capacity(self.task_size));
            self.submit(batch)?;
        }
        Ok(id)
    }

    /// Submit pending stamps
    pub fn flush_tasks(&self) -> StorageResult<()> {
        self.check_live()?;

        let mut reg = self.registration.lock();
        if reg.pending.is_empty() {
            return Ok(());
        }
        let batch = std::mem::replace(&mut reg.pending, Vec::with_capacity(self.task_size));
        self.submit(batch)
    }

    fn submit(&self, batch: Vec<Stamp>) -> StorageResult<()> {
        let store = Arc::clone(&self.store);
        self.executor.submit(
            TIMESTAMP_GROUP,
            Box::new(move || {
                let mut store = store.lock();
                for stamp in batch {
                    store.append(stamp)?;
                }
                Ok(())
            }),
        )
    }

    /// Number of ids handed out so far
    pub fn registered(&self) -> u64 {
        self.registration.lock().next_id
    }

    /// Number of timestamps applied and visible to readers
    pub fn len(&self) -> u64 {
        self.store.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last_timestamp(&self) -> Option<Timestamp> {
        self.registration.lock().last
    }

    pub fn snapshot(&self) -> StoreSnapshot<Stamp> {
        self.store.lock().snapshot()
    }

    /// Event id of the first event at or after, or the last at or before, `timestamp`
    pub fn position_of(&self, timestamp: Timestamp, tie_break: TieBreak) -> StorageResult<Option<EventId>> {
        let snapshot = self.snapshot();
        match tie_break {
            TieBreak::AtOrAfter => {
                let position = snapshot.lower_bound(timestamp)?;
                Ok((position < snapshot.len()).then_some(position))
            }
            TieBreak::AtOrBefore => {
                let position = snapshot.upper_bound(timestamp)?;
                Ok(position.checked_sub(1))
            }
        }
    }

    /// First event id whose timestamp is >= `timestamp`, or the event count
    pub fn lower_bound(&self, timestamp: Timestamp) -> StorageResult<EventId> {
        self.snapshot().lower_bound(timestamp)
    }

    /// Event ids whose timestamps fall in `[t1, t2)`
    pub fn event_range(&self, t1: Timestamp, t2: Timestamp) -> StorageResult<Range<EventId>> {
        let snapshot = self.snapshot();
        let start = snapshot.lower_bound(t1)?;
        let end = if t2 <= t1 { start } else { snapshot.lower_bound(t2)? };
        Ok(start..end)
    }

    pub fn timestamp_of(&self, event_id: EventId) -> StorageResult<Option<Timestamp>> {
        Ok(self.snapshot().get(event_id)?.map(|s| s.timestamp))
    }

    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.registration.lock().pending.clear();
        tracing::debug!("Disposed timestamp index");
    }

    fn check_live(&self) -> StorageResult<()> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(StorageError::Disposed("timestamps".to_string()));
        }
        Ok(())
    }
}
