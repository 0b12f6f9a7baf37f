//! Indexes - owns every index of one trace
//!
//! Provides a unified interface to:
//! - the timestamp index (event id ↔ timestamp)
//! - one index set per dimension (type, thread, depth, ...)
//! - split index sets for objects and array indexes
//! - the per-behavior event counters
//!
//! # Write path
//!
//! ```text
//! event at t=1500 on thread 3, target object 42
//!
//! 1. register_timestamp(1500)          → event id 17
//! 2. index_thread(3, 17)               → thread set, batch
//! 3. index_object(42, 17, TARGET)      → object_0 [even bits of 42]
//!                                        object_1 [odd bits of 42]
//! 4. flush_tasks()                     → every batch applied
//! ```
//!
//! All sets share one page file, one residency manager and one worker pool.

use crate::index::residency::ResidencyManager;
use crate::index::set::{IndexSet, PlainIndexSet, RoleIndexSet};
use crate::index::split::split_key;
use crate::index::time_index::TimestampIndex;
use crate::index::{Dimension, IndexStats};
use crate::storage::{
    EventId, PageFile, PlainTuple, Role, RoleTuple, StorageError, StorageResult, StoreSnapshot, TaskExecutor,
    TieBreak, Timestamp, Tuple,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Name of the page file inside the data directory
pub const INDEX_FILE_NAME: &str = "indexes.tdx";

/// Behavior ids below this are counted in a flat array, the rest in a map
const BEHAVIOR_DENSE_LIMIT: usize = 1 << 20;

/// Configuration for the index aggregate
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Page size of the index file in bytes
    pub page_size: usize,
    /// Memory budget for resident indexes, in bytes
    pub page_buffer_size: usize,
    /// Decoded pages kept in the page cache
    pub page_cache_pages: usize,
    /// Tuples per write batch
    pub task_size: usize,
    /// Accesses before an index counts as used
    pub use_threshold: u32,
    pub worker_threads: usize,
    /// Initial size of the per-behavior counter array
    pub behavior_count: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            page_size: 4096,
            page_buffer_size: 64 * 1024 * 1024,
            page_cache_pages: 1024,
            task_size: 1024,
            use_threshold: 10,
            worker_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            behavior_count: 200_000,
        }
    }
}

/// Per-behavior event counters
struct BehaviorCounters {
    dense: Vec<u32>,
    sparse: HashMap<u32, u32>,
}

impl BehaviorCounters {
    fn new(initial: usize) -> Self {
        Self {
            dense: vec![0; initial.min(BEHAVIOR_DENSE_LIMIT)],
            sparse: HashMap::new(),
        }
    }

    fn slot_mut(&mut self, behavior_id: u32) -> &mut u32 {
        let slot = behavior_id as usize;
        if slot >= BEHAVIOR_DENSE_LIMIT {
            return self.sparse.entry(behavior_id).or_insert(0);
        }
        if self.dense.len() <= slot {
            let len = (slot + 1).next_power_of_two().min(BEHAVIOR_DENSE_LIMIT);
            self.dense.resize(len, 0);
        }
        &mut self.dense[slot]
    }

    fn get(&self, behavior_id: u32) -> u32 {
        match self.dense.get(behavior_id as usize) {
            Some(&count) => count,
            None => self.sparse.get(&behavior_id).copied().unwrap_or(0),
        }
    }
}

pub struct Indexes {
    config: IndexConfig,
    path: PathBuf,
    file: Arc<PageFile>,
    manager: Arc<ResidencyManager>,
    executor: Arc<TaskExecutor>,
    timestamps: TimestampIndex,

    type_set: Arc<PlainIndexSet>,
    thread_set: Arc<PlainIndexSet>,
    depth_set: Arc<PlainIndexSet>,
    location_set: Arc<PlainIndexSet>,
    advice_source_set: Arc<PlainIndexSet>,
    advice_cflow_set: Arc<PlainIndexSet>,
    role_set: Arc<PlainIndexSet>,
    behavior_set: Arc<RoleIndexSet>,
    field_set: Arc<RoleIndexSet>,
    variable_set: Arc<RoleIndexSet>,
    array_index_sets: [Arc<PlainIndexSet>; 2],
    object_sets: [Arc<RoleIndexSet>; 2],

    max_object_id: AtomicU64,
    events_at_behavior: Mutex<BehaviorCounters>,
    disposed: AtomicBool,
}

impl Indexes {
    /// Create a fresh index file in `data_dir`
    pub fn open(data_dir: &Path, config: IndexConfig) -> StorageResult<Self> {
        std::fs::create_dir_all(data_dir)?;
        let path = data_dir.join(INDEX_FILE_NAME);

        let file = Arc::new(PageFile::create(&path, config.page_size, config.page_cache_pages)?);
        let manager = Arc::new(ResidencyManager::with_budget(
            config.page_buffer_size,
            config.page_size,
            config.use_threshold,
        ));
        let executor = Arc::new(TaskExecutor::new(config.worker_threads)?);
        let timestamps = TimestampIndex::new(Arc::clone(&file), Arc::clone(&executor), config.task_size);

        let plain = |name: &str| -> Arc<PlainIndexSet> {
            IndexSet::new(
                name,
                Arc::clone(&file),
                Arc::clone(&manager),
                Arc::clone(&executor),
                config.task_size,
            )
        };
        let role = |name: &str| -> Arc<RoleIndexSet> {
            IndexSet::new(
                name,
                Arc::clone(&file),
                Arc::clone(&manager),
                Arc::clone(&executor),
                config.task_size,
            )
        };

        let indexes = Self {
            type_set: plain("type"),
            thread_set: plain("thread"),
            depth_set: plain("depth"),
            location_set: plain("location"),
            advice_source_set: plain("advice_source"),
            advice_cflow_set: plain("advice_cflow"),
            role_set: plain("role"),
            behavior_set: role("behavior"),
            field_set: role("field"),
            variable_set: role("variable"),
            array_index_sets: [plain("array_index_0"), plain("array_index_1")],
            object_sets: [role("object_0"), role("object_1")],
            max_object_id: AtomicU64::new(0),
            events_at_behavior: Mutex::new(BehaviorCounters::new(config.behavior_count)),
            disposed: AtomicBool::new(false),
            timestamps,
            executor,
            manager,
            file,
            path,
            config,
        };

        tracing::info!(
            "Opened indexes at {:?} (capacity {} resident indexes)",
            indexes.path,
            indexes.manager.capacity()
        );
        Ok(indexes)
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // ==================== Timestamp Methods ====================

    /// Record the timestamp of the next event, returning its event id
    pub fn register_timestamp(&self, timestamp: Timestamp) -> StorageResult<EventId> {
        self.timestamps.register(timestamp)
    }

    pub fn event_id_at(&self, timestamp: Timestamp, tie_break: TieBreak) -> StorageResult<Option<EventId>> {
        self.timestamps.position_of(timestamp, tie_break)
    }

    /// First event id at or after `timestamp`, or the event count
    pub fn event_id_lower_bound(&self, timestamp: Timestamp) -> StorageResult<EventId> {
        self.timestamps.lower_bound(timestamp)
    }

    pub fn timestamp_of(&self, event_id: EventId) -> StorageResult<Option<Timestamp>> {
        self.timestamps.timestamp_of(event_id)
    }

    pub fn timestamps(&self) -> &TimestampIndex {
        &self.timestamps
    }

    // ==================== Plain Dimensions ====================

    pub fn index_type(&self, type_id: u32, event_id: EventId) -> StorageResult<()> {
        self.type_set.add(type_id, event_id)
    }

    pub fn get_type_index(&self, type_id: u32) -> StorageResult<StoreSnapshot<PlainTuple>> {
        self.type_set.get_index(type_id)
    }

    pub fn index_thread(&self, thread_id: u32, event_id: EventId) -> StorageResult<()> {
        self.thread_set.add(thread_id, event_id)
    }

    pub fn get_thread_index(&self, thread_id: u32) -> StorageResult<StoreSnapshot<PlainTuple>> {
        self.thread_set.get_index(thread_id)
    }

    pub fn index_depth(&self, depth: u32, event_id: EventId) -> StorageResult<()> {
        self.depth_set.add(depth, event_id)
    }

    pub fn get_depth_index(&self, depth: u32) -> StorageResult<StoreSnapshot<PlainTuple>> {
        self.depth_set.get_index(depth)
    }

    pub fn index_location(&self, location: u32, event_id: EventId) -> StorageResult<()> {
        self.location_set.add(location, event_id)
    }

    pub fn get_location_index(&self, location: u32) -> StorageResult<StoreSnapshot<PlainTuple>> {
        self.location_set.get_index(location)
    }

    pub fn index_advice_source(&self, advice_id: u32, event_id: EventId) -> StorageResult<()> {
        self.advice_source_set.add(advice_id, event_id)
    }

    pub fn get_advice_source_index(&self, advice_id: u32) -> StorageResult<StoreSnapshot<PlainTuple>> {
        self.advice_source_set.get_index(advice_id)
    }

    pub fn index_advice_cflow(&self, advice_id: u32, event_id: EventId) -> StorageResult<()> {
        self.advice_cflow_set.add(advice_id, event_id)
    }

    pub fn get_advice_cflow_index(&self, advice_id: u32) -> StorageResult<StoreSnapshot<PlainTuple>> {
        self.advice_cflow_set.get_index(advice_id)
    }

    /// Index an event under the role it carries
    pub fn index_role(&self, role: Role, event_id: EventId) -> StorageResult<()> {
        self.role_set.add(role_value_id(role), event_id)
    }

    pub fn get_role_index(&self, role: Role) -> StorageResult<StoreSnapshot<PlainTuple>> {
        self.role_set.get_index(role_value_id(role))
    }

    // ==================== Role-Tagged Dimensions ====================

    pub fn index_behavior(&self, behavior_id: u32, event_id: EventId, role: Role) -> StorageResult<()> {
        self.behavior_set.add(behavior_id, event_id, role)
    }

    pub fn get_behavior_index(&self, behavior_id: u32) -> StorageResult<StoreSnapshot<RoleTuple>> {
        self.behavior_set.get_index(behavior_id)
    }

    pub fn index_field(&self, field_id: u32, event_id: EventId, role: Role) -> StorageResult<()> {
        self.field_set.add(field_id, event_id, role)
    }

    pub fn get_field_index(&self, field_id: u32) -> StorageResult<StoreSnapshot<RoleTuple>> {
        self.field_set.get_index(field_id)
    }

    pub fn index_variable(&self, variable_id: u32, event_id: EventId, role: Role) -> StorageResult<()> {
        self.variable_set.add(variable_id, event_id, role)
    }

    pub fn get_variable_index(&self, variable_id: u32) -> StorageResult<StoreSnapshot<RoleTuple>> {
        self.variable_set.get_index(variable_id)
    }

    // ==================== Split Dimensions ====================

    pub fn index_array_index(&self, index: u64, event_id: EventId) -> StorageResult<()> {
        let (even, odd) = split_key(index)?;
        self.array_index_sets[0].add(even, event_id)?;
        self.array_index_sets[1].add(odd, event_id)
    }

    /// Partial index `part` (0 = even bits, 1 = odd bits) for `partial_key`
    pub fn get_array_index_index(&self, part: usize, partial_key: u32) -> StorageResult<StoreSnapshot<PlainTuple>> {
        split_part(&self.array_index_sets, part)?.get_index(partial_key)
    }

    /// Both partial indexes of an array index
    pub fn array_index_parts(&self, index: u64) -> StorageResult<[StoreSnapshot<PlainTuple>; 2]> {
        let (even, odd) = split_key(index)?;
        Ok([
            self.array_index_sets[0].get_index(even)?,
            self.array_index_sets[1].get_index(odd)?,
        ])
    }

    pub fn index_object(&self, object_id: u64, event_id: EventId, role: Role) -> StorageResult<()> {
        let (even, odd) = split_key(object_id)?;
        self.max_object_id.fetch_max(object_id, Ordering::Relaxed);
        self.object_sets[0].add(even, event_id, role)?;
        self.object_sets[1].add(odd, event_id, role)
    }

    pub fn get_object_index(&self, part: usize, partial_key: u32) -> StorageResult<StoreSnapshot<RoleTuple>> {
        split_part(&self.object_sets, part)?.get_index(partial_key)
    }

    /// Both partial indexes of an object; their role-matching conjunction is the object's index
    pub fn object_parts(&self, object_id: u64) -> StorageResult<[StoreSnapshot<RoleTuple>; 2]> {
        let (even, odd) = split_key(object_id)?;
        Ok([
            self.object_sets[0].get_index(even)?,
            self.object_sets[1].get_index(odd)?,
        ])
    }

    pub fn max_object_id(&self) -> u64 {
        self.max_object_id.load(Ordering::Relaxed)
    }

    // ==================== Dimension Lookup ====================

    /// Set backing a plain, unsplit dimension
    pub fn plain_set(&self, dimension: Dimension) -> Option<&Arc<PlainIndexSet>> {
        match dimension {
            Dimension::Type => Some(&self.type_set),
            Dimension::Thread => Some(&self.thread_set),
            Dimension::Depth => Some(&self.depth_set),
            Dimension::Location => Some(&self.location_set),
            Dimension::AdviceSource => Some(&self.advice_source_set),
            Dimension::AdviceCflow => Some(&self.advice_cflow_set),
            Dimension::Role => Some(&self.role_set),
            _ => None,
        }
    }

    /// Set backing a role-tagged, unsplit dimension
    pub fn role_set(&self, dimension: Dimension) -> Option<&Arc<RoleIndexSet>> {
        match dimension {
            Dimension::Behavior => Some(&self.behavior_set),
            Dimension::Field => Some(&self.field_set),
            Dimension::Variable => Some(&self.variable_set),
            _ => None,
        }
    }

    // ==================== Behavior Counters ====================

    /// Count one event at `behavior_id`
    pub fn event_at_behavior(&self, behavior_id: u32) -> StorageResult<()> {
        let mut counters = self.events_at_behavior.lock();
        let counter = counters.slot_mut(behavior_id);
        if *counter == u32::MAX {
            return Err(StorageError::CounterSaturated(behavior_id));
        }
        *counter += 1;
        Ok(())
    }

    pub fn events_at_behavior(&self, behavior_id: u32) -> u64 {
        self.events_at_behavior.lock().get(behavior_id) as u64
    }

    // ==================== Range Counts ====================

    /// Per-slot tuple counts of one index over `[t1, t2)`, without walking it
    ///
    /// Slot `i` covers `[t1 + ceil(i * (t2 - t1) / slots), t1 + ceil((i + 1) * (t2 - t1) / slots))`.
    pub fn fast_counts<T: Tuple>(
        &self,
        index: &StoreSnapshot<T>,
        t1: Timestamp,
        t2: Timestamp,
        slots: usize,
    ) -> StorageResult<Vec<u64>> {
        let mut counts = vec![0u64; slots];
        if slots == 0 || t2 <= t1 {
            return Ok(counts);
        }

        let timestamps = self.timestamps.snapshot();
        let boundary = |i: usize| -> u64 {
            let span = (t2 - t1) as u128;
            let offset = (i as u128 * span).div_ceil(slots as u128);
            t1 + offset as u64
        };

        let mut k1 = timestamps.lower_bound(t1)?;
        for (i, count) in counts.iter_mut().enumerate() {
            let k2 = timestamps.lower_bound(boundary(i + 1))?;
            if k1 != k2 {
                *count = index.count_in_range(k1, k2)?;
            }
            k1 = k2;
        }
        Ok(counts)
    }

    // ==================== Lifecycle Methods ====================

    /// Submit every pending batch and wait until all of them are applied
    pub fn flush_tasks(&self) -> StorageResult<()> {
        self.check_live()?;

        self.timestamps.flush_tasks()?;
        for set in self.plain_sets() {
            set.flush_tasks()?;
        }
        for set in self.role_sets() {
            set.flush_tasks()?;
        }
        self.executor.flush()
    }

    /// Tear everything down; resident indexes are dropped, not written
    pub fn dispose(&self) -> StorageResult<()> {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.timestamps.dispose();
        for set in self.plain_sets() {
            set.dispose();
        }
        for set in self.role_sets() {
            set.dispose();
        }
        self.manager.dispose();
        self.executor.shutdown();

        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tracing::info!("Disposed indexes at {:?}", self.path);
        Ok(())
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    // ==================== Stats Methods ====================

    pub fn stats(&self) -> IndexStats {
        let mut sets: Vec<_> = self.plain_sets().iter().map(|s| s.stats()).collect();
        sets.extend(self.role_sets().iter().map(|s| s.stats()));
        IndexStats {
            sets,
            events: self.timestamps.registered(),
            max_object_id: self.max_object_id(),
            residency: self.manager.stats(),
            pages: self.file.stats(),
            executor: self.executor.stats(),
        }
    }

    fn plain_sets(&self) -> [&Arc<PlainIndexSet>; 9] {
        [
            &self.type_set,
            &self.thread_set,
            &self.depth_set,
            &self.location_set,
            &self.advice_source_set,
            &self.advice_cflow_set,
            &self.role_set,
            &self.array_index_sets[0],
            &self.array_index_sets[1],
        ]
    }

    fn role_sets(&self) -> [&Arc<RoleIndexSet>; 5] {
        [
            &self.behavior_set,
            &self.field_set,
            &self.variable_set,
            &self.object_sets[0],
            &self.object_sets[1],
        ]
    }

    fn check_live(&self) -> StorageResult<()> {
        if self.is_disposed() {
            return Err(StorageError::Disposed("indexes".to_string()));
        }
        Ok(())
    }
}

impl Drop for Indexes {
    fn drop(&mut self) {
        if let Err(e) = self.dispose() {
            tracing::warn!("Failed to dispose indexes: {}", e);
        }
    }
}

/// Value id of `role` in the role dimension
fn role_value_id(role: Role) -> u32 {
    (role.0 as i16 + 128) as u32
}

fn split_part<T: Tuple>(sets: &[Arc<IndexSet<T>>; 2], part: usize) -> StorageResult<&Arc<IndexSet<T>>> {
    sets.get(part)
        .ok_or_else(|| StorageError::Config(format!("split index has no part {}", part)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::BidiCursor;
    use tempfile::tempdir;

    fn test_config() -> IndexConfig {
        IndexConfig {
            page_size: 512,
            page_buffer_size: 512 * 16,
            page_cache_pages: 32,
            task_size: 8,
            use_threshold: 2,
            worker_threads: 2,
            behavior_count: 4,
        }
    }

    fn create_test_indexes() -> (Indexes, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let indexes = Indexes::open(dir.path(), test_config()).unwrap();
        (indexes, dir)
    }

    fn keys<T: Tuple>(snapshot: &StoreSnapshot<T>) -> Vec<u64> {
        let mut cursor = snapshot.cursor_first();
        let mut out = Vec::new();
        while let Some(t) = cursor.next().unwrap() {
            out.push(t.key());
        }
        out
    }

    #[test]
    fn test_open_creates_file() {
        let (indexes, dir) = create_test_indexes();
        assert!(dir.path().join(INDEX_FILE_NAME).exists());
        assert_eq!(indexes.stats().sets.len(), 14);
    }

    #[test]
    fn test_index_and_read_dimensions() {
        let (indexes, _dir) = create_test_indexes();
        for ts in 0..50u64 {
            let id = indexes.register_timestamp(ts * 10).unwrap();
            indexes.index_thread((id % 2) as u32, id).unwrap();
            indexes.index_depth((id % 5) as u32, id).unwrap();
            indexes.index_field(7, id, Role::VALUE).unwrap();
        }
        indexes.flush_tasks().unwrap();

        let even: Vec<u64> = (0..50).filter(|e| e % 2 == 0).collect();
        assert_eq!(keys(&indexes.get_thread_index(0).unwrap()), even);
        assert_eq!(keys(&indexes.get_depth_index(4).unwrap()), vec![4, 9, 14, 19, 24, 29, 34, 39, 44, 49]);
        assert_eq!(indexes.get_field_index(7).unwrap().len(), 50);
        assert_eq!(indexes.event_id_at(95, TieBreak::AtOrAfter).unwrap(), Some(10));
        assert_eq!(indexes.timestamp_of(10).unwrap(), Some(100));
    }

    #[test]
    fn test_object_split_parts() {
        let (indexes, _dir) = create_test_indexes();
        indexes.index_object(42, 0, Role::TARGET).unwrap();
        indexes.index_object(43, 1, Role::VALUE).unwrap();
        indexes.index_object(42, 2, Role::RESULT).unwrap();
        indexes.flush_tasks().unwrap();

        let [even, odd] = indexes.object_parts(42).unwrap();
        assert_eq!(keys(&even), vec![0, 2]);
        // 42 and 43 share their odd bits.
        assert_eq!(keys(&odd), vec![0, 1, 2]);
        assert_eq!(indexes.max_object_id(), 43);

        let (e, o) = split_key(42).unwrap();
        assert_eq!(keys(&indexes.get_object_index(0, e).unwrap()), vec![0, 2]);
        assert_eq!(keys(&indexes.get_object_index(1, o).unwrap()), vec![0, 1, 2]);
        assert!(indexes.get_object_index(2, 0).is_err());
    }

    #[test]
    fn test_object_overflow() {
        let (indexes, _dir) = create_test_indexes();
        assert!(matches!(
            indexes.index_object(1 << 40, 0, Role::TARGET),
            Err(StorageError::IndexOverflow(_))
        ));
        assert!(indexes.index_array_index(u64::MAX, 0).is_err());
    }

    #[test]
    fn test_role_dimension() {
        let (indexes, _dir) = create_test_indexes();
        indexes.index_role(Role::EXCEPTION, 0).unwrap();
        indexes.index_role(Role::TARGET, 1).unwrap();
        indexes.index_role(Role::EXCEPTION, 2).unwrap();
        indexes.flush_tasks().unwrap();
        assert_eq!(keys(&indexes.get_role_index(Role::EXCEPTION).unwrap()), vec![0, 2]);
    }

    #[test]
    fn test_behavior_counters() {
        let (indexes, _dir) = create_test_indexes();
        indexes.event_at_behavior(1).unwrap();
        indexes.event_at_behavior(1).unwrap();
        // Grows past the initial size.
        indexes.event_at_behavior(100).unwrap();
        assert_eq!(indexes.events_at_behavior(1), 2);
        assert_eq!(indexes.events_at_behavior(100), 1);
        assert_eq!(indexes.events_at_behavior(5000), 0);

        indexes.events_at_behavior.lock().dense[2] = u32::MAX;
        assert!(matches!(
            indexes.event_at_behavior(2),
            Err(StorageError::CounterSaturated(2))
        ));
    }

    #[test]
    fn test_large_behavior_ids_stay_sparse() {
        let (indexes, _dir) = create_test_indexes();
        let high = u32::MAX - 3;
        indexes.event_at_behavior(high).unwrap();
        indexes.event_at_behavior(high).unwrap();
        assert_eq!(indexes.events_at_behavior(high), 2);
        assert_eq!(indexes.events_at_behavior(high - 1), 0);

        let counters = indexes.events_at_behavior.lock();
        assert_eq!(counters.dense.len(), 4);
        assert_eq!(counters.sparse.len(), 1);
    }

    #[test]
    fn test_fast_counts() {
        let (indexes, _dir) = create_test_indexes();
        for ts in [5u64, 15, 25, 35] {
            let id = indexes.register_timestamp(ts).unwrap();
            indexes.index_type(1, id).unwrap();
        }
        indexes.flush_tasks().unwrap();

        let index = indexes.get_type_index(1).unwrap();
        assert_eq!(indexes.fast_counts(&index, 0, 40, 4).unwrap(), vec![1, 1, 1, 1]);
        assert_eq!(indexes.fast_counts(&index, 0, 40, 2).unwrap(), vec![2, 2]);
        assert_eq!(indexes.fast_counts(&index, 10, 30, 1).unwrap(), vec![2]);
        assert_eq!(indexes.fast_counts(&index, 40, 0, 3).unwrap(), vec![0, 0, 0]);
    }

    #[test]
    fn test_many_values_survive_eviction() {
        let (indexes, _dir) = create_test_indexes();
        // Capacity is 16 resident indexes.
        for id in 0..2000u64 {
            indexes.register_timestamp(id).unwrap();
            indexes.index_location((id % 40) as u32, id).unwrap();
        }
        indexes.flush_tasks().unwrap();

        let stats = indexes.stats();
        assert!(stats.discarded() > 0);
        assert!(stats.residency.resident <= 16);

        for location in 0..40u64 {
            let expected: Vec<u64> = (0..2000).filter(|e| e % 40 == location).collect();
            assert_eq!(keys(&indexes.get_location_index(location as u32).unwrap()), expected);
        }
    }

    #[test]
    fn test_dispose() {
        let (indexes, dir) = create_test_indexes();
        indexes.index_thread(1, 0).unwrap();
        indexes.dispose().unwrap();

        assert!(!dir.path().join(INDEX_FILE_NAME).exists());
        assert!(matches!(indexes.index_thread(1, 1), Err(StorageError::Disposed(_))));
        assert!(indexes.flush_tasks().is_err());
        indexes.dispose().unwrap();
    }
}
