//! Attribute index sets
//!
//! An `IndexSet` owns every postings list of one dimension, one per
//! attribute value. Each value is in exactly one of three states:
//!
//! ```text
//!   (absent) ──first add / get──► Resident ──evict──► Discarded
//!                                     ▲                   │
//!                                     └──────reload───────┘
//! ```
//!
//! Discarded stores keep a 64-byte descriptor in a per-set slot directory
//! made of pages of the shared page file, addressed by value id.
//!
//! Writes are buffered in a `BatchBuilder` and submitted to the worker pool
//! with the set id as group, so batches of one set are applied in order.

use crate::index::residency::{Evictable, OwnerKey, ResidencyManager, SetId};
use crate::storage::{
    EventId, PageFile, PageId, PlainTuple, Role, RoleTuple, StorageError, StorageResult, StoreDescriptor,
    StoreSnapshot, TaskExecutor, Tuple, TupleStore, DESCRIPTOR_SIZE,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Index set over plain event ids
pub type PlainIndexSet = IndexSet<PlainTuple>;

/// Index set over role-tagged event ids
pub type RoleIndexSet = IndexSet<RoleTuple>;

/// Mutable accumulation of pending writes
pub struct BatchBuilder<T: Tuple> {
    entries: Vec<(u32, T)>,
    capacity: usize,
}

impl<T: Tuple> BatchBuilder<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, value_id: u32, tuple: T) {
        self.entries.push((value_id, tuple));
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Freeze the pending writes
    pub fn seal(self) -> Batch<T> {
        Batch {
            entries: self.entries.into_boxed_slice(),
        }
    }
}

/// Immutable run of writes, applied as one unit
pub struct Batch<T: Tuple> {
    entries: Box<[(u32, T)]>,
}

impl<T: Tuple> Batch<T> {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(u32, T)> {
        self.entries.iter()
    }
}

enum Entry<T: Tuple> {
    Resident { store: TupleStore<T>, uses: u32 },
    Discarded,
}

/// What an access did to the value's residency
enum Access {
    /// Created or reloaded; must be admitted
    Admitted,
    /// Use threshold crossed; must be reported
    Used,
    Quiet,
}

struct SetState<T: Tuple> {
    entries: HashMap<u32, Entry<T>>,
    /// Slot directory pages, keyed by page number
    slot_pages: HashMap<usize, PageId>,
    created: u64,
    discarded: u64,
    reloaded: u64,
}

/// Per-set statistics
#[derive(Debug, Clone, Default)]
pub struct SetStats {
    pub name: String,
    pub values: usize,
    pub resident: usize,
    pub created: u64,
    pub discarded: u64,
    pub reloaded: u64,
}

pub struct IndexSet<T: Tuple> {
    id: SetId,
    name: String,
    file: Arc<PageFile>,
    manager: Arc<ResidencyManager>,
    executor: Arc<TaskExecutor>,
    task_size: usize,
    slots_per_page: usize,
    this: Weak<Self>,
    state: Mutex<SetState<T>>,
    builder: Mutex<BatchBuilder<T>>,
    disposed: AtomicBool,
}

impl<T: Tuple> IndexSet<T> {
    /// Create a set and register it with the residency manager
    pub fn new(
        name: &str,
        file: Arc<PageFile>,
        manager: Arc<ResidencyManager>,
        executor: Arc<TaskExecutor>,
        task_size: usize,
    ) -> Arc<Self> {
        let slots_per_page = (file.payload_capacity() / DESCRIPTOR_SIZE).max(1);
        Arc::new_cyclic(|this: &Weak<Self>| {
            let owner: Weak<dyn Evictable> = this.clone();
            let id = manager.register_owner(owner);
            tracing::debug!("Created index set '{}' with id {}", name, id);
            Self {
                id,
                name: name.to_string(),
                file,
                manager,
                executor,
                task_size: task_size.max(1),
                slots_per_page,
                this: this.clone(),
                state: Mutex::new(SetState {
                    entries: HashMap::new(),
                    slot_pages: HashMap::new(),
                    created: 0,
                    discarded: 0,
                    reloaded: 0,
                }),
                builder: Mutex::new(BatchBuilder::new(task_size)),
                disposed: AtomicBool::new(false),
            }
        })
    }

    pub fn id(&self) -> SetId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue one tuple for `value_id`; submits the batch once it is full
    pub fn push(&self, value_id: u32, tuple: T) -> StorageResult<()> {
        self.check_live()?;

        let mut builder = self.builder.lock();
        builder.push(value_id, tuple);
        if builder.is_full() {
            let batch = std::mem::replace(&mut *builder, BatchBuilder::new(self.task_size)).seal();
            // Submitted under the builder lock so batches keep their order.
            self.submit(batch)?;
        }
        Ok(())
    }

    /// Submit the pending batch, if any
    pub fn flush_tasks(&self) -> StorageResult<()> {
        self.check_live()?;

        let mut builder = self.builder.lock();
        if builder.is_empty() {
            return Ok(());
        }
        let batch = std::mem::replace(&mut *builder, BatchBuilder::new(self.task_size)).seal();
        self.submit(batch)
    }

    fn submit(&self, batch: Batch<T>) -> StorageResult<()> {
        let set = self
            .this
            .upgrade()
            .ok_or_else(|| StorageError::Disposed(self.name.clone()))?;
        self.executor
            .submit(self.id as u64, Box::new(move || set.apply(&batch)))
    }

    /// Append a sealed batch to the per-value stores
    pub fn apply(&self, batch: &Batch<T>) -> StorageResult<()> {
        if self.disposed.load(Ordering::Acquire) {
            tracing::trace!("Dropping batch of {} for disposed set '{}'", batch.len(), self.name);
            return Ok(());
        }

        let mut admitted = Vec::new();
        let mut used = Vec::new();
        {
            let mut state = self.state.lock();
            for &(value_id, tuple) in batch.iter() {
                match self.make_resident(&mut state, value_id)? {
                    Access::Admitted => admitted.push(value_id),
                    Access::Used => used.push(value_id),
                    Access::Quiet => {}
                }
                if let Some(Entry::Resident { store, .. }) = state.entries.get_mut(&value_id) {
                    store.append(tuple)?;
                }
            }
        }

        for value_id in admitted {
            self.manager.admit(OwnerKey::new(self.id, value_id))?;
        }
        for value_id in used {
            self.manager.touch(OwnerKey::new(self.id, value_id));
        }
        Ok(())
    }

    /// Snapshot of the postings list of `value_id`, reloading it if discarded
    pub fn get_index(&self, value_id: u32) -> StorageResult<StoreSnapshot<T>> {
        self.check_live()?;

        let (access, snapshot) = {
            let mut state = self.state.lock();
            let access = self.make_resident(&mut state, value_id)?;
            match state.entries.get(&value_id) {
                Some(Entry::Resident { store, .. }) => (access, store.snapshot()),
                _ => {
                    return Err(StorageError::NotResident {
                        set: self.name.clone(),
                        value_id,
                    })
                }
            }
        };

        let key = OwnerKey::new(self.id, value_id);
        match access {
            Access::Admitted => self.manager.admit(key)?,
            Access::Used => self.manager.touch(key),
            Access::Quiet => {}
        }
        Ok(snapshot)
    }

    /// Write `value_id` to its slot now and forget it in the residency manager
    pub fn discard_index(&self, value_id: u32) -> StorageResult<()> {
        self.check_live()?;

        let mut state = self.state.lock();
        if !self.discard_locked(&mut state, value_id)? {
            return Err(StorageError::NotResident {
                set: self.name.clone(),
                value_id,
            });
        }
        // Still under the state lock, so a concurrent reload cannot be forgotten.
        self.manager.forget(OwnerKey::new(self.id, value_id));
        Ok(())
    }

    /// Whether `value_id` currently has an in-memory store
    pub fn is_resident(&self, value_id: u32) -> bool {
        matches!(
            self.state.lock().entries.get(&value_id),
            Some(Entry::Resident { .. })
        )
    }

    /// Drop every store without persisting it
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        *self.builder.lock() = BatchBuilder::new(self.task_size);
        let dropped = {
            let mut state = self.state.lock();
            let n = state.entries.len();
            state.entries.clear();
            state.slot_pages.clear();
            n
        };
        self.manager.unregister_owner(self.id);
        tracing::debug!("Disposed index set '{}' ({} values)", self.name, dropped);
    }

    pub fn stats(&self) -> SetStats {
        let state = self.state.lock();
        SetStats {
            name: self.name.clone(),
            values: state.entries.len(),
            resident: state
                .entries
                .values()
                .filter(|e| matches!(e, Entry::Resident { .. }))
                .count(),
            created: state.created,
            discarded: state.discarded,
            reloaded: state.reloaded,
        }
    }

    fn check_live(&self) -> StorageResult<()> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(StorageError::Disposed(self.name.clone()));
        }
        Ok(())
    }

    fn make_resident(&self, state: &mut SetState<T>, value_id: u32) -> StorageResult<Access> {
        match state.entries.get_mut(&value_id) {
            Some(Entry::Resident { uses, .. }) => {
                *uses += 1;
                if *uses >= self.manager.use_threshold() {
                    *uses = 0;
                    return Ok(Access::Used);
                }
                Ok(Access::Quiet)
            }
            Some(Entry::Discarded) => {
                let descriptor = self.read_slot(state, value_id)?;
                let store = TupleStore::deserialize_from(Arc::clone(&self.file), &descriptor)?;
                tracing::debug!(
                    "Reloaded index {} of set '{}' ({} tuples)",
                    value_id,
                    self.name,
                    store.len()
                );
                state.entries.insert(value_id, Entry::Resident { store, uses: 0 });
                state.reloaded += 1;
                Ok(Access::Admitted)
            }
            None => {
                let store = TupleStore::new(Arc::clone(&self.file));
                state.entries.insert(value_id, Entry::Resident { store, uses: 0 });
                state.created += 1;
                Ok(Access::Admitted)
            }
        }
    }

    fn slot_location(&self, value_id: u32) -> (usize, usize) {
        let page = value_id as usize / self.slots_per_page;
        let offset = (value_id as usize % self.slots_per_page) * DESCRIPTOR_SIZE;
        (page, offset)
    }

    fn read_slot(&self, state: &SetState<T>, value_id: u32) -> StorageResult<StoreDescriptor> {
        let (page, offset) = self.slot_location(value_id);
        let page_id = state.slot_pages.get(&page).copied().ok_or_else(|| {
            StorageError::Corruption(format!("no slot page for index {} of set '{}'", value_id, self.name))
        })?;
        let payload = self.file.read(page_id)?;
        let bytes = payload.get(offset..offset + DESCRIPTOR_SIZE).ok_or_else(|| {
            StorageError::Corruption(format!("slot page {} is truncated", page_id))
        })?;
        StoreDescriptor::from_bytes(bytes)
    }

    fn write_slot(&self, state: &mut SetState<T>, value_id: u32, descriptor: &StoreDescriptor) -> StorageResult<()> {
        let (page, offset) = self.slot_location(value_id);
        let (page_id, mut payload) = match state.slot_pages.get(&page) {
            Some(&page_id) => (page_id, self.file.read(page_id)?.as_ref().clone()),
            None => {
                let page_id = self.file.allocate();
                state.slot_pages.insert(page, page_id);
                (page_id, vec![0u8; self.slots_per_page * DESCRIPTOR_SIZE])
            }
        };
        payload[offset..offset + DESCRIPTOR_SIZE].copy_from_slice(&descriptor.to_bytes());
        self.file.write(page_id, &payload)
    }

    /// Move a resident store to its slot; `false` if it was not resident
    fn discard_locked(&self, state: &mut SetState<T>, value_id: u32) -> StorageResult<bool> {
        let descriptor = match state.entries.get(&value_id) {
            Some(Entry::Resident { store, .. }) => store.serialize_to()?,
            _ => return Ok(false),
        };

        // The store is only released once its descriptor is on disk.
        self.write_slot(state, value_id, &descriptor)?;
        state.entries.insert(value_id, Entry::Discarded);
        state.discarded += 1;
        tracing::debug!(
            "Discarded index {} of set '{}' ({} tuples)",
            value_id,
            self.name,
            descriptor.len
        );
        Ok(true)
    }
}

impl<T: Tuple> Evictable for IndexSet<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn evict(&self, value_id: u32) -> StorageResult<bool> {
        let mut state = self.state.lock();
        self.discard_locked(&mut state, value_id)
    }
}

impl IndexSet<PlainTuple> {
    pub fn add(&self, value_id: u32, event_id: EventId) -> StorageResult<()> {
        self.push(value_id, PlainTuple::new(event_id))
    }
}

impl IndexSet<RoleTuple> {
    pub fn add(&self, value_id: u32, event_id: EventId, role: Role) -> StorageResult<()> {
        self.push(value_id, RoleTuple::new(event_id, role))
    }
}
