//! Residency Manager - bounds the number of resident postings lists
//!
//! Every index set registers itself as an owner and gets a `SetId`. The
//! manager only ever sees `(set id, value id)` keys; when it needs room it
//! calls back into the owner through the registry to write the index to its
//! discard slot.
//!
//! # Use throttling
//!
//! Index sets report a use only every `use_threshold` accesses. Reported uses
//! are queued and applied to the LRU order in small batches, skipping keys
//! that left the cache in the meantime.
//!
//! ```text
//! touch(k) → pending [k1, k2, k]  ──full──►  commit: promote each key still cached
//! admit(k) → lru.push(k) → over capacity? → pop LRU victims → owner.evict(value)
//! ```
//!
//! An owner may call into the manager while holding its own state lock; the
//! manager never calls an owner while holding the LRU lock.

use crate::storage::{StorageError, StorageResult};
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Weak;

/// Identifier handed out to each registered index set
pub type SetId = u32;

/// Most uses buffered before they are applied
const MAX_PENDING_USES: usize = 64;

/// Cache key: which set, which value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerKey {
    pub set_id: SetId,
    pub value_id: u32,
}

impl OwnerKey {
    pub fn new(set_id: SetId, value_id: u32) -> Self {
        Self { set_id, value_id }
    }
}

/// Callback surface an index set exposes to the manager
pub trait Evictable: Send + Sync {
    fn name(&self) -> &str;

    /// Write the value's store to its discard slot and drop it
    ///
    /// Returns `Ok(false)` when the value is not resident any more; the
    /// check and the eviction happen under the owner's own lock.
    fn evict(&self, value_id: u32) -> StorageResult<bool>;
}

/// Residency statistics
#[derive(Debug, Clone, Default)]
pub struct ResidencyStats {
    pub capacity: usize,
    pub resident: usize,
    pub evictions: u64,
    pub stale_skips: u64,
    pub promotions: u64,
}

pub struct ResidencyManager {
    capacity: usize,
    use_threshold: u32,
    pending_limit: usize,
    lru: Mutex<LruCache<OwnerKey, ()>>,
    pending: Mutex<Vec<OwnerKey>>,
    owners: RwLock<HashMap<SetId, Weak<dyn Evictable>>>,
    next_set_id: AtomicU32,
    disposed: AtomicBool,
    evictions: AtomicU64,
    stale_skips: AtomicU64,
    promotions: AtomicU64,
}

impl ResidencyManager {
    /// Create a manager holding at most `capacity` resident indexes
    pub fn new(capacity: usize, use_threshold: u32) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            use_threshold: use_threshold.max(1),
            pending_limit: (capacity / 8).clamp(1, MAX_PENDING_USES),
            lru: Mutex::new(LruCache::unbounded()),
            pending: Mutex::new(Vec::new()),
            owners: RwLock::new(HashMap::new()),
            next_set_id: AtomicU32::new(0),
            disposed: AtomicBool::new(false),
            evictions: AtomicU64::new(0),
            stale_skips: AtomicU64::new(0),
            promotions: AtomicU64::new(0),
        }
    }

    /// Capacity derived from a page buffer budget
    pub fn with_budget(page_buffer_size: usize, page_size: usize, use_threshold: u32) -> Self {
        Self::new(page_buffer_size / page_size.max(1), use_threshold)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Accesses an index set counts before reporting one use
    pub fn use_threshold(&self) -> u32 {
        self.use_threshold
    }

    /// Register an index set and assign its id
    pub fn register_owner(&self, owner: Weak<dyn Evictable>) -> SetId {
        let set_id = self.next_set_id.fetch_add(1, Ordering::Relaxed);
        self.owners.write().insert(set_id, owner);
        set_id
    }

    /// Forget an index set and every cache entry it owns, without evicting
    pub fn unregister_owner(&self, set_id: SetId) {
        self.owners.write().remove(&set_id);

        let mut lru = self.lru.lock();
        let keys: Vec<OwnerKey> = lru
            .iter()
            .map(|(k, _)| *k)
            .filter(|k| k.set_id == set_id)
            .collect();
        for key in keys {
            lru.pop(&key);
        }
    }

    /// Track a freshly created or reloaded index, evicting others if needed
    pub fn admit(&self, key: OwnerKey) -> StorageResult<()> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(StorageError::Disposed("residency manager".to_string()));
        }

        let victims = {
            let mut lru = self.lru.lock();
            lru.push(key, ());
            let mut victims = Vec::new();
            while lru.len() > self.capacity {
                match lru.pop_lru() {
                    Some((victim, _)) => victims.push(victim),
                    None => break,
                }
            }
            victims
        };

        for victim in victims {
            self.evict(victim)?;
        }
        Ok(())
    }

    /// Report one (already throttled) use of a resident index
    pub fn touch(&self, key: OwnerKey) {
        let full = {
            let mut pending = self.pending.lock();
            if pending.last() != Some(&key) {
                pending.push(key);
            }
            pending.len() >= self.pending_limit
        };
        if full {
            self.commit();
        }
    }

    /// Apply buffered uses to the LRU order
    pub fn commit(&self) {
        let uses: Vec<OwnerKey> = std::mem::take(&mut *self.pending.lock());
        if uses.is_empty() {
            return;
        }

        let mut lru = self.lru.lock();
        for key in uses {
            // Entries evicted or forgotten since the use was recorded are skipped.
            if lru.contains(&key) {
                lru.promote(&key);
                self.promotions.fetch_add(1, Ordering::Relaxed);
                tracing::trace!("Promoted index {:?}", key);
            }
        }
    }

    /// Drop a key that its owner discarded on its own
    pub fn forget(&self, key: OwnerKey) {
        self.lru.lock().pop(&key);
    }

    pub fn is_tracked(&self, key: OwnerKey) -> bool {
        self.lru.lock().contains(&key)
    }

    /// Drop every entry without persisting anything
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
        self.pending.lock().clear();
        let dropped = {
            let mut lru = self.lru.lock();
            let n = lru.len();
            lru.clear();
            n
        };
        self.owners.write().clear();
        tracing::debug!("Residency manager disposed, dropped {} entries", dropped);
    }

    pub fn stats(&self) -> ResidencyStats {
        ResidencyStats {
            capacity: self.capacity,
            resident: self.lru.lock().len(),
            evictions: self.evictions.load(Ordering::Relaxed),
            stale_skips: self.stale_skips.load(Ordering::Relaxed),
            promotions: self.promotions.load(Ordering::Relaxed),
        }
    }

    fn evict(&self, key: OwnerKey) -> StorageResult<()> {
        let owner = self.owners.read().get(&key.set_id).and_then(|w| w.upgrade());
        let evicted = match owner {
            Some(owner) => {
                let evicted = owner.evict(key.value_id)?;
                if evicted {
                    tracing::trace!("Evicted index {} of set '{}'", key.value_id, owner.name());
                }
                evicted
            }
            None => false,
        };

        if evicted {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stale_skips.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Skipping stale residency entry {:?}", key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    /// Records evictions instead of writing anything.
    struct FakeOwner {
        resident: Mutex<HashSet<u32>>,
        evicted: Mutex<Vec<u32>>,
    }

    impl FakeOwner {
        fn new(values: &[u32]) -> Arc<Self> {
            Arc::new(Self {
                resident: Mutex::new(values.iter().copied().collect()),
                evicted: Mutex::new(Vec::new()),
            })
        }
    }

    impl Evictable for FakeOwner {
        fn name(&self) -> &str {
            "fake"
        }

        fn evict(&self, value_id: u32) -> StorageResult<bool> {
            if !self.resident.lock().remove(&value_id) {
                return Ok(false);
            }
            self.evicted.lock().push(value_id);
            Ok(true)
        }
    }

    fn register(manager: &ResidencyManager, owner: &Arc<FakeOwner>) -> SetId {
        let weak: Weak<dyn Evictable> = Arc::downgrade(owner) as Weak<dyn Evictable>;
        manager.register_owner(weak)
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let manager = ResidencyManager::new(3, 1);
        let owner = FakeOwner::new(&[0, 1, 2, 3, 4]);
        let id = register(&manager, &owner);

        for v in 0..3 {
            manager.admit(OwnerKey::new(id, v)).unwrap();
        }
        manager.touch(OwnerKey::new(id, 0));
        manager.commit();

        manager.admit(OwnerKey::new(id, 3)).unwrap();
        manager.admit(OwnerKey::new(id, 4)).unwrap();

        assert_eq!(*owner.evicted.lock(), vec![1, 2]);
        assert!(manager.is_tracked(OwnerKey::new(id, 0)));
        assert_eq!(manager.stats().resident, 3);
        assert_eq!(manager.stats().evictions, 2);
    }

    #[test]
    fn test_stale_entries_are_skipped() {
        let manager = ResidencyManager::new(1, 1);
        let owner = FakeOwner::new(&[1]);
        let id = register(&manager, &owner);

        // Value 0 is not resident at its owner any more.
        manager.admit(OwnerKey::new(id, 0)).unwrap();
        manager.admit(OwnerKey::new(id, 1)).unwrap();

        assert!(owner.evicted.lock().is_empty());
        assert_eq!(manager.stats().stale_skips, 1);
    }

    #[test]
    fn test_entry_discarded_by_owner_is_stale() {
        let manager = ResidencyManager::new(1, 1);
        let owner = FakeOwner::new(&[0, 1]);
        let id = register(&manager, &owner);
        manager.admit(OwnerKey::new(id, 0)).unwrap();

        // The owner dropped value 0 on its own before the manager got to it.
        owner.resident.lock().remove(&0);
        manager.admit(OwnerKey::new(id, 1)).unwrap();

        assert!(owner.evicted.lock().is_empty());
        assert_eq!(manager.stats().stale_skips, 1);
        assert_eq!(manager.stats().evictions, 0);
    }

    #[test]
    fn test_promote_skips_forgotten_keys() {
        let manager = ResidencyManager::new(64, 1);
        let owner = FakeOwner::new(&[0, 1]);
        let id = register(&manager, &owner);
        manager.admit(OwnerKey::new(id, 0)).unwrap();
        manager.admit(OwnerKey::new(id, 1)).unwrap();

        manager.touch(OwnerKey::new(id, 0));
        manager.touch(OwnerKey::new(id, 1));
        manager.forget(OwnerKey::new(id, 1));
        manager.commit();

        assert_eq!(manager.stats().promotions, 1);
        assert!(!manager.is_tracked(OwnerKey::new(id, 1)));
    }

    #[test]
    fn test_dropped_owner_is_stale() {
        let manager = ResidencyManager::new(1, 1);
        let owner = FakeOwner::new(&[0, 1]);
        let id = register(&manager, &owner);
        manager.admit(OwnerKey::new(id, 0)).unwrap();
        drop(owner);

        let other = FakeOwner::new(&[5]);
        let other_id = register(&manager, &other);
        manager.admit(OwnerKey::new(other_id, 5)).unwrap();
        assert_eq!(manager.stats().stale_skips, 1);
    }

    #[test]
    fn test_touch_suppresses_consecutive_duplicates() {
        let manager = ResidencyManager::new(64, 1);
        let key = OwnerKey::new(0, 1);
        for _ in 0..10 {
            manager.touch(key);
        }
        assert_eq!(manager.pending.lock().len(), 1);
    }

    #[test]
    fn test_unregister_drops_entries() {
        let manager = ResidencyManager::new(8, 1);
        let a = FakeOwner::new(&[0, 1]);
        let b = FakeOwner::new(&[0]);
        let a_id = register(&manager, &a);
        let b_id = register(&manager, &b);
        manager.admit(OwnerKey::new(a_id, 0)).unwrap();
        manager.admit(OwnerKey::new(a_id, 1)).unwrap();
        manager.admit(OwnerKey::new(b_id, 0)).unwrap();

        manager.unregister_owner(a_id);
        assert_eq!(manager.stats().resident, 1);
        assert!(a.evicted.lock().is_empty());
    }

    #[test]
    fn test_dispose_does_not_evict() {
        let manager = ResidencyManager::new(2, 1);
        let owner = FakeOwner::new(&[0, 1]);
        let id = register(&manager, &owner);
        manager.admit(OwnerKey::new(id, 0)).unwrap();
        manager.admit(OwnerKey::new(id, 1)).unwrap();

        manager.dispose();
        assert!(owner.evicted.lock().is_empty());
        assert_eq!(manager.stats().resident, 0);
        assert!(manager.admit(OwnerKey::new(id, 2)).is_err());
    }

    #[test]
    fn test_capacity_from_budget() {
        let manager = ResidencyManager::with_budget(64 * 1024, 4096, 10);
        assert_eq!(manager.capacity(), 16);
        assert_eq!(ResidencyManager::with_budget(10, 4096, 10).capacity(), 1);
    }
}
