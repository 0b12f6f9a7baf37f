//! Ordered tuple store
//!
//! A postings list of tuples kept in key order. Full pages are sealed into
//! the shared page file and never change afterwards; the unsealed tail and
//! the page directory live in memory while the store is resident.
//!
//! ```text
//! directory (memory)            page file
//! ┌──────────────────────┐      ┌───────────────┐
//! │ page 12  keys 0..411 │ ───► │ sealed page   │
//! │ page 31  keys 412..  │ ───► │ sealed page   │
//! └──────────────────────┘      └───────────────┘
//! tail (memory): [ 905, 911, 913 ]
//! ```
//!
//! Readers work on a `StoreSnapshot`, an immutable view sharing the
//! directory and tail. A snapshot stays valid after the store itself is
//! serialized and dropped, since sealed pages outlive every store.
//!
//! When serialized, the tail goes to its own page and the directory to a
//! chain of pages; a fixed-size `StoreDescriptor` points at both.

use crate::storage::codec::{decode_page, encode_page, page_capacity};
use crate::storage::cursor::BidiCursor;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::pagefile::{PageFile, PageId, NO_PAGE};
use crate::storage::types::Tuple;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Serialized size of a `StoreDescriptor`
pub const DESCRIPTOR_SIZE: usize = 64;

/// Directory entry for one sealed page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRef {
    pub page_id: PageId,
    pub first_key: u64,
    pub last_key: u64,
    pub len: u32,
    /// Position of the page's first tuple within the store
    pub start: u64,
}

impl PageRef {
    fn end(&self) -> u64 {
        self.start + self.len as u64
    }
}

/// Fixed-size record locating a serialized store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreDescriptor {
    pub len: u64,
    pub page_count: u32,
    pub dir_head: PageId,
    pub tail_page: PageId,
    pub tail_len: u32,
    pub last_key: Option<u64>,
}

impl StoreDescriptor {
    /// Serialize descriptor to bytes
    pub fn to_bytes(&self) -> [u8; DESCRIPTOR_SIZE] {
        let mut buf = [0u8; DESCRIPTOR_SIZE];

        buf[0..8].copy_from_slice(&self.len.to_le_bytes());
        buf[8..12].copy_from_slice(&self.page_count.to_le_bytes());
        buf[12..16].copy_from_slice(&self.dir_head.to_le_bytes());
        buf[16..20].copy_from_slice(&self.tail_page.to_le_bytes());
        buf[20..24].copy_from_slice(&self.tail_len.to_le_bytes());
        buf[24] = self.last_key.is_some() as u8;
        buf[25..33].copy_from_slice(&self.last_key.unwrap_or(0).to_le_bytes());
        // bytes 33-59 reserved

        let checksum = crc32fast::hash(&buf[0..60]);
        buf[60..64].copy_from_slice(&checksum.to_le_bytes());

        buf
    }

    /// Parse descriptor from bytes
    pub fn from_bytes(buf: &[u8]) -> StorageResult<Self> {
        if buf.len() < DESCRIPTOR_SIZE {
            return Err(StorageError::Corruption(format!(
                "descriptor needs {} bytes, got {}",
                DESCRIPTOR_SIZE,
                buf.len()
            )));
        }

        let stored_checksum = u32::from_le_bytes([buf[60], buf[61], buf[62], buf[63]]);
        let computed_checksum = crc32fast::hash(&buf[0..60]);
        if stored_checksum != computed_checksum {
            return Err(StorageError::Corruption(format!(
                "Descriptor checksum mismatch: stored={}, computed={}",
                stored_checksum, computed_checksum
            )));
        }

        let u32_at = |at: usize| u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
        let u64_at = |at: usize| {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&buf[at..at + 8]);
            u64::from_le_bytes(bytes)
        };

        Ok(Self {
            len: u64_at(0),
            page_count: u32_at(8),
            dir_head: u32_at(12),
            tail_page: u32_at(16),
            tail_len: u32_at(20),
            last_key: if buf[24] != 0 { Some(u64_at(25)) } else { None },
        })
    }
}

/// Mutable, in-memory side of an ordered tuple store
pub struct TupleStore<T: Tuple> {
    file: Arc<PageFile>,
    page_capacity: usize,
    pages: Arc<Vec<PageRef>>,
    tail: Arc<Vec<T>>,
    sealed_len: u64,
    last_key: Option<u64>,
}

impl<T: Tuple> TupleStore<T> {
    pub fn new(file: Arc<PageFile>) -> Self {
        let page_capacity = page_capacity::<T>(file.payload_capacity()).max(1);
        Self {
            file,
            page_capacity,
            pages: Arc::new(Vec::new()),
            tail: Arc::new(Vec::new()),
            sealed_len: 0,
            last_key: None,
        }
    }

    /// Number of tuples
    pub fn len(&self) -> u64 {
        self.sealed_len + self.tail.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last_key(&self) -> Option<u64> {
        self.last_key
    }

    /// Number of sealed pages
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Append a tuple; keys must not go backwards
    pub fn append(&mut self, tuple: T) -> StorageResult<()> {
        let key = tuple.key();
        if let Some(last) = self.last_key {
            if key < last || (key == last && !T::DUPLICATE_KEYS) {
                return Err(StorageError::OutOfOrder { key, last });
            }
        }

        Arc::make_mut(&mut self.tail).push(tuple);
        self.last_key = Some(key);

        if self.tail.len() >= self.page_capacity {
            self.seal_tail()?;
        }
        Ok(())
    }

    fn seal_tail(&mut self) -> StorageResult<()> {
        let (first, last) = match (self.tail.first(), self.tail.last()) {
            (Some(first), Some(last)) => (first.key(), last.key()),
            _ => return Ok(()),
        };

        let encoded = encode_page(&self.tail)?;
        let page_id = self.file.allocate();
        self.file.write(page_id, &encoded)?;

        let len = self.tail.len() as u32;
        Arc::make_mut(&mut self.pages).push(PageRef {
            page_id,
            first_key: first,
            last_key: last,
            len,
            start: self.sealed_len,
        });
        self.sealed_len += len as u64;
        self.tail = Arc::new(Vec::with_capacity(self.page_capacity));
        Ok(())
    }

    /// Immutable view for readers
    pub fn snapshot(&self) -> StoreSnapshot<T> {
        StoreSnapshot {
            file: Arc::clone(&self.file),
            pages: Arc::clone(&self.pages),
            tail: Arc::clone(&self.tail),
            sealed_len: self.sealed_len,
        }
    }

    /// Write the tail and directory to fresh pages
    ///
    /// The store itself is left untouched; callers drop it once the
    /// descriptor is safely recorded.
    pub fn serialize_to(&self) -> StorageResult<StoreDescriptor> {
        let tail_page = if self.tail.is_empty() {
            NO_PAGE
        } else {
            let encoded = encode_page(&self.tail)?;
            let id = self.file.allocate();
            self.file.write(id, &encoded)?;
            id
        };

        let dir_head = if self.pages.is_empty() {
            NO_PAGE
        } else {
            let bytes = bincode::serialize(self.pages.as_slice())?;
            write_chain(&self.file, &bytes)?
        };

        Ok(StoreDescriptor {
            len: self.len(),
            page_count: self.pages.len() as u32,
            dir_head,
            tail_page,
            tail_len: self.tail.len() as u32,
            last_key: self.last_key,
        })
    }

    /// Rebuild a store from its descriptor, freeing the tail and directory pages
    pub fn deserialize_from(file: Arc<PageFile>, descriptor: &StoreDescriptor) -> StorageResult<Self> {
        let pages: Vec<PageRef> = if descriptor.dir_head == NO_PAGE {
            Vec::new()
        } else {
            let bytes = read_chain(&file, descriptor.dir_head)?;
            bincode::deserialize(&bytes)?
        };
        if pages.len() != descriptor.page_count as usize {
            return Err(StorageError::Corruption(format!(
                "directory lists {} pages, descriptor says {}",
                pages.len(),
                descriptor.page_count
            )));
        }

        let tail: Vec<T> = if descriptor.tail_page == NO_PAGE {
            Vec::new()
        } else {
            let payload = file.read(descriptor.tail_page)?;
            let tuples = decode_page(&payload)?;
            file.free(descriptor.tail_page);
            tuples
        };
        if tail.len() != descriptor.tail_len as usize {
            return Err(StorageError::Corruption(format!(
                "tail holds {} tuples, descriptor says {}",
                tail.len(),
                descriptor.tail_len
            )));
        }

        let sealed_len = pages.last().map(|p| p.end()).unwrap_or(0);
        if sealed_len + tail.len() as u64 != descriptor.len {
            return Err(StorageError::Corruption(format!(
                "store holds {} tuples, descriptor says {}",
                sealed_len + tail.len() as u64,
                descriptor.len
            )));
        }

        let mut store = Self::new(file);
        store.pages = Arc::new(pages);
        store.tail = Arc::new(tail);
        store.sealed_len = sealed_len;
        store.last_key = descriptor.last_key;
        Ok(store)
    }
}

/// Write `bytes` across a chain of pages, returning the head page
fn write_chain(file: &PageFile, bytes: &[u8]) -> StorageResult<PageId> {
    let chunk_size = file.payload_capacity() - 4;
    let chunks: Vec<&[u8]> = bytes.chunks(chunk_size).collect();
    let ids: Vec<PageId> = chunks.iter().map(|_| file.allocate()).collect();

    for (i, chunk) in chunks.iter().enumerate() {
        let next = ids.get(i + 1).copied().unwrap_or(NO_PAGE);
        let mut payload = Vec::with_capacity(chunk.len() + 4);
        payload.extend_from_slice(&next.to_le_bytes());
        payload.extend_from_slice(chunk);
        file.write(ids[i], &payload)?;
    }

    Ok(ids.first().copied().unwrap_or(NO_PAGE))
}

/// Read back a chain written by `write_chain`, freeing its pages
fn read_chain(file: &PageFile, head: PageId) -> StorageResult<Vec<u8>> {
    let mut bytes = Vec::new();
    let mut current = head;
    while current != NO_PAGE {
        let payload = file.read(current)?;
        if payload.len() < 4 {
            return Err(StorageError::Corruption(format!(
                "chain page {} is truncated",
                current
            )));
        }
        bytes.extend_from_slice(&payload[4..]);
        file.free(current);
        current = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
    }
    Ok(bytes)
}

/// Immutable view of a tuple store
#[derive(Clone)]
pub struct StoreSnapshot<T: Tuple> {
    file: Arc<PageFile>,
    pages: Arc<Vec<PageRef>>,
    tail: Arc<Vec<T>>,
    sealed_len: u64,
}

impl<T: Tuple> StoreSnapshot<T> {
    pub fn len(&self) -> u64 {
        self.sealed_len + self.tail.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn load_page(&self, index: usize) -> StorageResult<Arc<Vec<T>>> {
        let page = &self.pages[index];
        let payload = self.file.read(page.page_id)?;
        let tuples: Vec<T> = decode_page(&payload)?;
        if tuples.len() != page.len as usize {
            return Err(StorageError::Corruption(format!(
                "page {} holds {} tuples, directory says {}",
                page.page_id,
                tuples.len(),
                page.len
            )));
        }
        Ok(Arc::new(tuples))
    }

    fn page_index_of(&self, position: u64) -> usize {
        self.pages.partition_point(|p| p.end() <= position)
    }

    /// Tuple at `position`, if any
    pub fn get(&self, position: u64) -> StorageResult<Option<T>> {
        if position >= self.sealed_len {
            return Ok(self.tail.get((position - self.sealed_len) as usize).copied());
        }
        let index = self.page_index_of(position);
        let page = self.load_page(index)?;
        Ok(page.get((position - self.pages[index].start) as usize).copied())
    }

    /// Number of tuples whose key is < `key`
    pub fn lower_bound(&self, key: u64) -> StorageResult<u64> {
        let index = self.pages.partition_point(|p| p.last_key < key);
        if let Some(page) = self.pages.get(index) {
            if page.first_key >= key {
                return Ok(page.start);
            }
            let tuples = self.load_page(index)?;
            return Ok(page.start + tuples.partition_point(|t| t.key() < key) as u64);
        }
        Ok(self.sealed_len + self.tail.partition_point(|t| t.key() < key) as u64)
    }

    /// Number of tuples whose key is <= `key`
    pub fn upper_bound(&self, key: u64) -> StorageResult<u64> {
        match key.checked_add(1) {
            Some(next) => self.lower_bound(next),
            None => Ok(self.len()),
        }
    }

    /// Number of tuples with `k1 <= key < k2`
    pub fn count_in_range(&self, k1: u64, k2: u64) -> StorageResult<u64> {
        if k2 <= k1 {
            return Ok(0);
        }
        Ok(self.lower_bound(k2)? - self.lower_bound(k1)?)
    }

    /// Cursor whose `next` yields the first tuple with key >= `key`
    pub fn cursor_at(&self, key: u64) -> StorageResult<StoreCursor<T>> {
        let position = self.lower_bound(key)?;
        Ok(StoreCursor {
            snapshot: self.clone(),
            position,
            page: None,
        })
    }

    pub fn cursor_first(&self) -> StoreCursor<T> {
        StoreCursor {
            snapshot: self.clone(),
            position: 0,
            page: None,
        }
    }

    pub fn cursor_last(&self) -> StoreCursor<T> {
        StoreCursor {
            snapshot: self.clone(),
            position: self.len(),
            page: None,
        }
    }
}

/// Bidirectional cursor over a snapshot
pub struct StoreCursor<T: Tuple> {
    snapshot: StoreSnapshot<T>,
    position: u64,
    /// Last decoded sealed page
    page: Option<(usize, Arc<Vec<T>>)>,
}

impl<T: Tuple> StoreCursor<T> {
    /// Position of the gap, in tuples from the start
    pub fn position(&self) -> u64 {
        self.position
    }

    fn tuple_at(&mut self, position: u64) -> StorageResult<Option<T>> {
        let snapshot = &self.snapshot;
        if position >= snapshot.sealed_len {
            return Ok(snapshot
                .tail
                .get((position - snapshot.sealed_len) as usize)
                .copied());
        }

        let index = snapshot.page_index_of(position);
        let cached = matches!(&self.page, Some((i, _)) if *i == index);
        if !cached {
            self.page = Some((index, snapshot.load_page(index)?));
        }

        let start = snapshot.pages[index].start;
        Ok(self
            .page
            .as_ref()
            .and_then(|(_, tuples)| tuples.get((position - start) as usize).copied()))
    }
}

impl<T: Tuple> BidiCursor for StoreCursor<T> {
    type Item = T;

    fn peek_next(&mut self) -> StorageResult<Option<T>> {
        self.tuple_at(self.position)
    }

    fn peek_previous(&mut self) -> StorageResult<Option<T>> {
        match self.position.checked_sub(1) {
            Some(position) => self.tuple_at(position),
            None => Ok(None),
        }
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
        let before_ok = self.peek_previous()?.map_or(true, |t| t.key() < key);
        let after_ok = self.peek_next()?.map_or(true, |t| t.key() >= key);
        if !(before_ok && after_ok) {
            self.position = self.snapshot.lower_bound(key)?;
        }
        Ok(())
    }
}
