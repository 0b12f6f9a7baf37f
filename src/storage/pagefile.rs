//! Shared page file
//!
//! All ordered tuple stores of an engine live in one file of fixed-size
//! pages. Pages are written through immediately; reads go through an LRU
//! cache of page payloads.
//!
//! Layout:
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ PAGE 0: HEADER                          │
//! │   magic: [u8; 4] = "TDEX"               │
//! │   version: u16                          │
//! │   page_size: u32                        │
//! │   checksum: u32                         │
//! ├─────────────────────────────────────────┤
//! │ PAGE n (n >= 1)                         │
//! │   checksum: u32  (over len + payload)   │
//! │   len: u32                              │
//! │   payload: [u8; len]                    │
//! │   zero padding up to page_size          │
//! └─────────────────────────────────────────┘
//! ```

use crate::storage::error::{StorageError, StorageResult};
use lru::LruCache;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Page identifier; `NO_PAGE` (the header page) doubles as "none"
pub type PageId = u32;

pub const NO_PAGE: PageId = 0;

/// Bytes taken by the per-page checksum and length
pub const PAGE_HEADER_SIZE: usize = 8;

/// Smallest page size the codec and descriptors can work with
pub const MIN_PAGE_SIZE: usize = 256;

const FILE_MAGIC: [u8; 4] = *b"TDEX";
const FILE_VERSION: u16 = 1;

struct Allocation {
    /// Pages handed out so far, including the header page
    page_count: u32,
    free: Vec<PageId>,
}

/// Page file statistics
#[derive(Debug, Clone, Default)]
pub struct PageFileStats {
    pub page_count: u32,
    pub free_pages: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub writes: u64,
}

/// A file of fixed-size pages shared by every index of an engine
pub struct PageFile {
    path: PathBuf,
    page_size: usize,
    file: Mutex<File>,
    cache: Mutex<LruCache<PageId, Arc<Vec<u8>>>>,
    allocation: Mutex<Allocation>,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    writes: AtomicU64,
}

impl PageFile {
    /// Create (or truncate) a page file
    pub fn create(path: &Path, page_size: usize, cache_pages: usize) -> StorageResult<Self> {
        if page_size < MIN_PAGE_SIZE || page_size > u32::MAX as usize {
            return Err(StorageError::Config(format!(
                "page size must be between {} and {} bytes, got {}",
                MIN_PAGE_SIZE,
                u32::MAX,
                page_size
            )));
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        let mut header = vec![0u8; page_size];
        header[0..4].copy_from_slice(&FILE_MAGIC);
        header[4..6].copy_from_slice(&FILE_VERSION.to_le_bytes());
        header[6..10].copy_from_slice(&(page_size as u32).to_le_bytes());
        let checksum = crc32fast::hash(&header[0..10]);
        header[10..14].copy_from_slice(&checksum.to_le_bytes());
        file.write_all(&header)?;

        let cache_pages = NonZeroUsize::new(cache_pages).unwrap_or(NonZeroUsize::MIN);

        tracing::debug!("Created page file {:?} (page size {})", path, page_size);

        Ok(Self {
            path: path.to_path_buf(),
            page_size,
            file: Mutex::new(file),
            cache: Mutex::new(LruCache::new(cache_pages)),
            allocation: Mutex::new(Allocation {
                page_count: 1,
                free: Vec::new(),
            }),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Bytes of payload a single page can hold
    pub fn payload_capacity(&self) -> usize {
        self.page_size - PAGE_HEADER_SIZE
    }

    /// Allocate a page, reusing freed pages first
    pub fn allocate(&self) -> PageId {
        let mut allocation = self.allocation.lock();
        if let Some(id) = allocation.free.pop() {
            return id;
        }
        let id = allocation.page_count;
        allocation.page_count += 1;
        id
    }

    /// Return a page to the freelist
    pub fn free(&self, id: PageId) {
        if id == NO_PAGE {
            return;
        }
        self.cache.lock().pop(&id);
        self.allocation.lock().free.push(id);
    }

    /// Write a page payload (write-through)
    pub fn write(&self, id: PageId, payload: &[u8]) -> StorageResult<()> {
        if id == NO_PAGE {
            return Err(StorageError::Corruption(
                "attempt to overwrite the file header".to_string(),
            ));
        }
        if payload.len() > self.payload_capacity() {
            return Err(StorageError::Serialization(format!(
                "payload of {} bytes exceeds page capacity {}",
                payload.len(),
                self.payload_capacity()
            )));
        }

        let mut buf = vec![0u8; self.page_size];
        buf[4..8].copy_from_slice(&(payload.len() as u32).to_le_bytes());
        buf[PAGE_HEADER_SIZE..PAGE_HEADER_SIZE + payload.len()].copy_from_slice(payload);
        let checksum = crc32fast::hash(&buf[4..PAGE_HEADER_SIZE + payload.len()]);
        buf[0..4].copy_from_slice(&checksum.to_le_bytes());

        {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(self.offset(id)))?;
            file.write_all(&buf)?;
        }
        self.writes.fetch_add(1, Ordering::Relaxed);

        self.cache.lock().put(id, Arc::new(payload.to_vec()));
        Ok(())
    }

    /// Read a page payload
    pub fn read(&self, id: PageId) -> StorageResult<Arc<Vec<u8>>> {
        if let Some(payload) = self.cache.lock().get(&id) {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(payload));
        }
        self.cache_misses.fetch_add(1, Ordering::Relaxed);

        let mut buf = vec![0u8; self.page_size];
        {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(self.offset(id)))?;
            file.read_exact(&mut buf)?;
        }

        let stored_checksum = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let len = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]) as usize;
        if len > self.payload_capacity() {
            return Err(StorageError::Corruption(format!(
                "page {} declares {} payload bytes",
                id, len
            )));
        }
        let computed_checksum = crc32fast::hash(&buf[4..PAGE_HEADER_SIZE + len]);
        if stored_checksum != computed_checksum {
            return Err(StorageError::Corruption(format!(
                "page {} checksum mismatch: stored={}, computed={}",
                id, stored_checksum, computed_checksum
            )));
        }

        let payload = Arc::new(buf[PAGE_HEADER_SIZE..PAGE_HEADER_SIZE + len].to_vec());
        self.cache.lock().put(id, Arc::clone(&payload));
        Ok(payload)
    }

    pub fn stats(&self) -> PageFileStats {
        let allocation = self.allocation.lock();
        PageFileStats {
            page_count: allocation.page_count,
            free_pages: allocation.free.len(),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }

    fn offset(&self, id: PageId) -> u64 {
        id as u64 * self.page_size as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_read_roundtrip() {
        let dir = tempdir().unwrap();
        let pages = PageFile::create(&dir.path().join("p.tdx"), 512, 4).unwrap();

        let a = pages.allocate();
        let b = pages.allocate();
        assert_ne!(a, NO_PAGE);
        assert_ne!(a, b);

        pages.write(a, b"hello").unwrap();
        pages.write(b, &[7u8; 504]).unwrap();

        assert_eq!(pages.read(a).unwrap().as_slice(), b"hello");
        assert_eq!(pages.read(b).unwrap().len(), 504);
    }

    #[test]
    fn test_reads_survive_cache_eviction() {
        let dir = tempdir().unwrap();
        let pages = PageFile::create(&dir.path().join("p.tdx"), 256, 1).unwrap();

        let ids: Vec<PageId> = (0..5).map(|_| pages.allocate()).collect();
        for (i, id) in ids.iter().enumerate() {
            pages.write(*id, &[i as u8; 10]).unwrap();
        }
        for (i, id) in ids.iter().enumerate() {
            assert_eq!(pages.read(*id).unwrap().as_slice(), &[i as u8; 10]);
        }
        assert!(pages.stats().cache_misses >= 4);
    }

    #[test]
    fn test_freelist_reuse() {
        let dir = tempdir().unwrap();
        let pages = PageFile::create(&dir.path().join("p.tdx"), 256, 4).unwrap();

        let a = pages.allocate();
        let _b = pages.allocate();
        pages.free(a);
        assert_eq!(pages.stats().free_pages, 1);
        assert_eq!(pages.allocate(), a);
        assert_eq!(pages.stats().page_count, 3);
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let dir = tempdir().unwrap();
        let pages = PageFile::create(&dir.path().join("p.tdx"), 256, 4).unwrap();
        let id = pages.allocate();
        assert!(pages.write(id, &[0u8; 249]).is_err());
        assert!(pages.write(NO_PAGE, b"x").is_err());
    }

    #[test]
    fn test_corruption_detected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("p.tdx");
        let pages = PageFile::create(&path, 256, 1).unwrap();
        let a = pages.allocate();
        let b = pages.allocate();
        pages.write(a, b"payload").unwrap();
        pages.write(b, b"other").unwrap();

        // Flip a payload byte of page `a` behind the cache's back.
        {
            let mut file = OpenOptions::new().write(true).open(&path).unwrap();
            file.seek(SeekFrom::Start(256 + PAGE_HEADER_SIZE as u64)).unwrap();
            file.write_all(b"X").unwrap();
        }
        let err = pages.read(a).unwrap_err();
        assert!(matches!(err, StorageError::Corruption(_)));
    }

    #[test]
    fn test_rejects_tiny_pages() {
        let dir = tempdir().unwrap();
        assert!(PageFile::create(&dir.path().join("p.tdx"), 64, 4).is_err());
    }
}
