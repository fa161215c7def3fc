//! Buffer pool manager.

use crate::frame::{BufferFrame, FrameId};
use crate::hash_table::ExtendibleHashTable;
use crate::replacer::{LruKReplacer, Replacer};
use crate::store::InMemoryPageStore;
use basalt_common::page::PageId;
use basalt_common::{BasaltError, Result, StorageConfig};
use log::debug;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

/// Configuration for the buffer pool.
#[derive(Debug, Clone)]
pub struct BufferPoolConfig {
    /// Number of frames in the pool.
    pub num_frames: usize,
    /// History depth K for the LRU-K replacer.
    pub replacer_k: usize,
    /// Bucket capacity of the page table.
    pub bucket_size: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            num_frames: 1024,
            replacer_k: 2,
            bucket_size: 32,
        }
    }
}

impl From<&StorageConfig> for BufferPoolConfig {
    fn from(config: &StorageConfig) -> Self {
        Self {
            num_frames: config.buffer_pool_frames,
            replacer_k: config.replacer_k,
            bucket_size: config.hash_bucket_size,
        }
    }
}

/// Buffer pool manager.
///
/// Manages a fixed-size pool of page frames with:
/// - Page ID to frame ID mapping (extendible hash table)
/// - Free frame list for new pages
/// - LRU-K replacement for eviction
/// - Pin counting for concurrent access
///
/// Every page handed out is pinned; callers must match each `new_page` /
/// `fetch_page` with exactly one `unpin_page`, passing `dirty = true` iff
/// the page was mutated.
pub struct BufferPoolManager {
    /// Configuration.
    config: BufferPoolConfig,
    /// Array of buffer frames.
    frames: Vec<BufferFrame>,
    /// Page ID to frame ID mapping for resident pages.
    page_table: ExtendibleHashTable<PageId, FrameId>,
    /// List of free frame IDs.
    free_list: Mutex<Vec<FrameId>>,
    /// Page replacement policy.
    replacer: LruKReplacer,
    /// Backing store for page images (disk stand-in).
    store: Mutex<InMemoryPageStore>,
    /// Next page ID to allocate.
    next_page_id: AtomicU32,
}

impl BufferPoolManager {
    /// Creates a new buffer pool.
    pub fn new(config: BufferPoolConfig) -> Self {
        let num_frames = config.num_frames;

        let frames: Vec<_> = (0..num_frames)
            .map(|i| BufferFrame::new(FrameId(i as u32)))
            .collect();

        // All frames start in the free list.
        let free_list: Vec<_> = (0..num_frames).map(|i| FrameId(i as u32)).collect();

        Self {
            replacer: LruKReplacer::new(num_frames, config.replacer_k),
            page_table: ExtendibleHashTable::new(config.bucket_size),
            config,
            frames,
            free_list: Mutex::new(free_list),
            store: Mutex::new(InMemoryPageStore::new()),
            next_page_id: AtomicU32::new(0),
        }
    }

    /// Returns the number of frames in the pool.
    pub fn num_frames(&self) -> usize {
        self.config.num_frames
    }

    /// Returns the number of free frames.
    pub fn free_count(&self) -> usize {
        self.free_list.lock().len()
    }

    /// Checks if a page is resident in the buffer pool.
    pub fn contains(&self, page_id: PageId) -> bool {
        self.page_table.find(&page_id).is_some()
    }

    /// Acquires a frame for a page: free list first, then eviction.
    ///
    /// Dirty victims are written back to the store before the frame is
    /// reused.
    fn allocate_frame(&self) -> Result<FrameId> {
        if let Some(frame_id) = self.free_list.lock().pop() {
            return Ok(frame_id);
        }

        let victim_id = self.replacer.evict().ok_or(BasaltError::PoolExhausted)?;
        let frame = &self.frames[victim_id.0 as usize];

        if let Some(old_page_id) = frame.page_id() {
            if frame.is_dirty() {
                let data = frame.read_data();
                self.store.lock().write(old_page_id, &data);
                drop(data);
                debug!("wrote back dirty victim {old_page_id} from {victim_id}");
            }
            self.page_table.remove(&old_page_id);
        }
        frame.reset();
        Ok(victim_id)
    }

    /// Registers a frame as holding `page_id`, pinned and non-evictable.
    fn install_page(&self, frame_id: FrameId, page_id: PageId) -> Result<&BufferFrame> {
        let frame = &self.frames[frame_id.0 as usize];
        frame.set_page_id(Some(page_id));
        frame.pin();
        self.replacer.record_access(frame_id)?;
        self.replacer.set_evictable(frame_id, false)?;
        self.page_table.insert(page_id, frame_id);
        Ok(frame)
    }

    /// Allocates a new page with a fresh page ID.
    ///
    /// The page starts zeroed and pinned. Fails with `PoolExhausted` when
    /// every frame is pinned.
    pub fn new_page(&self) -> Result<(PageId, &BufferFrame)> {
        let frame_id = self.allocate_frame()?;
        let page_id = PageId(self.next_page_id.fetch_add(1, Ordering::SeqCst));
        self.store.lock().allocate(page_id);

        let frame = self.install_page(frame_id, page_id)?;
        Ok((page_id, frame))
    }

    /// Fetches a page, loading it from the store if not resident.
    ///
    /// The returned frame is pinned.
    pub fn fetch_page(&self, page_id: PageId) -> Result<&BufferFrame> {
        if let Some(frame_id) = self.page_table.find(&page_id) {
            let frame = &self.frames[frame_id.0 as usize];
            frame.pin();
            self.replacer.record_access(frame_id)?;
            self.replacer.set_evictable(frame_id, false)?;
            return Ok(frame);
        }

        if !self.store.lock().contains(page_id) {
            return Err(BasaltError::PageNotFound(page_id));
        }

        let frame_id = self.allocate_frame()?;
        let frame = &self.frames[frame_id.0 as usize];
        {
            let store = self.store.lock();
            let mut data = frame.write_data();
            if !store.read(page_id, &mut data) {
                drop(data);
                drop(store);
                self.free_list.lock().push(frame_id);
                return Err(BasaltError::PageNotFound(page_id));
            }
        }
        self.install_page(frame_id, page_id)
    }

    /// Unpins a page, marking it dirty if it was mutated.
    ///
    /// At pin count zero the frame becomes evictable. Returns false if the
    /// page is not resident or was not pinned.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let frame_id = match self.page_table.find(&page_id) {
            Some(frame_id) => frame_id,
            None => return false,
        };
        let frame = &self.frames[frame_id.0 as usize];

        if is_dirty {
            frame.set_dirty(true);
        }
        if frame.pin_count() == 0 {
            return false;
        }
        if frame.unpin() == 0 {
            let _ = self.replacer.set_evictable(frame_id, true);
        }
        true
    }

    /// Deletes a page from the pool and the backing store.
    ///
    /// Returns false if the page is pinned.
    pub fn delete_page(&self, page_id: PageId) -> bool {
        if let Some(frame_id) = self.page_table.find(&page_id) {
            let frame = &self.frames[frame_id.0 as usize];
            if frame.is_pinned() {
                return false;
            }

            self.page_table.remove(&page_id);
            if self.replacer.remove(frame_id).is_err() {
                // The frame got pinned under us; restore the mapping.
                self.page_table.insert(page_id, frame_id);
                return false;
            }
            frame.reset();
            self.free_list.lock().push(frame_id);
        }
        self.store.lock().deallocate(page_id);
        true
    }

    /// Flushes a page to the store regardless of pin state.
    ///
    /// Returns true if the page was resident and dirty.
    pub fn flush_page(&self, page_id: PageId) -> bool {
        if let Some(frame_id) = self.page_table.find(&page_id) {
            let frame = &self.frames[frame_id.0 as usize];
            if frame.is_dirty() {
                let data = frame.read_data();
                self.store.lock().write(page_id, &data);
                frame.set_dirty(false);
                return true;
            }
        }
        false
    }

    /// Flushes all dirty resident pages to the store.
    ///
    /// Returns the number of pages flushed.
    pub fn flush_all(&self) -> usize {
        let mut flushed = 0;
        for frame in &self.frames {
            if let Some(page_id) = frame.page_id() {
                if frame.is_dirty() {
                    let data = frame.read_data();
                    self.store.lock().write(page_id, &data);
                    frame.set_dirty(false);
                    flushed += 1;
                }
            }
        }
        flushed
    }

    /// Returns statistics about the buffer pool.
    pub fn stats(&self) -> BufferPoolStats {
        let mut used_frames = 0;
        let mut pinned_frames = 0;
        let mut dirty_frames = 0;

        for frame in &self.frames {
            if frame.page_id().is_some() {
                used_frames += 1;
                if frame.is_pinned() {
                    pinned_frames += 1;
                }
                if frame.is_dirty() {
                    dirty_frames += 1;
                }
            }
        }

        BufferPoolStats {
            total_frames: self.config.num_frames,
            free_frames: self.free_count(),
            used_frames,
            pinned_frames,
            dirty_frames,
        }
    }
}

/// Statistics about the buffer pool.
#[derive(Debug, Clone)]
pub struct BufferPoolStats {
    /// Total number of frames.
    pub total_frames: usize,
    /// Number of free frames.
    pub free_frames: usize,
    /// Number of frames with pages.
    pub used_frames: usize,
    /// Number of pinned frames.
    pub pinned_frames: usize,
    /// Number of dirty frames.
    pub dirty_frames: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_pool(num_frames: usize) -> BufferPoolManager {
        BufferPoolManager::new(BufferPoolConfig {
            num_frames,
            replacer_k: 2,
            bucket_size: 4,
        })
    }

    #[test]
    fn test_buffer_pool_new() {
        let pool = create_test_pool(10);

        assert_eq!(pool.num_frames(), 10);
        assert_eq!(pool.free_count(), 10);
    }

    #[test]
    fn test_config_from_storage_config() {
        let storage = StorageConfig::default();
        let config = BufferPoolConfig::from(&storage);
        assert_eq!(config.num_frames, storage.buffer_pool_frames);
        assert_eq!(config.replacer_k, storage.replacer_k);
        assert_eq!(config.bucket_size, storage.hash_bucket_size);
    }

    #[test]
    fn test_new_page() {
        let pool = create_test_pool(10);

        let (page_id, frame) = pool.new_page().unwrap();

        assert_eq!(page_id, PageId(0));
        assert_eq!(frame.page_id(), Some(page_id));
        assert!(frame.is_pinned());
        assert_eq!(pool.free_count(), 9);
        assert!(pool.contains(page_id));
    }

    #[test]
    fn test_new_page_ids_are_fresh() {
        let pool = create_test_pool(10);

        let (id0, _) = pool.new_page().unwrap();
        let (id1, _) = pool.new_page().unwrap();
        let (id2, _) = pool.new_page().unwrap();

        assert_eq!(id0, PageId(0));
        assert_eq!(id1, PageId(1));
        assert_eq!(id2, PageId(2));
    }

    #[test]
    fn test_fetch_resident_page() {
        let pool = create_test_pool(10);
        let (page_id, _) = pool.new_page().unwrap();
        pool.unpin_page(page_id, false);

        let frame = pool.fetch_page(page_id).unwrap();
        assert_eq!(frame.page_id(), Some(page_id));
        assert!(frame.is_pinned());
    }

    #[test]
    fn test_fetch_unknown_page() {
        let pool = create_test_pool(10);
        let result = pool.fetch_page(PageId(99));
        assert!(matches!(result, Err(BasaltError::PageNotFound(_))));
    }

    #[test]
    fn test_unpin() {
        let pool = create_test_pool(10);
        let (page_id, frame) = pool.new_page().unwrap();
        assert!(frame.is_pinned());

        assert!(pool.unpin_page(page_id, false));
        assert!(!frame.is_pinned());

        // A second unpin on an unpinned page reports false.
        assert!(!pool.unpin_page(page_id, false));
    }

    #[test]
    fn test_dirty_tracking() {
        let pool = create_test_pool(10);
        let (page_id, _) = pool.new_page().unwrap();
        pool.unpin_page(page_id, true);

        let frame = pool.fetch_page(page_id).unwrap();
        assert!(frame.is_dirty());
        pool.unpin_page(page_id, false);
        // Dirty flag survives a clean unpin.
        assert!(frame.is_dirty());
    }

    #[test]
    fn test_eviction_and_reload() {
        let pool = create_test_pool(2);

        // Fill the pool with two dirty pages.
        let (id0, frame0) = pool.new_page().unwrap();
        frame0.write_data()[0] = 0xA0;
        pool.unpin_page(id0, true);

        let (id1, frame1) = pool.new_page().unwrap();
        frame1.write_data()[0] = 0xA1;
        pool.unpin_page(id1, true);

        // Two more pages evict both, writing them back to the store.
        let (id2, _) = pool.new_page().unwrap();
        pool.unpin_page(id2, false);
        let (id3, _) = pool.new_page().unwrap();
        pool.unpin_page(id3, false);

        assert!(!pool.contains(id0));
        assert!(!pool.contains(id1));

        // Reloading restores the written data.
        let frame = pool.fetch_page(id0).unwrap();
        assert_eq!(frame.read_data()[0], 0xA0);
        pool.unpin_page(id0, false);

        let frame = pool.fetch_page(id1).unwrap();
        assert_eq!(frame.read_data()[0], 0xA1);
        pool.unpin_page(id1, false);
    }

    #[test]
    fn test_eviction_prefers_cold_page() {
        let pool = create_test_pool(2);

        let (id0, _) = pool.new_page().unwrap();
        pool.unpin_page(id0, false);
        let (id1, _) = pool.new_page().unwrap();
        pool.unpin_page(id1, false);

        // Touch page 0 repeatedly so it matures; page 1 stays young.
        for _ in 0..3 {
            pool.fetch_page(id0).unwrap();
            pool.unpin_page(id0, false);
        }

        let (id2, _) = pool.new_page().unwrap();
        pool.unpin_page(id2, false);

        assert!(pool.contains(id0));
        assert!(!pool.contains(id1));
    }

    #[test]
    fn test_pool_exhausted_when_all_pinned() {
        let pool = create_test_pool(2);

        pool.new_page().unwrap();
        pool.new_page().unwrap();

        let result = pool.new_page();
        assert!(matches!(result, Err(BasaltError::PoolExhausted)));
    }

    #[test]
    fn test_delete_page() {
        let pool = create_test_pool(10);
        let (page_id, _) = pool.new_page().unwrap();
        pool.unpin_page(page_id, false);

        assert!(pool.contains(page_id));
        assert!(pool.delete_page(page_id));
        assert!(!pool.contains(page_id));
        assert_eq!(pool.free_count(), 10);

        // The page is gone from the store as well.
        assert!(matches!(
            pool.fetch_page(page_id),
            Err(BasaltError::PageNotFound(_))
        ));
    }

    #[test]
    fn test_delete_pinned_page() {
        let pool = create_test_pool(10);
        let (page_id, _) = pool.new_page().unwrap();

        assert!(!pool.delete_page(page_id));
        assert!(pool.contains(page_id));
    }

    #[test]
    fn test_flush_page() {
        let pool = create_test_pool(10);
        let (page_id, frame) = pool.new_page().unwrap();
        frame.write_data()[7] = 0x77;
        pool.unpin_page(page_id, true);

        assert!(pool.flush_page(page_id));
        assert!(!frame.is_dirty());
        // Flushing a clean page reports false.
        assert!(!pool.flush_page(page_id));
    }

    #[test]
    fn test_flush_all() {
        let pool = create_test_pool(10);

        for _ in 0..5 {
            let (page_id, _) = pool.new_page().unwrap();
            pool.unpin_page(page_id, true);
        }

        assert_eq!(pool.flush_all(), 5);
        assert_eq!(pool.flush_all(), 0);
    }

    #[test]
    fn test_stats() {
        let pool = create_test_pool(10);

        let mut ids = Vec::new();
        for i in 0..5 {
            let (page_id, _) = pool.new_page().unwrap();
            ids.push(page_id);
            if i % 2 == 0 {
                pool.unpin_page(page_id, true); // Dirty, unpinned
            }
            // Odd pages remain pinned
        }

        let stats = pool.stats();
        assert_eq!(stats.total_frames, 10);
        assert_eq!(stats.free_frames, 5);
        assert_eq!(stats.used_frames, 5);
        assert_eq!(stats.pinned_frames, 2);
        assert_eq!(stats.dirty_frames, 3);
    }

    #[test]
    fn test_pin_balance_restored() {
        let pool = create_test_pool(4);

        let (page_id, _) = pool.new_page().unwrap();
        pool.unpin_page(page_id, false);
        let baseline = pool.stats().pinned_frames;

        pool.fetch_page(page_id).unwrap();
        pool.unpin_page(page_id, false);

        assert_eq!(pool.stats().pinned_frames, baseline);
    }

    #[test]
    fn test_fetch_survives_many_evictions() {
        let pool = create_test_pool(3);

        // Write distinct bytes to many pages, forcing constant eviction.
        let mut ids = Vec::new();
        for i in 0..20u8 {
            let (page_id, frame) = pool.new_page().unwrap();
            frame.write_data()[0] = i;
            pool.unpin_page(page_id, true);
            ids.push(page_id);
        }

        for (i, &page_id) in ids.iter().enumerate() {
            let frame = pool.fetch_page(page_id).unwrap();
            assert_eq!(frame.read_data()[0], i as u8);
            pool.unpin_page(page_id, false);
        }
    }
}
