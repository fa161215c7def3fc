//! In-memory page store backing the buffer pool.

use basalt_common::page::{PageData, PageId, PAGE_SIZE};

/// In-memory store of page images, indexed by page number.
///
/// Stands in for the disk layer: evicted dirty pages are written back here
/// and re-fetched on demand. Deallocated slots read as absent.
pub struct InMemoryPageStore {
    pages: Vec<Option<Box<PageData>>>,
}

impl InMemoryPageStore {
    /// Creates a new empty page store.
    pub fn new() -> Self {
        Self { pages: Vec::new() }
    }

    fn slot(&self, page_id: PageId) -> Option<&Option<Box<PageData>>> {
        self.pages.get(page_id.0 as usize)
    }

    /// Registers `page_id` with a zeroed image, growing the store as needed.
    pub fn allocate(&mut self, page_id: PageId) {
        let idx = page_id.0 as usize;
        if idx >= self.pages.len() {
            self.pages.resize_with(idx + 1, || None);
        }
        self.pages[idx] = Some(Box::new([0u8; PAGE_SIZE]));
    }

    /// Returns true if the store holds an image for `page_id`.
    pub fn contains(&self, page_id: PageId) -> bool {
        matches!(self.slot(page_id), Some(Some(_)))
    }

    /// Copies the stored image of `page_id` into `buf`.
    ///
    /// Returns false if the page is unknown or deallocated.
    pub fn read(&self, page_id: PageId, buf: &mut PageData) -> bool {
        match self.slot(page_id) {
            Some(Some(page)) => {
                buf.copy_from_slice(&**page);
                true
            }
            _ => false,
        }
    }

    /// Stores an image for `page_id`, growing the store as needed.
    pub fn write(&mut self, page_id: PageId, data: &PageData) {
        let idx = page_id.0 as usize;
        if idx >= self.pages.len() {
            self.pages.resize_with(idx + 1, || None);
        }
        match &mut self.pages[idx] {
            Some(page) => page.copy_from_slice(data),
            slot => *slot = Some(Box::new(*data)),
        }
    }

    /// Drops the image for `page_id`.
    pub fn deallocate(&mut self, page_id: PageId) {
        if let Some(slot) = self.pages.get_mut(page_id.0 as usize) {
            *slot = None;
        }
    }
}

impl Default for InMemoryPageStore {
    fn default() -> Self {
        Self::new()
    }
}
