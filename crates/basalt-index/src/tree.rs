//! Page-based B+ tree index.
//!
//! Nodes live in buffer-pool pages; the tree fetches a page, works on a
//! typed copy of its bytes, writes the copy back, and unpins. Every fetch
//! is matched by exactly one unpin on every control path, with
//! `dirty = true` iff the page was mutated.

use crate::header::HeaderPage;
use crate::iterator::TreeIterator;
use crate::key::{IndexKey, KeyComparator};
use crate::node::{self, node_type_of, InternalNode, LeafNode, NodeType};
use crate::record::RecordId;
use basalt_buffer::{BufferFrame, BufferPoolManager};
use basalt_common::page::PageId;
use basalt_common::{BasaltError, Result};
use log::debug;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// A B+ tree mapping fixed-width keys to record IDs.
///
/// Writers are not internally synchronized; the host must ensure no writer
/// runs concurrently with any other operation.
pub struct BPlusTree<K, C> {
    index_name: String,
    /// Current root page (`PageId::INVALID` while the tree is empty).
    root_page_id: AtomicU32,
    bpm: Arc<BufferPoolManager>,
    comparator: C,
    leaf_max_size: usize,
    internal_max_size: usize,
    /// Page persisting the `index_name -> root_page_id` record.
    header_page_id: PageId,
    _marker: PhantomData<K>,
}

impl<K: IndexKey, C: KeyComparator<K>> BPlusTree<K, C> {
    /// Creates a new empty index, allocating a header page for its root
    /// record.
    pub fn new(
        index_name: impl Into<String>,
        bpm: Arc<BufferPoolManager>,
        comparator: C,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Result<Self> {
        let index_name = index_name.into();
        let (header_page_id, frame) = bpm.new_page()?;
        let mut header = HeaderPage::new();
        if !header.insert_record(&index_name, PageId::INVALID) {
            bpm.unpin_page(header_page_id, false);
            return Err(BasaltError::Corrupted(format!(
                "cannot record index '{index_name}' in header page"
            )));
        }
        frame.copy_from(header.data());
        bpm.unpin_page(header_page_id, true);

        Ok(Self {
            index_name,
            root_page_id: AtomicU32::new(PageId::INVALID.0),
            bpm,
            comparator,
            leaf_max_size,
            internal_max_size,
            header_page_id,
            _marker: PhantomData,
        })
    }

    /// Reopens an index from an existing header page, restoring its root.
    ///
    /// Indexes not yet recorded on the page are registered with an empty
    /// root.
    pub fn open(
        index_name: impl Into<String>,
        bpm: Arc<BufferPoolManager>,
        comparator: C,
        leaf_max_size: usize,
        internal_max_size: usize,
        header_page_id: PageId,
    ) -> Result<Self> {
        let index_name = index_name.into();
        let frame = bpm.fetch_page(header_page_id)?;
        let mut header = {
            let data = frame.read_data();
            HeaderPage::from_data(&**data)
        };

        let root = match header.get_root_id(&index_name) {
            Some(root) => {
                bpm.unpin_page(header_page_id, false);
                root
            }
            None => {
                if !header.insert_record(&index_name, PageId::INVALID) {
                    bpm.unpin_page(header_page_id, false);
                    return Err(BasaltError::Corrupted(format!(
                        "cannot record index '{index_name}' in header page"
                    )));
                }
                frame.copy_from(header.data());
                bpm.unpin_page(header_page_id, true);
                PageId::INVALID
            }
        };

        Ok(Self {
            index_name,
            root_page_id: AtomicU32::new(root.0),
            bpm,
            comparator,
            leaf_max_size,
            internal_max_size,
            header_page_id,
            _marker: PhantomData,
        })
    }

    /// Returns the index name.
    pub fn name(&self) -> &str {
        &self.index_name
    }

    /// Returns the page holding this index's root record.
    pub fn header_page_id(&self) -> PageId {
        self.header_page_id
    }

    /// Returns the current root page ID.
    pub fn root_page_id(&self) -> PageId {
        PageId(self.root_page_id.load(Ordering::Acquire))
    }

    /// Returns true if the tree holds no keys.
    pub fn is_empty(&self) -> bool {
        !self.root_page_id().is_valid()
    }

    /// Returns the number of levels, leaves included; 0 when empty.
    pub fn height(&self) -> Result<u32> {
        if self.is_empty() {
            return Ok(0);
        }
        let (page_id, _frame, _leaf, levels) = self.descend_counting(None)?;
        self.bpm.unpin_page(page_id, false);
        Ok(levels)
    }

    /// Looks up the record ID stored under `key`.
    pub fn get_value(&self, key: &K) -> Result<Option<RecordId>> {
        if self.is_empty() {
            return Ok(None);
        }
        let (leaf_pid, _frame, leaf) = self.find_leaf(Some(key))?;
        let result = leaf
            .lookup(key, &self.comparator)
            .ok()
            .map(|index| leaf.value_at(index));
        self.bpm.unpin_page(leaf_pid, false);
        Ok(result)
    }

    /// Inserts `key -> value`.
    ///
    /// Returns false without mutating anything when the key is already
    /// present. A full leaf splits; splits cascade toward the root and may
    /// grow the tree by one level.
    pub fn insert(&self, key: &K, value: RecordId) -> Result<bool> {
        if self.is_empty() {
            self.start_new_tree(key, value)?;
            return Ok(true);
        }

        let (leaf_pid, frame, mut leaf) = self.find_leaf(Some(key))?;
        let slot = match leaf.lookup(key, &self.comparator) {
            Ok(_) => {
                self.bpm.unpin_page(leaf_pid, false);
                return Ok(false);
            }
            Err(slot) => slot,
        };

        if leaf.size() < leaf.max_size() {
            leaf.insert_at(slot, key, value);
            frame.copy_from(leaf.data());
            self.bpm.unpin_page(leaf_pid, true);
            return Ok(true);
        }

        self.split_leaf(leaf_pid, frame, leaf, key, value)?;
        Ok(true)
    }

    /// Removes `key` from its leaf.
    ///
    /// Returns false when the key is absent. Underfull leaves are not
    /// rebalanced.
    pub fn remove(&self, key: &K) -> Result<bool> {
        if self.is_empty() {
            return Ok(false);
        }
        let (leaf_pid, frame, mut leaf) = self.find_leaf(Some(key))?;
        match leaf.lookup(key, &self.comparator) {
            Ok(index) => {
                leaf.remove_at(index);
                frame.copy_from(leaf.data());
                self.bpm.unpin_page(leaf_pid, true);
                Ok(true)
            }
            Err(_) => {
                self.bpm.unpin_page(leaf_pid, false);
                Ok(false)
            }
        }
    }

    /// Returns an iterator positioned at the smallest key.
    pub fn iter(&self) -> Result<TreeIterator<K>> {
        if self.is_empty() {
            return Ok(TreeIterator::end(Arc::clone(&self.bpm)));
        }
        let (leaf_pid, _frame, leaf) = self.find_leaf(None)?;
        TreeIterator::positioned(Arc::clone(&self.bpm), leaf_pid, leaf, 0)
    }

    /// Returns an iterator positioned at the smallest key `>= key`.
    pub fn iter_from(&self, key: &K) -> Result<TreeIterator<K>> {
        if self.is_empty() {
            return Ok(TreeIterator::end(Arc::clone(&self.bpm)));
        }
        let (leaf_pid, _frame, leaf) = self.find_leaf(Some(key))?;
        let index = match leaf.lookup(key, &self.comparator) {
            Ok(index) => index,
            Err(index) => index,
        };
        TreeIterator::positioned(Arc::clone(&self.bpm), leaf_pid, leaf, index)
    }

    /// Descends from the root to a leaf, unpinning each internal node after
    /// fetching its child. With a key, follows separators; without, follows
    /// slot 0 to the leftmost leaf. The returned leaf stays pinned.
    fn find_leaf(&self, key: Option<&K>) -> Result<(PageId, &BufferFrame, LeafNode<K>)> {
        let (page_id, frame, leaf, _levels) = self.descend_counting(key)?;
        Ok((page_id, frame, leaf))
    }

    fn descend_counting(
        &self,
        key: Option<&K>,
    ) -> Result<(PageId, &BufferFrame, LeafNode<K>, u32)> {
        let mut page_id = self.root_page_id();
        let mut levels = 1;
        loop {
            let frame = self.bpm.fetch_page(page_id)?;
            let node_type = {
                let data = frame.read_data();
                node_type_of(&**data)
            };
            match node_type {
                Some(NodeType::Leaf) => {
                    let leaf = {
                        let data = frame.read_data();
                        LeafNode::from_data(&**data)
                    };
                    return Ok((page_id, frame, leaf, levels));
                }
                Some(NodeType::Internal) => {
                    let child = {
                        let data = frame.read_data();
                        let internal = InternalNode::<K>::from_data(&**data);
                        match key {
                            Some(key) => internal.find_child(key, &self.comparator),
                            None => internal.child_at(0),
                        }
                    };
                    self.bpm.unpin_page(page_id, false);
                    page_id = child;
                    levels += 1;
                }
                None => {
                    self.bpm.unpin_page(page_id, false);
                    return Err(BasaltError::Corrupted(format!(
                        "{page_id} is not a b+ tree node"
                    )));
                }
            }
        }
    }

    /// Allocates a root leaf for the first key and persists the root record.
    fn start_new_tree(&self, key: &K, value: RecordId) -> Result<()> {
        let (page_id, frame) = self.bpm.new_page()?;
        let mut root = LeafNode::new(page_id, PageId::INVALID, self.leaf_max_size);
        root.insert_at(0, key, value);
        frame.copy_from(root.data());
        self.bpm.unpin_page(page_id, true);
        debug!("index '{}' started root leaf {page_id}", self.index_name);
        self.set_root(page_id)
    }

    /// Splits a full leaf while inserting `(key, value)`.
    ///
    /// Consumes the caller's pin on `leaf_pid`.
    fn split_leaf(
        &self,
        leaf_pid: PageId,
        leaf_frame: &BufferFrame,
        mut leaf: LeafNode<K>,
        key: &K,
        value: RecordId,
    ) -> Result<()> {
        // Allocate before mutating: failing here leaves the tree untouched.
        let (right_pid, right_frame) = match self.bpm.new_page() {
            Ok(page) => page,
            Err(e) => {
                self.bpm.unpin_page(leaf_pid, false);
                return Err(e);
            }
        };

        let parent_pid = leaf.parent_page_id();
        let mut right = LeafNode::new(right_pid, parent_pid, self.leaf_max_size);
        let separator = leaf.split_into(&mut right, key, value, &self.comparator);

        leaf_frame.copy_from(leaf.data());
        right_frame.copy_from(right.data());
        self.bpm.unpin_page(leaf_pid, true);
        self.bpm.unpin_page(right_pid, true);
        debug!("leaf {leaf_pid} split, new sibling {right_pid}");

        // The halves are committed; from here the separator must reach the
        // parent or the tree is inconsistent.
        if let Err(e) = self.insert_into_parent(leaf_pid, parent_pid, separator, right_pid) {
            panic!("b+ tree split left incomplete: {e}");
        }
        Ok(())
    }

    /// Installs `key` as the separator between `left_pid` and `right_pid`
    /// in their parent, splitting upward as long as parents are full.
    fn insert_into_parent(
        &self,
        left_pid: PageId,
        parent_pid: PageId,
        key: K,
        right_pid: PageId,
    ) -> Result<()> {
        if !parent_pid.is_valid() {
            // The old root split: grow the tree by one level.
            let (root_pid, root_frame) = self.bpm.new_page()?;
            let mut root =
                InternalNode::<K>::new(root_pid, PageId::INVALID, self.internal_max_size);
            root.populate_new_root(left_pid, &key, right_pid);
            root_frame.copy_from(root.data());
            self.bpm.unpin_page(root_pid, true);

            self.set_parent(left_pid, root_pid)?;
            self.set_parent(right_pid, root_pid)?;
            debug!("index '{}' grew new root {root_pid}", self.index_name);
            return self.set_root(root_pid);
        }

        let parent_frame = self.bpm.fetch_page(parent_pid)?;
        let mut parent = {
            let data = parent_frame.read_data();
            InternalNode::<K>::from_data(&**data)
        };

        if parent.size() < parent.max_size() {
            // Simple split: the promotion fits.
            parent.insert_slot(&key, right_pid, &self.comparator);
            parent_frame.copy_from(parent.data());
            self.bpm.unpin_page(parent_pid, true);
            return Ok(());
        }

        // Multiple split: the parent is full and splits in turn.
        let grandparent_pid = parent.parent_page_id();
        let (sibling_pid, sibling_frame) = match self.bpm.new_page() {
            Ok(page) => page,
            Err(e) => {
                self.bpm.unpin_page(parent_pid, false);
                return Err(e);
            }
        };
        let mut sibling =
            InternalNode::<K>::new(sibling_pid, grandparent_pid, self.internal_max_size);
        let promoted = parent.split_into(&mut sibling, &key, right_pid, &self.comparator);

        parent_frame.copy_from(parent.data());
        sibling_frame.copy_from(sibling.data());
        self.bpm.unpin_page(parent_pid, true);
        self.bpm.unpin_page(sibling_pid, true);

        // Children handed to the sibling now answer to it.
        for i in 0..sibling.size() {
            self.set_parent(sibling.child_at(i), sibling_pid)?;
        }
        debug!("internal {parent_pid} split, new sibling {sibling_pid}");

        self.insert_into_parent(parent_pid, grandparent_pid, promoted, sibling_pid)
    }

    /// Rewrites the parent pointer of `page_id`.
    fn set_parent(&self, page_id: PageId, parent: PageId) -> Result<()> {
        let frame = self.bpm.fetch_page(page_id)?;
        {
            let mut data = frame.write_data();
            node::set_parent_page_id_in(&mut **data, parent);
        }
        self.bpm.unpin_page(page_id, true);
        Ok(())
    }

    /// Points the tree at a new root and persists the header record.
    fn set_root(&self, page_id: PageId) -> Result<()> {
        self.root_page_id.store(page_id.0, Ordering::Release);

        let frame = self.bpm.fetch_page(self.header_page_id)?;
        let mut header = {
            let data = frame.read_data();
            HeaderPage::from_data(&**data)
        };
        if !header.update_record(&self.index_name, page_id) {
            header.insert_record(&self.index_name, page_id);
        }
        frame.copy_from(header.data());
        self.bpm.unpin_page(self.header_page_id, true);
        Ok(())
    }
}
