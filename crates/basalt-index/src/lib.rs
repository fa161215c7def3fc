//! B+ tree index for BasaltDB.
//!
//! This crate provides:
//! - Typed leaf/internal node views over raw buffer-pool pages
//! - The B+ tree itself: point lookup, insertion with cascading splits,
//!   and leaf-chained range iteration
//! - The header page persisting `index name -> root page id` records
//! - Fixed-width key codecs and the comparator seam

mod header;
mod iterator;
mod key;
mod node;
mod record;
mod tree;

pub use header::HeaderPage;
pub use iterator::TreeIterator;
pub use key::{IndexKey, KeyComparator, OrdComparator};
pub use node::{InternalNode, LeafNode, NodeType};
pub use record::RecordId;
pub use tree::BPlusTree;
