//! Error types for BasaltDB.

use crate::page::PageId;
use thiserror::Error;

/// Result type alias using BasaltError.
pub type Result<T> = std::result::Result<T, BasaltError>;

/// Errors that can occur in BasaltDB operations.
#[derive(Debug, Error)]
pub enum BasaltError {
    // Replacer errors
    #[error("Frame {frame_id} out of range (capacity {capacity})")]
    FrameOutOfRange { frame_id: u32, capacity: usize },

    #[error("Cannot remove pinned frame {frame_id}")]
    RemovePinnedFrame { frame_id: u32 },

    // Buffer pool errors
    #[error("Buffer pool exhausted, no evictable frame available")]
    PoolExhausted,

    #[error("Page not found: {0}")]
    PageNotFound(PageId),

    // Index errors
    #[error("Index corrupted: {0}")]
    Corrupted(String),
}
