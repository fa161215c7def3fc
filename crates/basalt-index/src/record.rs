//! Record identifiers stored as B+ tree leaf values.

use basalt_common::page::PageId;
use serde::{Deserialize, Serialize};

/// Identifies a record slot somewhere in the database.
///
/// The B+ tree maps each key to one of these; the tree never interprets
/// them beyond storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId {
    /// Page containing the record.
    pub page_id: PageId,
    /// Slot number within the page.
    pub slot: u32,
}

impl RecordId {
    /// Encoded width of a record ID in a leaf page.
    pub const ENCODED_LEN: usize = 8;

    /// Invalid record ID.
    pub const INVALID: RecordId = RecordId {
        page_id: PageId::INVALID,
        slot: u32::MAX,
    };

    /// Creates a new record ID.
    pub fn new(page_id: PageId, slot: u32) -> Self {
        Self { page_id, slot }
    }

    /// Returns true if this is a valid record ID.
    pub fn is_valid(&self) -> bool {
        self.page_id.is_valid()
    }

    /// Serializes the ID into the first eight bytes of `buf`.
    pub fn encode(&self, buf: &mut [u8]) {
        buf[..4].copy_from_slice(&self.page_id.0.to_le_bytes());
        buf[4..8].copy_from_slice(&self.slot.to_le_bytes());
    }

    /// Deserializes an ID from the first eight bytes of `buf`.
    pub fn decode(buf: &[u8]) -> Self {
        Self {
            page_id: PageId::decode(buf),
            slot: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
        }
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.page_id, self.slot)
    }
}
