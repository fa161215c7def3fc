//! Page identifiers and raw page data for BasaltDB storage.

use serde::{Deserialize, Serialize};

/// Default page size in bytes (16 KB).
pub const PAGE_SIZE: usize = 16 * 1024;

/// Raw bytes of a single page.
pub type PageData = [u8; PAGE_SIZE];

/// Unique identifier for a page.
///
/// Encoded on disk as 4 little-endian bytes; `PageId::INVALID` is the
/// sentinel for "no page" (empty root, end of the leaf chain, no parent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageId(pub u32);

impl PageId {
    /// Invalid page ID.
    pub const INVALID: PageId = PageId(u32::MAX);

    /// Encoded width of a page ID in a page.
    pub const ENCODED_LEN: usize = 4;

    /// Returns true if this is a valid page ID.
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }

    /// Serializes the ID into the first four bytes of `buf`.
    pub fn encode(&self, buf: &mut [u8]) {
        buf[..Self::ENCODED_LEN].copy_from_slice(&self.0.to_le_bytes());
    }

    /// Deserializes an ID from the first four bytes of `buf`.
    pub fn decode(buf: &[u8]) -> Self {
        Self(u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]))
    }
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "page:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_constant() {
        assert_eq!(PAGE_SIZE, 16 * 1024);
        assert_eq!(PAGE_SIZE, 16384);
    }

    #[test]
    fn test_page_id_validity() {
        assert!(PageId(0).is_valid());
        assert!(PageId(12345).is_valid());
        assert!(!PageId::INVALID.is_valid());
    }

    #[test]
    fn test_page_id_display() {
        assert_eq!(PageId(5).to_string(), "page:5");
        assert_eq!(PageId(0).to_string(), "page:0");
    }

    #[test]
    fn test_page_id_encode_decode_roundtrip() {
        for id in [PageId(0), PageId(1), PageId(987_654), PageId::INVALID] {
            let mut buf = [0u8; 8];
            id.encode(&mut buf);
            assert_eq!(PageId::decode(&buf), id);
        }
    }

    #[test]
    fn test_page_id_encoding_is_little_endian() {
        let mut buf = [0u8; 4];
        PageId(0x0102_0304).encode(&mut buf);
        assert_eq!(buf, [0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn test_page_id_hash() {
        use std::collections::HashSet;

        let mut set = HashSet::new();
        set.insert(PageId(1));
        set.insert(PageId(2));
        set.insert(PageId(1)); // Duplicate

        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_page_id_serde_roundtrip() {
        let original = PageId(500);
        let serialized = serde_json::to_string(&original).unwrap();
        let deserialized: PageId = serde_json::from_str(&serialized).unwrap();
        assert_eq!(original, deserialized);
    }
}
