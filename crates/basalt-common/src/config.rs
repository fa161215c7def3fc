//! Configuration structures for BasaltDB.

use crate::page::PAGE_SIZE;
use serde::{Deserialize, Serialize};

/// Storage configuration for the BasaltDB engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Page size in bytes.
    pub page_size: usize,
    /// Buffer pool size in number of frames.
    pub buffer_pool_frames: usize,
    /// History depth K for the LRU-K replacement policy.
    pub replacer_k: usize,
    /// Capacity of each bucket in the buffer pool's page table.
    pub hash_bucket_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            page_size: PAGE_SIZE,
            buffer_pool_frames: 1024, // 16 MB with 16 KB pages
            replacer_k: 2,
            hash_bucket_size: 32,
        }
    }
}

impl StorageConfig {
    /// Returns the total buffer pool size in bytes.
    pub fn buffer_pool_size_bytes(&self) -> usize {
        self.buffer_pool_frames * self.page_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_config_defaults() {
        let config = StorageConfig::default();
        assert_eq!(config.page_size, PAGE_SIZE);
        assert_eq!(config.page_size, 16384);
        assert_eq!(config.buffer_pool_frames, 1024);
        assert_eq!(config.replacer_k, 2);
        assert_eq!(config.hash_bucket_size, 32);
    }

    #[test]
    fn test_storage_config_custom() {
        let config = StorageConfig {
            page_size: 8192,
            buffer_pool_frames: 64,
            replacer_k: 3,
            hash_bucket_size: 4,
        };

        assert_eq!(config.page_size, 8192);
        assert_eq!(config.buffer_pool_frames, 64);
        assert_eq!(config.replacer_k, 3);
        assert_eq!(config.hash_bucket_size, 4);
    }

    #[test]
    fn test_buffer_pool_size_bytes() {
        let config = StorageConfig::default();
        assert_eq!(
            config.buffer_pool_size_bytes(),
            config.buffer_pool_frames * config.page_size
        );

        // 1024 frames * 16384 bytes = 16 MB
        assert_eq!(config.buffer_pool_size_bytes(), 16_777_216);
    }

    #[test]
    fn test_storage_config_clone() {
        let config1 = StorageConfig::default();
        let config2 = config1.clone();
        assert_eq!(config1.buffer_pool_frames, config2.buffer_pool_frames);
        assert_eq!(config1.replacer_k, config2.replacer_k);
    }

    #[test]
    fn test_storage_config_serde_roundtrip() {
        let original = StorageConfig::default();
        let serialized = serde_json::to_string(&original).unwrap();
        let deserialized: StorageConfig = serde_json::from_str(&serialized).unwrap();

        assert_eq!(original.page_size, deserialized.page_size);
        assert_eq!(original.buffer_pool_frames, deserialized.buffer_pool_frames);
        assert_eq!(original.replacer_k, deserialized.replacer_k);
        assert_eq!(original.hash_bucket_size, deserialized.hash_bucket_size);
    }
}
