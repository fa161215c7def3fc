//! Thread-safe extendible hash table.
//!
//! Used by the buffer pool to map resident page IDs to frame IDs, and
//! usable as a general key-value directory. The table grows by doubling
//! its directory and splitting the overflowing bucket; it never shrinks.

use log::debug;
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// A bucket holding at most `capacity` key-value pairs.
struct Bucket<K, V> {
    /// Number of hash bits that distinguish keys inside this bucket.
    depth: usize,
    /// Stored pairs; membership is the only externally observable property.
    items: Vec<(K, V)>,
}

impl<K: Eq, V> Bucket<K, V> {
    fn new(depth: usize, capacity: usize) -> Self {
        Self {
            depth,
            items: Vec::with_capacity(capacity),
        }
    }

    fn find(&self, key: &K) -> Option<&V> {
        self.items.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    fn remove(&mut self, key: &K) -> bool {
        if let Some(pos) = self.items.iter().position(|(k, _)| k == key) {
            self.items.remove(pos);
            return true;
        }
        false
    }

    /// Inserts or updates in place. Returns false iff the bucket is full
    /// and the key is not already present.
    fn insert(&mut self, key: K, value: V, capacity: usize) -> bool {
        if let Some(pos) = self.items.iter().position(|(k, _)| *k == key) {
            self.items[pos].1 = value;
            return true;
        }
        if self.items.len() >= capacity {
            return false;
        }
        self.items.push((key, value));
        true
    }
}

/// Directory state: slots index into a bucket arena so that several slots
/// can share one bucket (a bucket is shared by exactly
/// `2^(global_depth - local_depth)` slots).
struct Directory<K, V> {
    global_depth: usize,
    /// One entry per directory slot, indexing into `buckets`.
    slots: Vec<usize>,
    /// Bucket arena; split buckets leave their arena slot to one successor.
    buckets: Vec<Bucket<K, V>>,
    /// Number of live buckets.
    num_buckets: usize,
}

/// A thread-safe extendible hash table.
///
/// All public operations are serialized under a single exclusive lock,
/// making them linearizable.
pub struct ExtendibleHashTable<K, V> {
    bucket_size: usize,
    dir: Mutex<Directory<K, V>>,
}

fn hash_of<K: Hash>(key: &K) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

impl<K, V> ExtendibleHashTable<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Creates a table whose buckets hold at most `bucket_size` pairs.
    ///
    /// The initial directory has a single slot pointing at one empty bucket
    /// with local depth 0.
    pub fn new(bucket_size: usize) -> Self {
        assert!(bucket_size >= 1, "bucket size must be at least 1");
        Self {
            bucket_size,
            dir: Mutex::new(Directory {
                global_depth: 0,
                slots: vec![0],
                buckets: vec![Bucket::new(0, bucket_size)],
                num_buckets: 1,
            }),
        }
    }

    /// Directory index of `key`: the low `global_depth` bits of its hash.
    fn index_of(dir: &Directory<K, V>, key: &K) -> usize {
        let mask = (1usize << dir.global_depth) - 1;
        (hash_of(key) as usize) & mask
    }

    /// Returns the value associated with `key`, if any.
    pub fn find(&self, key: &K) -> Option<V> {
        let dir = self.dir.lock();
        let slot = Self::index_of(&dir, key);
        dir.buckets[dir.slots[slot]].find(key).cloned()
    }

    /// Inserts `key -> value`, updating in place if the key exists.
    ///
    /// A full bucket is split (doubling the directory when its local depth
    /// equals the global depth) and the insert retried; the loop converges
    /// because every split strictly increases the bucket's local depth.
    pub fn insert(&self, key: K, value: V) {
        let mut dir = self.dir.lock();
        loop {
            let slot = Self::index_of(&dir, &key);
            let bucket_idx = dir.slots[slot];
            if dir.buckets[bucket_idx].insert(key.clone(), value.clone(), self.bucket_size) {
                return;
            }
            Self::split_bucket(&mut dir, slot, self.bucket_size);
        }
    }

    /// Splits the bucket referenced by directory slot `slot`.
    fn split_bucket(dir: &mut Directory<K, V>, slot: usize, bucket_size: usize) {
        let bucket_idx = dir.slots[slot];
        let local_depth = dir.buckets[bucket_idx].depth;

        // Double the directory by appending a copy of itself when the
        // overflowing bucket already uses every consulted hash bit.
        if local_depth == dir.global_depth {
            let len = dir.slots.len();
            dir.slots.extend_from_within(0..len);
            dir.global_depth += 1;
            debug!("hash directory doubled to global depth {}", dir.global_depth);
        }

        // Partition the overflowing bucket's items by the next hash bit.
        let high_bit = 1usize << local_depth;
        let items = std::mem::take(&mut dir.buckets[bucket_idx].items);
        let mut low = Bucket::new(local_depth + 1, bucket_size);
        let mut high = Bucket::new(local_depth + 1, bucket_size);
        for (k, v) in items {
            if (hash_of(&k) as usize) & high_bit != 0 {
                high.items.push((k, v));
            } else {
                low.items.push((k, v));
            }
        }

        // The old arena slot keeps the low half; the high half is appended.
        dir.buckets[bucket_idx] = low;
        let high_idx = dir.buckets.len();
        dir.buckets.push(high);
        dir.num_buckets += 1;

        // Reassign every directory slot that shares the overflowing
        // bucket's low `local_depth` bits.
        let low_bits = slot & (high_bit - 1);
        let mut i = low_bits;
        while i < dir.slots.len() {
            dir.slots[i] = if i & high_bit != 0 { high_idx } else { bucket_idx };
            i += high_bit;
        }
    }

    /// Removes `key`. Returns true iff it was present.
    ///
    /// Buckets are never merged and the directory never shrinks.
    pub fn remove(&self, key: &K) -> bool {
        let mut dir = self.dir.lock();
        let slot = Self::index_of(&dir, key);
        let bucket_idx = dir.slots[slot];
        dir.buckets[bucket_idx].remove(key)
    }

    /// Returns the number of hash bits the directory consults.
    pub fn global_depth(&self) -> usize {
        self.dir.lock().global_depth
    }

    /// Returns the local depth of the bucket at directory slot `dir_index`.
    pub fn local_depth(&self, dir_index: usize) -> usize {
        let dir = self.dir.lock();
        dir.buckets[dir.slots[dir_index]].depth
    }

    /// Returns the number of live buckets.
    pub fn num_buckets(&self) -> usize {
        self.dir.lock().num_buckets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;
    use std::collections::HashMap;

    #[test]
    fn test_new_table() {
        let table: ExtendibleHashTable<i32, i32> = ExtendibleHashTable::new(2);
        assert_eq!(table.global_depth(), 0);
        assert_eq!(table.local_depth(0), 0);
        assert_eq!(table.num_buckets(), 1);
        assert!(table.find(&1).is_none());
    }

    #[test]
    fn test_insert_and_find() {
        let table = ExtendibleHashTable::new(2);
        table.insert(1, "a");
        table.insert(2, "b");
        table.insert(3, "c");
        table.insert(4, "d");
        table.insert(5, "e");

        assert_eq!(table.find(&1), Some("a"));
        assert_eq!(table.find(&2), Some("b"));
        assert_eq!(table.find(&3), Some("c"));
        assert_eq!(table.find(&4), Some("d"));
        assert_eq!(table.find(&5), Some("e"));
        assert!(table.find(&6).is_none());
    }

    #[test]
    fn test_growth_on_overflow() {
        let table = ExtendibleHashTable::new(2);
        for (k, v) in [(1, "a"), (2, "b"), (3, "c"), (4, "d"), (5, "e")] {
            table.insert(k, v);
        }

        // Five pairs cannot fit in fewer than three two-slot buckets, and a
        // depth-1 directory addresses at most two buckets.
        assert!(table.num_buckets() >= 3);
        assert!(table.global_depth() >= 2);
    }

    #[test]
    fn test_update_in_place() {
        let table = ExtendibleHashTable::new(2);
        table.insert(1, "a");
        table.insert(1, "z");

        assert_eq!(table.find(&1), Some("z"));
        assert_eq!(table.num_buckets(), 1);
        assert_eq!(table.global_depth(), 0);
    }

    #[test]
    fn test_remove() {
        let table = ExtendibleHashTable::new(2);
        table.insert(1, "a");
        table.insert(2, "b");

        assert!(table.remove(&1));
        assert!(table.find(&1).is_none());
        assert_eq!(table.find(&2), Some("b"));

        // Absent keys and double removes report false.
        assert!(!table.remove(&1));
        assert!(!table.remove(&99));
    }

    #[test]
    fn test_local_depth_bounded_by_global() {
        let table = ExtendibleHashTable::new(2);
        for k in 0..64 {
            table.insert(k, k);
        }
        let global = table.global_depth();
        for slot in 0..(1usize << global) {
            assert!(table.local_depth(slot) <= global);
        }
    }

    #[test]
    fn test_bucket_size_one() {
        let table = ExtendibleHashTable::new(1);
        for k in 0..16 {
            table.insert(k, k * 10);
        }
        for k in 0..16 {
            assert_eq!(table.find(&k), Some(k * 10));
        }
        assert!(table.num_buckets() >= 16);
    }

    #[test]
    fn test_string_keys() {
        let table = ExtendibleHashTable::new(2);
        table.insert("alpha".to_string(), 1);
        table.insert("beta".to_string(), 2);
        table.insert("gamma".to_string(), 3);

        assert_eq!(table.find(&"alpha".to_string()), Some(1));
        assert_eq!(table.find(&"beta".to_string()), Some(2));
        assert_eq!(table.find(&"gamma".to_string()), Some(3));
    }

    #[test]
    fn test_random_workload_matches_model() {
        let mut rng = StdRng::seed_from_u64(0x5EED);
        let table = ExtendibleHashTable::new(4);
        let mut model: HashMap<u32, u32> = HashMap::new();

        for _ in 0..2000 {
            let key = rng.gen_range(0..256);
            if rng.gen_bool(0.7) {
                let value = rng.gen();
                table.insert(key, value);
                model.insert(key, value);
            } else {
                assert_eq!(table.remove(&key), model.remove(&key).is_some());
            }
        }

        for key in 0..256 {
            assert_eq!(table.find(&key), model.get(&key).copied());
        }
    }

    #[test]
    fn test_concurrent_inserts() {
        use std::sync::Arc;
        use std::thread;

        let table = Arc::new(ExtendibleHashTable::new(4));
        let mut handles = Vec::new();
        for t in 0..4u32 {
            let table = Arc::clone(&table);
            handles.push(thread::spawn(move || {
                for i in 0..200u32 {
                    let key = t * 1000 + i;
                    table.insert(key, key + 1);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        for t in 0..4u32 {
            for i in 0..200u32 {
                let key = t * 1000 + i;
                assert_eq!(table.find(&key), Some(key + 1));
            }
        }
    }
}
