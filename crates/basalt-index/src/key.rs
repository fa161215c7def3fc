//! Index key codecs and the comparator seam.

use std::cmp::Ordering;

/// A fixed-width key storable inside a B+ tree node.
///
/// Keys are packed in place in node pages, so the encoded width must be a
/// compile-time constant. Encoding is for storage only; ordering comes from
/// the tree's [`KeyComparator`].
pub trait IndexKey: Copy + Default + Send + Sync + std::fmt::Debug + 'static {
    /// Encoded width of the key in bytes.
    const ENCODED_LEN: usize;

    /// Serializes the key into the first `ENCODED_LEN` bytes of `buf`.
    fn encode(&self, buf: &mut [u8]);

    /// Deserializes a key from the first `ENCODED_LEN` bytes of `buf`.
    fn decode(buf: &[u8]) -> Self;
}

macro_rules! impl_index_key_for_int {
    ($($t:ty),*) => {
        $(
            impl IndexKey for $t {
                const ENCODED_LEN: usize = std::mem::size_of::<$t>();

                fn encode(&self, buf: &mut [u8]) {
                    buf[..Self::ENCODED_LEN].copy_from_slice(&self.to_le_bytes());
                }

                fn decode(buf: &[u8]) -> Self {
                    let mut bytes = [0u8; Self::ENCODED_LEN];
                    bytes.copy_from_slice(&buf[..Self::ENCODED_LEN]);
                    <$t>::from_le_bytes(bytes)
                }
            }
        )*
    };
}

impl_index_key_for_int!(i32, i64, u32, u64);

/// Total order over keys of type `K`.
pub trait KeyComparator<K>: Clone + Send + Sync {
    /// Compares two keys.
    fn compare(&self, a: &K, b: &K) -> Ordering;
}

/// Comparator delegating to the key's `Ord` implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrdComparator;

impl<K: Ord> KeyComparator<K> for OrdComparator {
    #[inline]
    fn compare(&self, a: &K, b: &K) -> Ordering {
        a.cmp(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_key_roundtrip() {
        let mut buf = [0u8; 8];

        for key in [0i64, 1, -1, i64::MAX, i64::MIN] {
            key.encode(&mut buf);
            assert_eq!(i64::decode(&buf), key);
        }

        for key in [0u32, 1, u32::MAX] {
            key.encode(&mut buf);
            assert_eq!(u32::decode(&buf), key);
        }
    }

    #[test]
    fn test_encoded_len() {
        assert_eq!(<i32 as IndexKey>::ENCODED_LEN, 4);
        assert_eq!(<i64 as IndexKey>::ENCODED_LEN, 8);
        assert_eq!(<u32 as IndexKey>::ENCODED_LEN, 4);
        assert_eq!(<u64 as IndexKey>::ENCODED_LEN, 8);
    }

    #[test]
    fn test_ord_comparator() {
        let cmp = OrdComparator;
        assert_eq!(cmp.compare(&1i64, &2i64), Ordering::Less);
        assert_eq!(cmp.compare(&2i64, &2i64), Ordering::Equal);
        assert_eq!(cmp.compare(&3i64, &2i64), Ordering::Greater);
    }

    #[test]
    fn test_encode_does_not_touch_tail() {
        let mut buf = [0xFFu8; 8];
        7u32.encode(&mut buf);
        assert_eq!(&buf[4..], &[0xFF; 4]);
    }
}
