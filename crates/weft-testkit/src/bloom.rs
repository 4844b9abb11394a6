//! SHA-1 bloom filter.
//!
//! Each key is hashed once as `SHA-1(prefix || key)`; the `k` bit indexes come from double
//! hashing over the two leading 64-bit words of the digest.

use sha1::{Digest, Sha1};
use std::f64::consts::LN_2;
use weft_wire::{BloomBuilder, BloomFilter, BloomProbe};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sha1Bloom {
    /// Filter size in bytes for filters this instance builds.
    pub bytes: usize,
    pub functions: u8,
}

impl Default for Sha1Bloom {
    fn default() -> Self {
        Self {
            bytes: 128,
            functions: 4,
        }
    }
}

impl Sha1Bloom {
    pub fn new(bytes: usize, functions: u8) -> Self {
        Self { bytes, functions }
    }

    fn indexes(prefix: u8, key: &[u8], functions: u8, bit_count: u64) -> impl Iterator<Item = u64> {
        let mut hasher = Sha1::new();
        hasher.update([prefix]);
        hasher.update(key);
        let digest = hasher.finalize();
        let mut first = [0u8; 8];
        let mut second = [0u8; 8];
        first.copy_from_slice(&digest[..8]);
        second.copy_from_slice(&digest[8..16]);
        let h1 = u64::from_be_bytes(first);
        let h2 = u64::from_be_bytes(second) | 1;
        (0..u64::from(functions)).map(move |i| h1.wrapping_add(i.wrapping_mul(h2)) % bit_count)
    }

    pub fn insert(filter: &mut BloomFilter, key: &[u8]) {
        let bit_count = filter.bits.len() as u64 * 8;
        if bit_count == 0 {
            return;
        }
        for index in Self::indexes(filter.prefix, key, filter.functions, bit_count) {
            filter.bits[(index / 8) as usize] |= 1 << (index % 8);
        }
    }
}

impl BloomProbe for Sha1Bloom {
    fn contains(&self, filter: &BloomFilter, key: &[u8]) -> bool {
        let bit_count = filter.bits.len() as u64 * 8;
        if bit_count == 0 || filter.functions == 0 {
            return false;
        }
        Self::indexes(filter.prefix, key, filter.functions, bit_count)
            .all(|index| filter.bits[(index / 8) as usize] & (1 << (index % 8)) != 0)
    }
}

impl BloomBuilder for Sha1Bloom {
    fn capacity(&self) -> usize {
        let bits = (self.bytes * 8) as f64;
        (bits * LN_2 / f64::from(self.functions.max(1))) as usize
    }

    fn build(&self, prefix: u8, keys: &[Vec<u8>]) -> BloomFilter {
        let mut filter = BloomFilter {
            functions: self.functions,
            prefix,
            bits: vec![0; self.bytes],
        };
        for key in keys {
            Self::insert(&mut filter, key);
        }
        filter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inserted_keys_are_found() {
        let bloom = Sha1Bloom::default();
        let keys: Vec<Vec<u8>> = (0..40u8).map(|i| vec![i; 12]).collect();
        let filter = bloom.build(7, &keys);
        assert!(keys.iter().all(|key| bloom.contains(&filter, key)));
    }

    #[test]
    fn test_empty_filter_contains_nothing() {
        let bloom = Sha1Bloom::default();
        let filter = bloom.build(0, &[]);
        assert!(!bloom.contains(&filter, b"anything"));
    }

    #[test]
    fn test_prefix_changes_positions() {
        let bloom = Sha1Bloom::new(64, 3);
        let a = bloom.build(1, &[b"key".to_vec()]);
        let b = bloom.build(2, &[b"key".to_vec()]);
        assert_ne!(a.bits, b.bits);
    }
}
