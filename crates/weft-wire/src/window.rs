//! Sync request window piggybacked on introduction requests.

use serde::{Deserialize, Serialize};
use weft_core::GlobalTime;

/// Bloom filter bits as sent by the requester. The membership test itself is a collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BloomFilter {
    /// Number of hash functions.
    pub functions: u8,
    /// Salt byte prepended to every key before hashing.
    pub prefix: u8,
    pub bits: Vec<u8>,
}

/// Membership test over a peer-supplied filter. False positives only suppress re-sends.
pub trait BloomProbe: Send + Sync {
    fn contains(&self, filter: &BloomFilter, key: &[u8]) -> bool;
}

/// Builds filters for outgoing sync requests.
pub trait BloomBuilder: Send + Sync {
    /// Number of keys one filter holds at the configured error rate.
    fn capacity(&self) -> usize;

    fn build(&self, prefix: u8, keys: &[Vec<u8>]) -> BloomFilter;
}

impl<T: BloomProbe + ?Sized> BloomProbe for std::sync::Arc<T> {
    fn contains(&self, filter: &BloomFilter, key: &[u8]) -> bool {
        (**self).contains(filter, key)
    }
}

impl<T: BloomBuilder + ?Sized> BloomBuilder for std::sync::Arc<T> {
    fn capacity(&self) -> usize {
        (**self).capacity()
    }

    fn build(&self, prefix: u8, keys: &[Vec<u8>]) -> BloomFilter {
        (**self).build(prefix, keys)
    }
}

/// Range and modulo sieve of a sync request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncWindow {
    pub time_low: GlobalTime,
    /// Zero means up to the responder's current global time.
    pub time_high: GlobalTime,
    pub modulo: u16,
    pub offset: u16,
    pub bloom: BloomFilter,
}

impl SyncWindow {
    /// Upper bound of the range given the responder's current global time.
    pub fn effective_high(&self, current: GlobalTime) -> GlobalTime {
        if self.time_high == 0 {
            current
        } else {
            self.time_high
        }
    }

    /// Whether `global_time` passes the range and modulo sieve.
    pub fn contains(&self, global_time: GlobalTime, current: GlobalTime) -> bool {
        if global_time < self.time_low || global_time > self.effective_high(current) {
            return false;
        }
        let modulo = u64::from(self.modulo.max(1));
        global_time % modulo == u64::from(self.offset) % modulo
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(low: u64, high: u64, modulo: u16, offset: u16) -> SyncWindow {
        SyncWindow {
            time_low: low,
            time_high: high,
            modulo,
            offset,
            bloom: BloomFilter {
                functions: 1,
                prefix: 0,
                bits: vec![0],
            },
        }
    }

    #[test]
    fn test_inclusive_range() {
        let w = window(100, 200, 1, 0);
        assert!(w.contains(100, 500));
        assert!(w.contains(200, 500));
        assert!(!w.contains(99, 500));
        assert!(!w.contains(201, 500));
    }

    #[test]
    fn test_modulo_offset_selects_odd_times() {
        let w = window(100, 200, 2, 1);
        assert!(w.contains(101, 0));
        assert!(!w.contains(102, 0));
    }

    #[test]
    fn test_zero_high_uses_current_time() {
        let w = window(1, 0, 1, 0);
        assert!(w.contains(40, 50));
        assert!(!w.contains(51, 50));
    }
}
