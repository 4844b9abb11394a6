//! Outgoing missing-* requests we are still waiting on.
//!
//! Identical requests are not repeated while one is outstanding. Missing-sequence requests are
//! tracked per `(member, kind)` by the highest sequence already asked for, so a wider gap only
//! asks for the part not yet requested.

use weft_core::{CacheEntryState, GlobalTime, MemberId, MessageKind, RequestCache};

/// Identity of a deduplicated missing-* request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MissingKey {
    Identity(MemberId),
    Message(MemberId, GlobalTime),
    LastMessage(MemberId, MessageKind),
    Proof(MemberId, GlobalTime),
}

#[derive(Debug, Clone)]
pub struct MissingRequestTracker {
    outstanding: RequestCache<MissingKey, ()>,
    sequences: RequestCache<(MemberId, MessageKind), u32>,
}

impl MissingRequestTracker {
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            outstanding: RequestCache::new(timeout_ms, 0),
            sequences: RequestCache::new(timeout_ms, 0),
        }
    }

    /// Number of outstanding requests of every kind.
    pub fn len(&self) -> usize {
        self.outstanding.len() + self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outstanding.is_empty() && self.sequences.is_empty()
    }

    /// Record a request for `key`. `false` means an identical request is still outstanding and
    /// nothing should be sent.
    pub fn track(&mut self, key: MissingKey, now_ms: u64) -> bool {
        match self.outstanding.state(&key, now_ms) {
            Some(CacheEntryState::Pending) => false,
            Some(_) => {
                self.outstanding.remove(&key);
                self.outstanding.insert(key, (), now_ms)
            }
            None => self.outstanding.insert(key, (), now_ms),
        }
    }

    /// Record a request for sequences `low..=high`. Returns the range still to ask for, or `None`
    /// when an outstanding request already covers `high`.
    pub fn track_sequence(
        &mut self,
        member: MemberId,
        kind: MessageKind,
        low: u32,
        high: u32,
        now_ms: u64,
    ) -> Option<(u32, u32)> {
        let key = (member, kind);
        if self.sequences.state(&key, now_ms) != Some(CacheEntryState::Pending) {
            self.sequences.remove(&key);
            self.sequences.insert(key, high, now_ms);
            return Some((low, high));
        }

        let requested = self.sequences.get_mut(&key)?;
        if high <= *requested {
            return None;
        }
        let low = low.max(*requested + 1);
        *requested = high;
        Some((low, high))
    }

    /// A response for `key` arrived.
    pub fn fulfilled(&mut self, key: &MissingKey) -> bool {
        self.outstanding.remove(key).is_some()
    }

    /// Sequence `sequence` of `(member, kind)` arrived. The request closes once its highest
    /// sequence is in.
    pub fn sequence_arrived(&mut self, member: MemberId, kind: MessageKind, sequence: u32) {
        let key = (member, kind);
        if self
            .sequences
            .get(&key)
            .is_some_and(|requested| sequence >= *requested)
        {
            self.sequences.remove(&key);
        }
    }

    /// Forget requests past their deadline. Returns how many were dropped.
    pub fn sweep(&mut self, now_ms: u64) -> usize {
        self.outstanding.sweep(now_ms).len() + self.sequences.sweep(now_ms).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member() -> MemberId {
        MemberId::from_seed(5)
    }

    #[test]
    fn test_duplicate_request_suppressed_until_timeout() {
        let mut tracker = MissingRequestTracker::new(1_000);
        let key = MissingKey::Identity(member());
        assert!(tracker.track(key, 0));
        assert!(!tracker.track(key, 999));
        assert!(tracker.track(key, 1_000));
    }

    #[test]
    fn test_fulfilled_request_can_be_repeated() {
        let mut tracker = MissingRequestTracker::new(1_000);
        let key = MissingKey::Proof(member(), 9);
        assert!(tracker.track(key, 0));
        assert!(tracker.fulfilled(&key));
        assert!(!tracker.fulfilled(&key));
        assert!(tracker.track(key, 1));
    }

    #[test]
    fn test_sequence_ranges_merge() {
        let mut tracker = MissingRequestTracker::new(1_000);
        let kind = MessageKind::Authorize;
        assert_eq!(tracker.track_sequence(member(), kind, 3, 7, 0), Some((3, 7)));
        assert_eq!(tracker.track_sequence(member(), kind, 3, 6, 1), None);
        assert_eq!(tracker.track_sequence(member(), kind, 4, 10, 2), Some((8, 10)));

        tracker.sequence_arrived(member(), kind, 9);
        assert_eq!(tracker.track_sequence(member(), kind, 9, 10, 3), None);
        tracker.sequence_arrived(member(), kind, 10);
        assert_eq!(tracker.track_sequence(member(), kind, 9, 12, 4), Some((9, 12)));
    }

    #[test]
    fn test_sweep_counts_expired() {
        let mut tracker = MissingRequestTracker::new(100);
        tracker.track(MissingKey::Message(member(), 1), 0);
        tracker.track_sequence(member(), MessageKind::Revoke, 1, 2, 50);
        assert_eq!(tracker.sweep(120), 1);
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.sweep(150), 1);
        assert!(tracker.is_empty());
    }
}
