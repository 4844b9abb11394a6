//! Time-indexed table of outstanding requests.
//!
//! Entries carry a response deadline and, once completed, a cleanup deadline. Nothing here
//! schedules work: callers pass `now_ms` and drive expiry with [`RequestCache::sweep`].

use rand::Rng;
use std::collections::HashMap;
use std::hash::Hash;

/// Observable state of a cached request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEntryState {
    /// Waiting for a response before the deadline.
    Pending,
    /// Response received; retained until the cleanup deadline.
    Completed,
    /// Deadline passed without a response.
    TimedOut,
}

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    deadline_ms: u64,
    completed_at_ms: Option<u64>,
}

/// Outstanding requests keyed by an identifier.
#[derive(Debug, Clone)]
pub struct RequestCache<K, V> {
    entries: HashMap<K, Entry<V>>,
    timeout_ms: u64,
    cleanup_delay_ms: u64,
}

impl<K: Eq + Hash + Clone, V> RequestCache<K, V> {
    /// Entries time out `timeout_ms` after insertion unless completed; completed entries stay
    /// visible to [`completed`](Self::completed) for `cleanup_delay_ms`.
    pub fn new(timeout_ms: u64, cleanup_delay_ms: u64) -> Self {
        Self {
            entries: HashMap::new(),
            timeout_ms,
            cleanup_delay_ms,
        }
    }

    /// Entries of every state, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert a pending entry. Returns `false` and leaves the table unchanged if `key` is in use.
    pub fn insert(&mut self, key: K, value: V, now_ms: u64) -> bool {
        self.insert_with_timeout(key, value, now_ms, self.timeout_ms)
    }

    /// Insert a pending entry with its own deadline.
    pub fn insert_with_timeout(&mut self, key: K, value: V, now_ms: u64, timeout_ms: u64) -> bool {
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(
            key,
            Entry {
                value,
                deadline_ms: now_ms.saturating_add(timeout_ms),
                completed_at_ms: None,
            },
        );
        true
    }

    /// Every entry, live or expired but not yet swept.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter().map(|(key, entry)| (key, &entry.value))
    }

    /// Value of `key` in any state.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|entry| &entry.value)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.entries.get_mut(key).map(|entry| &mut entry.value)
    }

    /// State of `key` at `now_ms`, whether or not a sweep has run yet.
    pub fn state(&self, key: &K, now_ms: u64) -> Option<CacheEntryState> {
        let entry = self.entries.get(key)?;
        Some(match entry.completed_at_ms {
            Some(_) => CacheEntryState::Completed,
            None if now_ms >= entry.deadline_ms => CacheEntryState::TimedOut,
            None => CacheEntryState::Pending,
        })
    }

    /// Mark a pending entry as answered. Late answers (at or after the deadline) and repeated
    /// answers return `None`.
    pub fn complete(&mut self, key: &K, now_ms: u64) -> Option<&mut V> {
        let entry = self.entries.get_mut(key)?;
        if entry.completed_at_ms.is_some() || now_ms >= entry.deadline_ms {
            return None;
        }
        entry.completed_at_ms = Some(now_ms);
        Some(&mut entry.value)
    }

    /// Completed entry still inside its cleanup window.
    pub fn completed(&mut self, key: &K, now_ms: u64) -> Option<&mut V> {
        let cleanup_delay_ms = self.cleanup_delay_ms;
        let entry = self.entries.get_mut(key)?;
        let completed_at = entry.completed_at_ms?;
        (now_ms < completed_at.saturating_add(cleanup_delay_ms)).then_some(&mut entry.value)
    }

    /// Drop `key` regardless of state.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|entry| entry.value)
    }

    /// Drop expired entries. Returns the entries that timed out without a response; completed
    /// entries past their cleanup window are dropped silently.
    pub fn sweep(&mut self, now_ms: u64) -> Vec<(K, V)> {
        let cleanup_delay_ms = self.cleanup_delay_ms;
        let expired: Vec<K> = self
            .entries
            .iter()
            .filter(|(_, entry)| match entry.completed_at_ms {
                Some(at) => now_ms >= at.saturating_add(cleanup_delay_ms),
                None => now_ms >= entry.deadline_ms,
            })
            .map(|(key, _)| key.clone())
            .collect();

        let mut timed_out = Vec::new();
        for key in expired {
            if let Some(entry) = self.entries.remove(&key) {
                if entry.completed_at_ms.is_none() {
                    timed_out.push((key, entry.value));
                }
            }
        }
        timed_out
    }
}

impl<V> RequestCache<u16, V> {
    /// Insert under a random identifier not currently in use. `None` when every identifier is taken.
    pub fn claim<R: Rng + ?Sized>(&mut self, rng: &mut R, value: V, now_ms: u64) -> Option<u16> {
        if self.entries.len() > usize::from(u16::MAX) {
            return None;
        }
        loop {
            let id: u16 = rng.gen();
            if !self.entries.contains_key(&id) {
                self.insert(id, value, now_ms);
                return Some(id);
            }
        }
    }
}
