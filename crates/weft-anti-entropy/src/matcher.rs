//! # Sync Matcher
//!
//! Answers the sync window of an introduction request: which accepted messages the requester
//! probably lacks, in what order, and how many bytes of them to send.
//!
//! Candidates are messages that
//! - fall inside the window's range and modulo sieve,
//! - are not undone,
//! - belong to a catalog kind with priority above `min_sync_priority`,
//! - are not reported present by the requester's bloom filter.
//!
//! Order is priority descending, then global time in the kind's sync direction, then message
//! identifier, then signed-prefix bytes. Iteration stops after the packet that exhausts the byte
//! budget, so a caller that stops early loses nothing: the rest is eligible next round.

use std::cmp::Reverse;
use std::sync::Arc;
use weft_core::{CommunityId, GlobalTime, MessageCatalog, SyncConfig, SyncDirection};
use weft_wire::{BloomProbe, MessageStore, StoredMessage, SyncWindow};

type SortKey = (Reverse<u8>, GlobalTime, u8, Vec<u8>);

/// Selects sync candidates for one community.
#[derive(Debug, Clone)]
pub struct SyncMatcher {
    community: CommunityId,
    catalog: Arc<MessageCatalog>,
    config: SyncConfig,
}

impl SyncMatcher {
    pub fn new(community: CommunityId, catalog: Arc<MessageCatalog>, config: SyncConfig) -> Self {
        Self {
            community,
            catalog,
            config,
        }
    }

    pub fn community(&self) -> &CommunityId {
        &self.community
    }

    /// `min(responder limit, requester limit)`; `None` means the requester set no limit.
    pub fn budget(&self, requester_limit: Option<usize>) -> usize {
        requester_limit.map_or(self.config.response_byte_limit, |limit| {
            limit.min(self.config.response_byte_limit)
        })
    }

    /// Whether messages of this kind are offered at all.
    pub fn is_syncable(&self, message: &StoredMessage) -> bool {
        !message.undone
            && self
                .catalog
                .get(message.kind)
                .is_some_and(|meta| meta.priority > self.config.min_sync_priority)
    }

    /// Ordered, budget-bounded candidates for `window`.
    pub fn candidates<'a, S, P>(
        &self,
        store: &'a S,
        probe: &'a P,
        window: &'a SyncWindow,
        current: GlobalTime,
        requester_limit: Option<usize>,
    ) -> Candidates<'a, S, P>
    where
        S: MessageStore + ?Sized,
        P: BloomProbe + ?Sized,
    {
        let high = window.effective_high(current);
        let mut matched: Vec<(SortKey, StoredMessage)> = store
            .scan_range(&self.community, window.time_low, high)
            .into_iter()
            .filter(|message| window.contains(message.global_time, current))
            .filter(|message| self.is_syncable(message))
            .map(|message| (self.sort_key(&message), message))
            .collect();
        matched.sort_by(|a, b| a.0.cmp(&b.0));

        tracing::debug!(
            community = %self.community,
            low = window.time_low,
            high,
            modulo = window.modulo,
            offset = window.offset,
            matched = matched.len(),
            "sync window evaluated"
        );

        let budget = self.budget(requester_limit);
        Candidates {
            store,
            probe,
            window,
            matched: matched.into_iter(),
            remaining: budget,
            exhausted: budget == 0,
        }
    }

    /// Packets answering `window`, at most one budget's worth.
    pub fn respond<S, P>(
        &self,
        store: &S,
        probe: &P,
        window: &SyncWindow,
        current: GlobalTime,
        requester_limit: Option<usize>,
    ) -> Vec<Vec<u8>>
    where
        S: MessageStore + ?Sized,
        P: BloomProbe + ?Sized,
    {
        self.candidates(store, probe, window, current, requester_limit)
            .map(|message| message.packet)
            .collect()
    }

    fn sort_key(&self, message: &StoredMessage) -> SortKey {
        let (priority, direction) = self
            .catalog
            .get(message.kind)
            .map_or((0, SyncDirection::Ascending), |meta| {
                (meta.priority, meta.direction)
            });
        let time = match direction {
            SyncDirection::Ascending => message.global_time,
            SyncDirection::Descending => GlobalTime::MAX - message.global_time,
        };
        (
            Reverse(priority),
            time,
            message.kind.tag(),
            message.signed_prefix().to_vec(),
        )
    }
}

/// Lazy candidate sequence returned by [`SyncMatcher::candidates`].
pub struct Candidates<'a, S: ?Sized, P: ?Sized> {
    store: &'a S,
    probe: &'a P,
    window: &'a SyncWindow,
    matched: std::vec::IntoIter<(SortKey, StoredMessage)>,
    remaining: usize,
    exhausted: bool,
}

impl<S, P> Candidates<'_, S, P>
where
    S: MessageStore + ?Sized,
    P: BloomProbe + ?Sized,
{
    /// Bytes left before the budget is reached.
    pub fn remaining_budget(&self) -> usize {
        self.remaining
    }
}

impl<S, P> Iterator for Candidates<'_, S, P>
where
    S: MessageStore + ?Sized,
    P: BloomProbe + ?Sized,
{
    type Item = StoredMessage;

    fn next(&mut self) -> Option<StoredMessage> {
        if self.exhausted {
            return None;
        }
        for (_, message) in self.matched.by_ref() {
            let fingerprint = self.store.fingerprint(&message);
            if self.probe.contains(&self.window.bloom, &fingerprint) {
                continue;
            }
            self.remaining = self.remaining.saturating_sub(message.packet.len());
            if self.remaining == 0 {
                self.exhausted = true;
            }
            return Some(message);
        }
        self.exhausted = true;
        None
    }
}
