//! Outgoing sync windows.
//!
//! The requester covers its whole history. When more syncable messages exist than one filter holds,
//! the history is split into `modulo` interleaved slices and one slice, picked at random, is sent.
//! Successive requests therefore cover every slice over time.

use crate::matcher::SyncMatcher;
use rand::Rng;
use weft_core::GlobalTime;
use weft_wire::{BloomBuilder, MessageStore, SyncWindow};

impl SyncMatcher {
    /// Window over `[1, current]` whose filter holds every local syncable message in the chosen
    /// modulo slice.
    pub fn claim_window<S, B, R>(
        &self,
        store: &S,
        builder: &B,
        rng: &mut R,
        current: GlobalTime,
    ) -> SyncWindow
    where
        S: MessageStore + ?Sized,
        B: BloomBuilder + ?Sized,
        R: Rng + ?Sized,
    {
        let local: Vec<_> = store
            .scan_range(self.community(), 1, current)
            .into_iter()
            .filter(|message| self.is_syncable(message))
            .collect();

        let capacity = builder.capacity().max(1);
        let slices = local.len().div_ceil(capacity).clamp(1, usize::from(u16::MAX));
        let modulo = u16::try_from(slices).unwrap_or(u16::MAX);
        let offset = if modulo > 1 {
            rng.gen_range(0..modulo)
        } else {
            0
        };

        let keys: Vec<Vec<u8>> = local
            .iter()
            .filter(|message| message.global_time % u64::from(modulo) == u64::from(offset))
            .map(|message| store.fingerprint(message))
            .collect();
        let prefix = rng.gen::<u8>();

        tracing::debug!(
            community = %self.community(),
            local = local.len(),
            modulo,
            offset,
            keys = keys.len(),
            "sync window claimed"
        );

        SyncWindow {
            time_low: 1,
            time_high: 0,
            modulo,
            offset,
            bloom: builder.build(prefix, &keys),
        }
    }
}
