//! Shared handle for driving one community from several tasks.
//!
//! The layer sits behind an `async_lock::RwLock`: acceptance takes the write half, sync responses
//! and inspection take the read half. The write half is the only ordering point, so two sequenced
//! messages of one `(member, kind)` are checked and recorded one after the other.

use crate::layer::{MessageLayer, SweepReport};
use crate::outcome::{Dispatch, Outbound};
use async_lock::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::Arc;
use weft_core::{CryptoEffects, WeftError};
use weft_wire::{Address, BloomBuilder, BloomProbe, Body, Decoded, MessageStore, SyncWindow};

pub struct SharedMessageLayer<S, C, B> {
    layer: Arc<RwLock<MessageLayer<S, C, B>>>,
}

impl<S, C, B> Clone for SharedMessageLayer<S, C, B> {
    fn clone(&self) -> Self {
        Self {
            layer: Arc::clone(&self.layer),
        }
    }
}

impl<S, C, B> SharedMessageLayer<S, C, B>
where
    S: MessageStore,
    C: CryptoEffects,
    B: BloomProbe + BloomBuilder,
{
    pub fn new(layer: MessageLayer<S, C, B>) -> Self {
        Self {
            layer: Arc::new(RwLock::new(layer)),
        }
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, MessageLayer<S, C, B>> {
        self.layer.read().await
    }

    pub async fn write(&self) -> RwLockWriteGuard<'_, MessageLayer<S, C, B>> {
        self.layer.write().await
    }

    pub async fn handle_packet(&self, packet: &[u8], source: Address, now_ms: u64) -> Dispatch {
        self.layer.write().await.handle_packet(packet, source, now_ms)
    }

    pub async fn create(&self, body: Body, now_ms: u64) -> Result<Decoded, WeftError> {
        self.layer.write().await.create(body, now_ms)
    }

    pub async fn take_step(&self, now_ms: u64) -> Result<Option<Outbound>, WeftError> {
        self.layer.write().await.take_step(now_ms)
    }

    pub async fn sync_response(&self, window: &SyncWindow) -> Vec<Vec<u8>> {
        self.layer.read().await.sync_response(window)
    }

    pub async fn sweep(&self, now_ms: u64) -> SweepReport {
        self.layer.write().await.sweep(now_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::CommunitySetup;
    use weft_core::{CommunityId, SessionId, WeftConfig};
    use weft_rendezvous::LocalAddresses;
    use weft_testkit::{
        member_key, seeded_rng, test_catalog, DeterministicCrypto, MemoryStore, MessageFactory,
        Sha1Bloom, FEED,
    };

    type Layer = SharedMessageLayer<MemoryStore, DeterministicCrypto, Sha1Bloom>;

    fn shared(community: CommunityId) -> Layer {
        let address = Address::new([10, 0, 0, 1].into(), 7000);
        let setup = CommunitySetup {
            community,
            root: member_key(0xAA),
            catalog: Arc::new(test_catalog()),
            key: member_key(0x01),
            session: SessionId(1),
            local: LocalAddresses::new(address, address),
            config: WeftConfig::default(),
        };
        let layer = MessageLayer::new(
            setup,
            MemoryStore::new(),
            DeterministicCrypto::new(64),
            Sha1Bloom::default(),
            seeded_rng(1),
        )
        .unwrap();
        SharedMessageLayer::new(layer)
    }

    #[tokio::test]
    async fn test_concurrent_sequenced_packets_all_accepted() {
        let community = CommunityId::from_seed(0x31);
        let layer = shared(community);
        let factory = MessageFactory::new(community, Arc::new(test_catalog()));
        let author = member_key(0x02);
        layer.write().await.register_key(author.clone());

        let first = factory.application(&author, FEED, 10, Some(1), b"one");
        let second = factory.application(&author, FEED, 11, Some(2), b"two");
        let source = Address::new([10, 0, 0, 2].into(), 7000);

        // The later sequence number is handled first and waits for the earlier one.
        let (late, early) = tokio::join!(
            layer.handle_packet(&second.packet, source, 0),
            layer.handle_packet(&first.packet, source, 0),
        );
        assert_eq!(late.stored().count(), 0);
        assert_eq!(early.stored().count(), 2);
        assert_eq!(layer.read().await.held_len(), 0);
        assert_eq!(
            layer.read().await.timeline().highest_sequence(&author.member_id(), FEED),
            2
        );
    }

    #[tokio::test]
    async fn test_create_through_shared_handle() {
        let layer = shared(CommunityId::from_seed(0x32));
        let body = Body::Application {
            tag: FEED.tag(),
            data: b"hello".to_vec(),
        };
        let first = layer.create(body.clone(), 0).await.unwrap();
        let second = layer.create(body, 0).await.unwrap();
        assert_eq!(first.message.sequence(), Some(1));
        assert_eq!(second.message.sequence(), Some(2));
    }
}
