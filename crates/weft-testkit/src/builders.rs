//! Signed message builders.

use crate::crypto::DeterministicCrypto;
use std::sync::Arc;
use weft_core::{
    CommunityId, GlobalTime, MessageCatalog, MessageKind, MessageMeta, PublicKey,
    ResolutionPolicy, SessionId, SyncDirection, WireConfig,
};
use weft_wire::{Body, Codec, CommunityHeader, Decoded, Header, SessionHeader, StoredMessage};

/// Linear by default, switchable to public. Undoable.
pub const TEXT: MessageKind = MessageKind::Application(0x01);
/// Sequenced, public, synced newest first.
pub const FEED: MessageKind = MessageKind::Application(0x02);
/// Below the sync priority floor.
pub const PRESENCE: MessageKind = MessageKind::Application(0x03);

/// Deterministic public key for `seed`.
pub fn member_key(seed: u8) -> PublicKey {
    PublicKey::new(vec![seed; 32])
}

/// Built-in kinds plus `TEXT`, `FEED` and `PRESENCE`.
pub fn test_catalog() -> MessageCatalog {
    MessageCatalog::with_builtins()
        .with(
            MessageMeta::application(0x01, "text")
                .with_resolution(vec![ResolutionPolicy::Linear, ResolutionPolicy::Public]),
        )
        .and_then(|catalog| {
            catalog.with(
                MessageMeta::application(0x02, "feed")
                    .with_sequence()
                    .with_direction(SyncDirection::Descending)
                    .with_resolution(vec![ResolutionPolicy::Public]),
            )
        })
        .and_then(|catalog| {
            catalog.with(
                MessageMeta::application(0x03, "presence")
                    .with_priority(16)
                    .with_resolution(vec![ResolutionPolicy::Public]),
            )
        })
        .expect("test catalog is well formed")
}

/// Encodes and signs messages for one community.
#[derive(Debug, Clone)]
pub struct MessageFactory {
    codec: Codec,
    crypto: DeterministicCrypto,
}

impl MessageFactory {
    pub fn new(community: CommunityId, catalog: Arc<MessageCatalog>) -> Self {
        Self::with_config(community, catalog, WireConfig::default())
    }

    pub fn with_config(
        community: CommunityId,
        catalog: Arc<MessageCatalog>,
        config: WireConfig,
    ) -> Self {
        let crypto = DeterministicCrypto::new(config.signature_length);
        Self {
            codec: Codec::new(community, catalog, config),
            crypto,
        }
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    pub fn crypto(&self) -> &DeterministicCrypto {
        &self.crypto
    }

    /// Community-scoped message signed by `key`.
    pub fn community(
        &self,
        key: &PublicKey,
        global_time: GlobalTime,
        sequence: Option<u32>,
        body: Body,
    ) -> Decoded {
        let header = Header::Community(CommunityHeader {
            community: self.codec.community(),
            member: key.member_id(),
            global_time,
            sequence,
        });
        self.codec
            .encode_signed(header, body, &self.crypto, key)
            .expect("community message encodes")
    }

    /// Session-scoped message signed by `key`.
    pub fn session(
        &self,
        key: &PublicKey,
        session: u32,
        global_time: GlobalTime,
        body: Body,
    ) -> Decoded {
        let header = Header::Session(SessionHeader {
            session: SessionId(session),
            global_time,
        });
        self.codec
            .encode_signed(header, body, &self.crypto, key)
            .expect("session message encodes")
    }

    /// Application message with opaque `data`.
    pub fn application(
        &self,
        key: &PublicKey,
        kind: MessageKind,
        global_time: GlobalTime,
        sequence: Option<u32>,
        data: &[u8],
    ) -> Decoded {
        let tag = kind.tag();
        self.community(
            key,
            global_time,
            sequence,
            Body::Application {
                tag,
                data: data.to_vec(),
            },
        )
    }
}

/// Store record for an already encoded community or identity message.
pub fn stored(decoded: &Decoded) -> StoredMessage {
    StoredMessage::from_decoded(decoded).expect("storable message")
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::CryptoEffects;

    #[test]
    fn test_factory_output_decodes_and_verifies() {
        let factory = MessageFactory::new(CommunityId::from_seed(4), Arc::new(test_catalog()));
        let key = member_key(9);
        let decoded = factory.application(&key, TEXT, 12, None, b"hi");

        let again = factory.codec().decode(&decoded.packet).unwrap();
        assert_eq!(again.message, decoded.message);
        assert!(factory
            .crypto()
            .verify(again.signed_prefix(), again.signature(), &key));
        assert_eq!(stored(&again).member, key.member_id());
    }
}
