//! Accepted-message store contract.
//!
//! The store is the single source of truth for "do we have message X". Persistence is an
//! external concern; the engines only need keyed lookups, range scans and an undone flag.

use crate::message::{Body, Decoded};
use weft_core::{CommunityId, GlobalTime, MemberId, MessageKind, MessageRef, WeftError};

/// An accepted message as kept by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub member: MemberId,
    pub kind: MessageKind,
    pub global_time: GlobalTime,
    pub sequence: Option<u32>,
    pub packet: Vec<u8>,
    /// Length of the signed prefix of `packet`.
    pub signed_len: usize,
    /// Retracted by an undo record; kept for proofs and resynchronization.
    pub undone: bool,
}

impl StoredMessage {
    /// Store record for a decoded message. Community-scoped messages are keyed by their signer,
    /// identity messages by the member of the key they carry. Other session-scoped messages are
    /// never stored.
    pub fn from_decoded(decoded: &Decoded) -> Option<Self> {
        let message = &decoded.message;
        let member = match (&message.body, message.member()) {
            (_, Some(member)) => member,
            (Body::Identity { public_key }, None) => public_key.member_id(),
            _ => return None,
        };
        Some(Self {
            member,
            kind: message.kind(),
            global_time: message.global_time(),
            sequence: message.sequence(),
            packet: decoded.packet.clone(),
            signed_len: decoded.signed_len,
            undone: false,
        })
    }

    pub fn reference(&self) -> MessageRef {
        MessageRef::new(self.member, self.global_time)
    }

    pub fn signed_prefix(&self) -> &[u8] {
        &self.packet[..self.signed_len.min(self.packet.len())]
    }

    pub fn is_identity(&self) -> bool {
        self.kind == MessageKind::Identity
    }
}

/// Failure inside a store implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("store backend failure: {0}")]
    Backend(String),
}

impl weft_core::ProtocolErrorCode for StoreError {
    fn code(&self) -> &'static str {
        "store_backend"
    }
}

impl From<StoreError> for WeftError {
    fn from(err: StoreError) -> Self {
        WeftError::storage(err.to_string())
    }
}

/// Keyed access to accepted messages.
///
/// Community messages are unique by `(community, member, global time)`. Identity records live in
/// a namespace of their own, also keyed by `(community, member, global time)`, so an identity
/// never collides with a community message its member authored at the same global time. Identity
/// records are written with [`MessageStore::put_identity`] and read with
/// [`MessageStore::identities`]; the other methods never see them.
///
/// Implementations provide their own interior synchronization; every method takes `&self`.
pub trait MessageStore: Send + Sync {
    fn get(
        &self,
        community: &CommunityId,
        member: &MemberId,
        global_time: GlobalTime,
    ) -> Option<StoredMessage>;

    /// Insert a community message. Returns `false` if the key is already present.
    fn put(&self, community: &CommunityId, message: StoredMessage) -> Result<bool, StoreError>;

    /// Insert an identity record. Returns `false` if the member already has one at this global
    /// time.
    fn put_identity(
        &self,
        community: &CommunityId,
        message: StoredMessage,
    ) -> Result<bool, StoreError>;

    /// Identity records of `member`, ascending by global time.
    fn identities(&self, community: &CommunityId, member: &MemberId) -> Vec<StoredMessage>;

    /// Messages of every kind with `low <= global_time <= high`, ascending by global time.
    fn scan_range(
        &self,
        community: &CommunityId,
        low: GlobalTime,
        high: GlobalTime,
    ) -> Vec<StoredMessage>;

    /// Messages of one kind from one member, ascending by global time.
    fn scan_member_kind(
        &self,
        community: &CommunityId,
        member: &MemberId,
        kind: MessageKind,
    ) -> Vec<StoredMessage>;

    /// Set the undone flag. Returns `false` if the message is unknown.
    fn set_undone(
        &self,
        community: &CommunityId,
        member: &MemberId,
        global_time: GlobalTime,
        undone: bool,
    ) -> bool;

    /// Key offered to bloom filters for this message.
    fn fingerprint(&self, message: &StoredMessage) -> Vec<u8> {
        message.packet.clone()
    }
}

impl<T: MessageStore + ?Sized> MessageStore for std::sync::Arc<T> {
    fn get(
        &self,
        community: &CommunityId,
        member: &MemberId,
        global_time: GlobalTime,
    ) -> Option<StoredMessage> {
        (**self).get(community, member, global_time)
    }

    fn put(&self, community: &CommunityId, message: StoredMessage) -> Result<bool, StoreError> {
        (**self).put(community, message)
    }

    fn put_identity(
        &self,
        community: &CommunityId,
        message: StoredMessage,
    ) -> Result<bool, StoreError> {
        (**self).put_identity(community, message)
    }

    fn identities(&self, community: &CommunityId, member: &MemberId) -> Vec<StoredMessage> {
        (**self).identities(community, member)
    }

    fn scan_range(
        &self,
        community: &CommunityId,
        low: GlobalTime,
        high: GlobalTime,
    ) -> Vec<StoredMessage> {
        (**self).scan_range(community, low, high)
    }

    fn scan_member_kind(
        &self,
        community: &CommunityId,
        member: &MemberId,
        kind: MessageKind,
    ) -> Vec<StoredMessage> {
        (**self).scan_member_kind(community, member, kind)
    }

    fn set_undone(
        &self,
        community: &CommunityId,
        member: &MemberId,
        global_time: GlobalTime,
        undone: bool,
    ) -> bool {
        (**self).set_undone(community, member, global_time, undone)
    }

    fn fingerprint(&self, message: &StoredMessage) -> Vec<u8> {
        (**self).fingerprint(message)
    }
}
