//! In-memory message store.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use weft_core::{CommunityId, GlobalTime, MemberId, MessageKind};
use weft_wire::{MessageStore, StoreError, StoredMessage};

type Key = (CommunityId, GlobalTime, MemberId);
type IdentityKey = (CommunityId, MemberId, GlobalTime);

/// `MessageStore` over a `BTreeMap` ordered by `(community, global time, member)`, with identity
/// records in a separate map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    messages: RwLock<BTreeMap<Key, StoredMessage>>,
    identities: RwLock<BTreeMap<IdentityKey, StoredMessage>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.messages.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.read().is_empty()
    }

    /// Number of identity records.
    pub fn identity_len(&self) -> usize {
        self.identities.read().len()
    }

    /// Insert without the duplicate check, replacing any existing entry. Identity records go to
    /// their own namespace.
    pub fn insert(&self, community: CommunityId, message: StoredMessage) {
        if message.is_identity() {
            self.identities
                .write()
                .insert((community, message.member, message.global_time), message);
        } else {
            self.messages
                .write()
                .insert((community, message.global_time, message.member), message);
        }
    }
}

impl MessageStore for MemoryStore {
    fn get(
        &self,
        community: &CommunityId,
        member: &MemberId,
        global_time: GlobalTime,
    ) -> Option<StoredMessage> {
        self.messages
            .read()
            .get(&(*community, global_time, *member))
            .cloned()
    }

    fn put(&self, community: &CommunityId, message: StoredMessage) -> Result<bool, StoreError> {
        let mut messages = self.messages.write();
        let key = (*community, message.global_time, message.member);
        if messages.contains_key(&key) {
            return Ok(false);
        }
        messages.insert(key, message);
        Ok(true)
    }

    fn put_identity(
        &self,
        community: &CommunityId,
        message: StoredMessage,
    ) -> Result<bool, StoreError> {
        let mut identities = self.identities.write();
        let key = (*community, message.member, message.global_time);
        if identities.contains_key(&key) {
            return Ok(false);
        }
        identities.insert(key, message);
        Ok(true)
    }

    fn identities(&self, community: &CommunityId, member: &MemberId) -> Vec<StoredMessage> {
        self.identities
            .read()
            .range((*community, *member, GlobalTime::MIN)..=(*community, *member, GlobalTime::MAX))
            .map(|(_, message)| message.clone())
            .collect()
    }

    fn scan_range(
        &self,
        community: &CommunityId,
        low: GlobalTime,
        high: GlobalTime,
    ) -> Vec<StoredMessage> {
        if low > high {
            return Vec::new();
        }
        let start = (*community, low, MemberId::new([0; 20]));
        let end = (*community, high, MemberId::new([0xFF; 20]));
        self.messages
            .read()
            .range(start..=end)
            .map(|(_, message)| message.clone())
            .collect()
    }

    fn scan_member_kind(
        &self,
        community: &CommunityId,
        member: &MemberId,
        kind: MessageKind,
    ) -> Vec<StoredMessage> {
        self.messages
            .read()
            .iter()
            .filter(|((c, _, m), message)| c == community && m == member && message.kind == kind)
            .map(|(_, message)| message.clone())
            .collect()
    }

    fn set_undone(
        &self,
        community: &CommunityId,
        member: &MemberId,
        global_time: GlobalTime,
        undone: bool,
    ) -> bool {
        match self
            .messages
            .write()
            .get_mut(&(*community, global_time, *member))
        {
            Some(message) => {
                message.undone = undone;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(member: MemberId, global_time: GlobalTime) -> StoredMessage {
        StoredMessage {
            member,
            kind: MessageKind::Application(1),
            global_time,
            sequence: None,
            packet: vec![global_time as u8; 4],
            signed_len: 2,
            undone: false,
        }
    }

    #[test]
    fn test_put_rejects_duplicate_key() {
        let store = MemoryStore::new();
        let community = CommunityId::from_seed(1);
        let alice = MemberId::from_seed(1);
        assert!(store.put(&community, stored(alice, 5)).unwrap());
        assert!(!store.put(&community, stored(alice, 5)).unwrap());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_identity_does_not_collide_with_message() {
        let store = MemoryStore::new();
        let community = CommunityId::from_seed(1);
        let alice = MemberId::from_seed(1);
        let identity = StoredMessage {
            kind: MessageKind::Identity,
            ..stored(alice, 5)
        };

        assert!(store.put_identity(&community, identity.clone()).unwrap());
        assert!(!store.put_identity(&community, identity).unwrap());
        assert!(store.put(&community, stored(alice, 5)).unwrap());

        assert_eq!(store.identities(&community, &alice).len(), 1);
        assert_eq!(store.get(&community, &alice, 5).unwrap().kind, MessageKind::Application(1));
        assert_eq!(store.scan_range(&community, 1, 10).len(), 1);
        assert!(store.identities(&CommunityId::from_seed(2), &alice).is_empty());
    }

    #[test]
    fn test_scan_range_is_inclusive_and_scoped() {
        let store = MemoryStore::new();
        let community = CommunityId::from_seed(1);
        let other = CommunityId::from_seed(2);
        for global_time in 1..=10 {
            store.insert(community, stored(MemberId::from_seed(1), global_time));
        }
        store.insert(other, stored(MemberId::from_seed(1), 5));

        let times: Vec<_> = store
            .scan_range(&community, 3, 6)
            .iter()
            .map(|message| message.global_time)
            .collect();
        assert_eq!(times, vec![3, 4, 5, 6]);
    }

    #[test]
    fn test_set_undone_keeps_message() {
        let store = MemoryStore::new();
        let community = CommunityId::from_seed(1);
        let alice = MemberId::from_seed(1);
        store.insert(community, stored(alice, 5));

        assert!(store.set_undone(&community, &alice, 5, true));
        assert!(store.get(&community, &alice, 5).unwrap().undone);
        assert!(!store.set_undone(&community, &alice, 6, true));
    }
}
