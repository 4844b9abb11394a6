//! Packet-level behaviour of the community message layer: acceptance, held messages and their
//! follow-up requests, collections, responders, the walker handshake and local authoring.

use assert_matches::assert_matches;
use std::sync::Arc;
use weft_core::{
    CommunityId, Disposition, MessageKind, MessageRef, Permission, PublicKey, SessionId,
    WeftConfig, WeftError,
};
use weft_protocol::{CommunitySetup, Dispatch, MessageLayer, Outcome};
use weft_rendezvous::{ExchangeState, LocalAddresses};
use weft_resolver::SignatureEndorser;
use weft_testkit::{
    init_tracing, member_key, seeded_rng, stored, test_catalog, DeterministicCrypto, MemoryStore,
    MessageFactory, Sha1Bloom, FEED, PRESENCE, TEXT,
};
use weft_wire::{
    Address, Body, Decoded, DestroyDegree, MessageStore, MissingSequence, PermissionGrant,
};

type Layer = MessageLayer<Arc<MemoryStore>, DeterministicCrypto, Sha1Bloom>;

struct Peer {
    layer: Layer,
    store: Arc<MemoryStore>,
    address: Address,
}

fn community() -> CommunityId {
    CommunityId::from_seed(0x57)
}

fn root() -> PublicKey {
    member_key(0xAA)
}

fn alice_key() -> PublicKey {
    member_key(0x0A)
}

fn bob_key() -> PublicKey {
    member_key(0x0B)
}

fn carol_key() -> PublicKey {
    member_key(0x0C)
}

fn addr(octet: u8) -> Address {
    Address::new([10, 0, 0, octet].into(), 7000)
}

fn peer(key: PublicKey, octet: u8) -> Peer {
    peer_with(key, octet, WeftConfig::default())
}

fn peer_with(key: PublicKey, octet: u8, config: WeftConfig) -> Peer {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let setup = CommunitySetup {
        community: community(),
        root: root(),
        catalog: Arc::new(test_catalog()),
        key,
        session: SessionId(u32::from(octet)),
        local: LocalAddresses::new(addr(octet), addr(octet)),
        config,
    };
    let layer = MessageLayer::new(
        setup,
        Arc::clone(&store),
        DeterministicCrypto::new(64),
        Sha1Bloom::default(),
        seeded_rng(u64::from(octet)),
    )
    .unwrap();
    Peer {
        layer,
        store,
        address: addr(octet),
    }
}

fn factory() -> MessageFactory {
    MessageFactory::new(community(), Arc::new(test_catalog()))
}

fn grant(key: &PublicKey, kind: MessageKind, permissions: &[Permission]) -> Body {
    Body::Authorize(vec![PermissionGrant {
        public_key: key.clone(),
        permissions: vec![(kind, permissions.iter().copied().collect())],
    }])
}

fn identity(key: &PublicKey, global_time: u64) -> Decoded {
    factory().session(
        key,
        0,
        global_time,
        Body::Identity {
            public_key: key.clone(),
        },
    )
}

fn body_of(peer: &Peer, packet: &[u8]) -> Body {
    peer.layer.codec().decode(packet).unwrap().message.body
}

/// The one packet in `dispatch` addressed to `destination`.
fn only_packet_to(dispatch: &Dispatch, destination: Address) -> Vec<u8> {
    let packets: Vec<&[u8]> = dispatch.sent_to(destination).collect();
    assert_eq!(packets.len(), 1);
    packets[0].to_vec()
}

fn stored_at(peer: &Peer, key: &PublicKey, global_time: u64) -> bool {
    peer.store
        .get(&community(), &key.member_id(), global_time)
        .is_some()
}

// =============================================================================
// Held messages and follow-up requests
// =============================================================================

#[test]
fn unknown_signer_is_held_until_identity_arrives() {
    let mut bob = peer(bob_key(), 2);
    let presence = factory().application(&carol_key(), PRESENCE, 7, None, b"here");

    let dispatch = bob.layer.handle_packet(&presence.packet, addr(3), 0);
    assert_eq!(
        dispatch.outcomes,
        vec![Outcome::Held {
            kind: PRESENCE,
            code: "dispatch_unknown_signer",
        }]
    );
    assert_eq!(dispatch.outbound.len(), 1);
    assert_eq!(dispatch.outbound[0].destination, addr(3));
    assert_matches!(
        body_of(&bob, &dispatch.outbound[0].packet),
        Body::MissingIdentity { member } if member == carol_key().member_id()
    );

    // Same packet again: still held once, no second request.
    let again = bob.layer.handle_packet(&presence.packet, addr(3), 10);
    assert!(again.outbound.is_empty());
    assert_eq!(bob.layer.held_len(), 1);

    let dispatch = bob.layer.handle_packet(&identity(&carol_key(), 3).packet, addr(3), 20);
    assert_eq!(dispatch.stored().count(), 2);
    assert_eq!(bob.layer.held_len(), 0);
    assert!(stored_at(&bob, &carol_key(), 7));
    assert!(bob.layer.known_key(&carol_key().member_id()).is_some());
}

#[test]
fn missing_permission_requests_proof() {
    let mut bob = peer(bob_key(), 2);
    bob.layer.register_key(alice_key());
    let text = factory().application(&alice_key(), TEXT, 10, None, b"hi");

    let dispatch = bob.layer.handle_packet(&text.packet, addr(1), 0);
    assert_eq!(
        dispatch.outcomes,
        vec![Outcome::Held {
            kind: TEXT,
            code: "authorization_missing_permission",
        }]
    );
    assert_matches!(
        body_of(&bob, &dispatch.outbound[0].packet),
        Body::MissingProof { member, global_time: 10 } if member == alice_key().member_id()
    );

    let authorize = factory().community(
        &root(),
        5,
        Some(1),
        grant(&alice_key(), TEXT, &[Permission::Permit]),
    );
    let dispatch = bob.layer.handle_packet(&authorize.packet, addr(1), 100);
    assert_eq!(
        dispatch.stored().copied().collect::<Vec<_>>(),
        vec![
            MessageRef::new(root().member_id(), 5),
            MessageRef::new(alice_key().member_id(), 10),
        ]
    );
    assert!(bob.layer.tracker().is_empty());
}

#[test]
fn sequence_gap_requests_missing_range() {
    let mut bob = peer(bob_key(), 2);
    let first = factory().community(
        &root(),
        5,
        Some(1),
        grant(&bob_key(), TEXT, &[Permission::Permit]),
    );
    let second = factory().community(
        &root(),
        6,
        Some(2),
        grant(&alice_key(), TEXT, &[Permission::Permit]),
    );

    let dispatch = bob.layer.handle_packet(&second.packet, addr(9), 0);
    assert_eq!(
        dispatch.outcomes,
        vec![Outcome::Held {
            kind: MessageKind::Authorize,
            code: "sequence_gap",
        }]
    );
    assert_matches!(
        body_of(&bob, &dispatch.outbound[0].packet),
        Body::MissingSequence(MissingSequence {
            member,
            kind: MessageKind::Authorize,
            low: 1,
            high: 1,
            ..
        }) if member == root().member_id()
    );

    let dispatch = bob.layer.handle_packet(&first.packet, addr(9), 50);
    assert_eq!(dispatch.stored().count(), 2);
    assert_eq!(
        bob.layer
            .timeline()
            .highest_sequence(&root().member_id(), MessageKind::Authorize),
        2
    );
}

#[test]
fn undo_of_unknown_target_requests_message() {
    let mut bob = peer(bob_key(), 2);
    let text = factory().application(&root(), TEXT, 3, None, b"oops");
    let undo = factory().community(&root(), 4, Some(1), Body::UndoOwn { global_time: 3 });

    let dispatch = bob.layer.handle_packet(&undo.packet, addr(9), 0);
    assert_eq!(
        dispatch.outcomes,
        vec![Outcome::Held {
            kind: MessageKind::UndoOwn,
            code: "undo_target_unknown",
        }]
    );
    assert_matches!(
        body_of(&bob, &dispatch.outbound[0].packet),
        Body::MissingMessage(request)
            if request.public_key == root() && request.global_times == vec![3]
    );

    let dispatch = bob.layer.handle_packet(&text.packet, addr(9), 10);
    assert_eq!(dispatch.stored().count(), 2);
    let target = bob
        .store
        .get(&community(), &root().member_id(), 3)
        .unwrap();
    assert!(target.undone);
}

#[test]
fn identity_at_same_global_time_releases_held_message() {
    let mut bob = peer(bob_key(), 2);
    let presence = factory().application(&carol_key(), PRESENCE, 7, None, b"here");
    bob.layer.handle_packet(&presence.packet, addr(3), 0);
    assert_eq!(bob.layer.held_len(), 1);

    let dispatch = bob.layer.handle_packet(&identity(&carol_key(), 7).packet, addr(3), 10);
    assert_eq!(
        dispatch.outcomes,
        vec![
            Outcome::Stored {
                kind: MessageKind::Identity,
                reference: MessageRef::new(carol_key().member_id(), 7),
            },
            Outcome::Stored {
                kind: PRESENCE,
                reference: MessageRef::new(carol_key().member_id(), 7),
            },
        ]
    );
    assert_eq!(bob.layer.held_len(), 0);
    assert!(stored_at(&bob, &carol_key(), 7));
    assert_eq!(
        bob.store
            .identities(&community(), &carol_key().member_id())
            .len(),
        1
    );
}

#[test]
fn progress_wakes_only_matching_held_packets() {
    let mut bob = peer(bob_key(), 2);
    bob.layer.register_key(alice_key());
    let text = factory().application(&alice_key(), TEXT, 10, None, b"hi");
    let presence = factory().application(&carol_key(), PRESENCE, 7, None, b"here");
    bob.layer.handle_packet(&text.packet, addr(1), 0);
    bob.layer.handle_packet(&presence.packet, addr(3), 0);
    assert_eq!(bob.layer.held_len(), 2);

    let dispatch = bob.layer.handle_packet(&identity(&carol_key(), 3).packet, addr(3), 10);
    assert_eq!(
        dispatch.stored().copied().collect::<Vec<_>>(),
        vec![
            MessageRef::new(carol_key().member_id(), 3),
            MessageRef::new(carol_key().member_id(), 7),
        ]
    );
    assert!(dispatch
        .outcomes
        .iter()
        .all(|outcome| !matches!(outcome, Outcome::Rejected { kind: Some(TEXT), .. })));
    assert_eq!(bob.layer.held_len(), 1);
    assert!(!stored_at(&bob, &alice_key(), 10));
}

#[test]
fn held_packets_are_capped_per_source() {
    let mut config = WeftConfig::default();
    config.resolver.held_per_source = 2;
    config.resolver.held_limit = 4;
    let mut bob = peer_with(bob_key(), 2, config);
    let presences: Vec<Decoded> = (7..10)
        .map(|global_time| {
            factory().application(&carol_key(), PRESENCE, global_time, None, b"here")
        })
        .collect();

    let first = bob.layer.handle_packet(&presences[0].packet, addr(3), 0);
    assert_eq!(first.outbound.len(), 1);
    bob.layer.handle_packet(&presences[1].packet, addr(3), 1);
    let overflow = bob.layer.handle_packet(&presences[2].packet, addr(3), 2);
    assert_eq!(
        overflow.outcomes,
        vec![Outcome::Rejected {
            kind: Some(PRESENCE),
            code: "dispatch_hold_overflow",
            disposition: Disposition::Drop,
        }]
    );
    assert!(overflow.outbound.is_empty());
    assert_eq!(bob.layer.held_len(), 2);

    // Another sender still has room.
    let other = bob.layer.handle_packet(&presences[2].packet, addr(4), 3);
    assert_matches!(other.outcomes.as_slice(), [Outcome::Held { .. }]);
    assert_eq!(bob.layer.held_len(), 3);

    let dispatch = bob.layer.handle_packet(&identity(&carol_key(), 3).packet, addr(3), 10);
    assert_eq!(dispatch.stored().count(), 4);
    assert_eq!(bob.layer.held_len(), 0);
}

#[test]
fn expired_held_packets_are_swept() {
    let mut bob = peer(bob_key(), 2);
    let presence = factory().application(&carol_key(), PRESENCE, 7, None, b"here");
    bob.layer.handle_packet(&presence.packet, addr(3), 0);
    assert_eq!(bob.layer.held_len(), 1);

    let report = bob.layer.sweep(10_000);
    assert_eq!(report.dropped_held, 1);
    assert_eq!(report.expired_requests, 1);
    assert_eq!(bob.layer.held_len(), 0);
}

// =============================================================================
// Plain rejections
// =============================================================================

#[test]
fn duplicate_is_ignored() {
    let mut bob = peer(bob_key(), 2);
    let text = factory().application(&root(), TEXT, 3, None, b"once");
    assert_eq!(bob.layer.handle_packet(&text.packet, addr(9), 0).stored().count(), 1);

    let dispatch = bob.layer.handle_packet(&text.packet, addr(9), 1);
    assert_eq!(
        dispatch.outcomes,
        vec![Outcome::Rejected {
            kind: Some(TEXT),
            code: "dispatch_already_stored",
            disposition: Disposition::Ignore,
        }]
    );
}

#[test]
fn global_time_beyond_margin_is_dropped() {
    let mut bob = peer(bob_key(), 2);
    let far = factory().application(&root(), PRESENCE, 20_000, None, b"later");
    let dispatch = bob.layer.handle_packet(&far.packet, addr(9), 0);
    assert_eq!(
        dispatch.outcomes,
        vec![Outcome::Rejected {
            kind: Some(PRESENCE),
            code: "dispatch_future_global_time",
            disposition: Disposition::Drop,
        }]
    );
    assert!(dispatch.outbound.is_empty());
}

#[test]
fn forged_signature_is_dropped() {
    let mut bob = peer(bob_key(), 2);
    let mut text = factory().application(&root(), PRESENCE, 3, None, b"real");
    let last = text.packet.len() - 1;
    text.packet[last] ^= 0xFF;

    let dispatch = bob.layer.handle_packet(&text.packet, addr(9), 0);
    assert_matches!(
        dispatch.outcomes.as_slice(),
        [Outcome::Rejected {
            code: "dispatch_bad_signature",
            disposition: Disposition::Drop,
            ..
        }]
    );
    assert!(!stored_at(&bob, &root(), 3));
}

// =============================================================================
// Collections
// =============================================================================

#[test]
fn collection_elements_are_isolated() {
    let mut bob = peer(bob_key(), 2);
    bob.layer.register_key(carol_key());
    let good = factory().application(&carol_key(), PRESENCE, 4, None, b"a");
    let other = factory().application(&carol_key(), PRESENCE, 5, None, b"b");
    let inner = factory().session(&carol_key(), 0, 5, Body::Collection(vec![other.packet.clone()]));
    let collection = factory().session(
        &carol_key(),
        0,
        5,
        Body::Collection(vec![
            good.packet.clone(),
            vec![0x00, 0x01],
            inner.packet.clone(),
            other.packet.clone(),
        ]),
    );

    let dispatch = bob.layer.handle_packet(&collection.packet, addr(3), 0);
    assert_matches!(
        dispatch.outcomes.as_slice(),
        [
            Outcome::Handled {
                kind: MessageKind::Collection
            },
            Outcome::Stored { .. },
            Outcome::Rejected { kind: None, .. },
            Outcome::Rejected {
                kind: Some(MessageKind::Collection),
                code: "dispatch_nested_collection",
                ..
            },
            Outcome::Stored { .. },
        ]
    );
    assert!(stored_at(&bob, &carol_key(), 4));
    assert!(stored_at(&bob, &carol_key(), 5));
}

// =============================================================================
// Responders
// =============================================================================

#[test]
fn missing_sequence_answered_from_store() {
    let mut bob = peer(bob_key(), 2);
    for sequence in [1u32, 2, 3, 5] {
        let global_time = 100 + u64::from(sequence);
        let feed = factory().application(&carol_key(), FEED, global_time, Some(sequence), b"f");
        bob.store.insert(community(), stored(&feed));
    }
    let request = factory().session(
        &alice_key(),
        0,
        1,
        Body::MissingSequence(MissingSequence {
            member: carol_key().member_id(),
            kind: FEED,
            low: 2,
            high: 5,
            max_response_size: 0,
        }),
    );

    let dispatch = bob.layer.handle_packet(&request.packet, addr(1), 0);
    assert_eq!(
        dispatch.outcomes,
        vec![Outcome::Handled {
            kind: MessageKind::MissingSequence
        }]
    );
    let sequences: Vec<Option<u32>> = dispatch
        .sent_to(addr(1))
        .map(|packet| bob.layer.codec().decode(packet).unwrap().message.sequence())
        .collect();
    assert_eq!(sequences, vec![Some(2), Some(3), Some(5)]);
}

#[test]
fn missing_identity_answered_from_store() {
    let mut bob = peer(bob_key(), 2);
    let carol_identity = identity(&carol_key(), 2);
    assert_eq!(bob.layer.handle_packet(&carol_identity.packet, addr(3), 0).stored().count(), 1);

    let request = factory().session(
        &alice_key(),
        0,
        1,
        Body::MissingIdentity {
            member: carol_key().member_id(),
        },
    );
    let dispatch = bob.layer.handle_packet(&request.packet, addr(1), 10);
    let sent: Vec<&[u8]> = dispatch.sent_to(addr(1)).collect();
    assert_eq!(sent, vec![carol_identity.packet.as_slice()]);
}

// =============================================================================
// Walker handshake
// =============================================================================

#[test]
fn walk_round_trip_carries_sync() {
    let mut alice = peer(alice_key(), 1);
    let mut bob = peer(bob_key(), 2);
    alice.layer.register_key(bob_key());
    bob.layer.register_key(alice_key());

    let text = factory().application(&root(), TEXT, 3, None, b"hello");
    assert_eq!(bob.layer.handle_packet(&text.packet, addr(9), 0).stored().count(), 1);

    let (identifier, request) = alice.layer.walk_to(bob.address, 0).unwrap();
    assert_eq!(request.destination, bob.address);
    assert_eq!(alice.layer.walker().state(identifier, 0), ExchangeState::RequestSent);

    let dispatch = bob.layer.handle_packet(&request.packet, alice.address, 100);
    assert_eq!(
        dispatch.outcomes,
        vec![Outcome::Handled {
            kind: MessageKind::IntroductionRequest
        }]
    );
    let to_alice: Vec<Vec<u8>> = dispatch.sent_to(alice.address).map(<[u8]>::to_vec).collect();
    assert_eq!(to_alice.len(), 2);
    assert_matches!(
        body_of(&bob, &to_alice[0]),
        Body::IntroductionResponse(response) if response.identifier == identifier
    );
    assert_eq!(to_alice[1], text.packet);

    let mut accepted = 0;
    for packet in &to_alice {
        accepted += alice.layer.handle_packet(packet, bob.address, 200).stored().count();
    }
    assert_eq!(accepted, 1);
    assert!(stored_at(&alice, &root(), 3));
    assert_eq!(
        alice.layer.walker().state(identifier, 300),
        ExchangeState::ResponseReceived
    );
}

#[test]
fn fresh_peers_walk_after_exchanging_identities() {
    let mut alice = peer(alice_key(), 1);
    let mut bob = peer(bob_key(), 2);
    assert_eq!(
        alice
            .store
            .identities(&community(), &alice_key().member_id())
            .len(),
        1
    );

    let (identifier, request) = alice.layer.walk_to(bob.address, 0).unwrap();
    let dispatch = bob.layer.handle_packet(&request.packet, alice.address, 10);
    assert_eq!(
        dispatch.outcomes,
        vec![Outcome::Held {
            kind: MessageKind::IntroductionRequest,
            code: "dispatch_unknown_signer",
        }]
    );
    let ask_alice = only_packet_to(&dispatch, alice.address);
    assert_matches!(
        body_of(&bob, &ask_alice),
        Body::MissingIdentity { member } if member == alice_key().member_id()
    );

    let dispatch = alice.layer.handle_packet(&ask_alice, bob.address, 20);
    let alice_identity = only_packet_to(&dispatch, bob.address);
    assert_matches!(body_of(&alice, &alice_identity), Body::Identity { .. });

    // Bob learns alice's key and answers the held request.
    let dispatch = bob.layer.handle_packet(&alice_identity, alice.address, 30);
    assert_eq!(bob.layer.held_len(), 0);
    let response = dispatch
        .sent_to(alice.address)
        .find(|packet| matches!(body_of(&bob, packet), Body::IntroductionResponse(_)))
        .map(<[u8]>::to_vec)
        .unwrap();

    let dispatch = alice.layer.handle_packet(&response, bob.address, 40);
    assert_eq!(alice.layer.held_len(), 1);
    let ask_bob = only_packet_to(&dispatch, bob.address);
    assert_matches!(
        body_of(&alice, &ask_bob),
        Body::MissingIdentity { member } if member == bob_key().member_id()
    );

    let dispatch = bob.layer.handle_packet(&ask_bob, alice.address, 50);
    let bob_identity = only_packet_to(&dispatch, alice.address);
    let dispatch = alice.layer.handle_packet(&bob_identity, bob.address, 60);
    assert!(dispatch.outcomes.contains(&Outcome::Handled {
        kind: MessageKind::IntroductionResponse
    }));
    assert_eq!(alice.layer.held_len(), 0);
    assert_eq!(
        alice.layer.walker().state(identifier, 70),
        ExchangeState::ResponseReceived
    );
}

#[test]
fn take_step_without_candidates_is_idle() {
    let mut alice = peer(alice_key(), 1);
    assert_eq!(alice.layer.take_step(0).unwrap(), None);
}

// =============================================================================
// Local authoring
// =============================================================================

#[test]
fn undo_own_marks_target_undone() {
    let mut root_peer = peer(root(), 1);
    let text = root_peer
        .layer
        .create(
            Body::Application {
                tag: TEXT.tag(),
                data: b"oops".to_vec(),
            },
            0,
        )
        .unwrap();
    let target_time = text.message.global_time();

    let undo = root_peer
        .layer
        .create(
            Body::UndoOwn {
                global_time: target_time,
            },
            0,
        )
        .unwrap();
    assert_eq!(undo.message.sequence(), Some(1));
    assert!(root_peer
        .layer
        .undo_ledger()
        .is_undone(&MessageRef::new(root().member_id(), target_time)));
    assert!(
        root_peer
            .store
            .get(&community(), &root().member_id(), target_time)
            .unwrap()
            .undone
    );

    let err = root_peer
        .layer
        .create(
            Body::UndoOwn {
                global_time: target_time,
            },
            0,
        )
        .unwrap_err();
    assert_matches!(err, WeftError::Undo { .. });
}

#[test]
fn destroy_rejects_later_messages() {
    let mut root_peer = peer(root(), 1);
    root_peer
        .layer
        .create(
            Body::DestroyCommunity {
                degree: DestroyDegree::Soft,
            },
            0,
        )
        .unwrap();
    let err = root_peer
        .layer
        .create(
            Body::Application {
                tag: TEXT.tag(),
                data: b"after".to_vec(),
            },
            0,
        )
        .unwrap_err();
    assert_matches!(err, WeftError::Authorization { .. });
}

#[test]
fn walker_kinds_cannot_be_authored() {
    let mut root_peer = peer(root(), 1);
    let err = root_peer
        .layer
        .create(
            Body::MissingIdentity {
                member: alice_key().member_id(),
            },
            0,
        )
        .unwrap_err();
    assert_matches!(err, WeftError::Invalid { .. });
}

// =============================================================================
// Signatures
// =============================================================================

struct Countersign;

impl SignatureEndorser for Countersign {
    fn endorse(&self, message: &Decoded) -> Option<Vec<u8>> {
        Some(message.packet.clone())
    }
}

#[test]
fn signature_request_round_trip() {
    let mut alice = peer(alice_key(), 1);
    let mut bob = peer(bob_key(), 2);
    bob.layer = bob.layer.with_endorser(Arc::new(Countersign));

    let presence = alice
        .layer
        .create(
            Body::Application {
                tag: PRESENCE.tag(),
                data: b"sign me".to_vec(),
            },
            0,
        )
        .unwrap();
    let request = alice
        .layer
        .request_signature(&presence, bob.address, 0)
        .unwrap();
    assert_eq!(alice.layer.broker().len(), 1);

    let dispatch = bob.layer.handle_packet(&request.packet, alice.address, 10);
    assert_eq!(dispatch.outbound.len(), 1);
    assert_eq!(dispatch.outbound[0].destination, alice.address);

    let dispatch = alice
        .layer
        .handle_packet(&dispatch.outbound[0].packet, bob.address, 20);
    assert_eq!(dispatch.proposals.len(), 1);
    assert!(!dispatch.proposals[0].modified);
    assert_eq!(dispatch.proposals[0].proposed.packet, presence.packet);
    assert!(alice.layer.broker().is_empty());
}

#[test]
fn signature_request_without_endorser_is_declined() {
    let mut alice = peer(alice_key(), 1);
    let mut bob = peer(bob_key(), 2);
    let presence = alice
        .layer
        .create(
            Body::Application {
                tag: PRESENCE.tag(),
                data: b"sign me".to_vec(),
            },
            0,
        )
        .unwrap();
    let request = alice
        .layer
        .request_signature(&presence, bob.address, 0)
        .unwrap();

    let dispatch = bob.layer.handle_packet(&request.packet, alice.address, 10);
    assert!(dispatch.outbound.is_empty());
    assert_eq!(
        dispatch.outcomes,
        vec![Outcome::Handled {
            kind: MessageKind::SignatureRequest
        }]
    );
}
