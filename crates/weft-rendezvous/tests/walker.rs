//! Walker exchanges between three public peers.

use assert_matches::assert_matches;
use std::net::Ipv4Addr;
use weft_core::{Disposition, ProtocolErrorCode, WalkerConfig};
use weft_rendezvous::{ExchangeState, LocalAddresses, Walker, WalkerError};
use weft_testkit::seeded_rng;
use weft_wire::{Address, ConnectionType, IntroductionResponse, OptionBits};

const TIMEOUT_MS: u64 = 30_000;

fn addr(octet: u8) -> Address {
    Address::new(Ipv4Addr::new(octet, octet, octet, octet), 7000)
}

fn walker(octet: u8, seed: u64) -> Walker {
    let config = WalkerConfig {
        response_timeout_ms: TIMEOUT_MS,
        ..WalkerConfig::default()
    };
    Walker::new(
        LocalAddresses::new(addr(octet), addr(octet)),
        config,
        seeded_rng(seed),
    )
}

// ============================================================================
// Timeouts
// ============================================================================

#[test]
fn unanswered_request_times_out() {
    weft_testkit::init_tracing();
    let mut a = walker(1, 1);
    a.candidates_mut().seed(addr(2), 0);

    let (identifier, request) = a.start_walk(addr(2), None, 0).unwrap();
    assert_eq!(request.destination, addr(2));
    assert_eq!(request.identifier, identifier);
    assert_eq!(a.state(identifier, 0), ExchangeState::RequestSent);
    assert_eq!(a.state(identifier, 29_999), ExchangeState::RequestSent);
    assert_eq!(a.state(identifier, 31_000), ExchangeState::TimedOut);

    assert_eq!(a.sweep(31_000), vec![addr(2)]);
    assert_eq!(a.stats().timeouts, 1);
    assert_eq!(a.state(identifier, 31_000), ExchangeState::Idle);
    assert!(!a.candidates().get(&addr(2)).unwrap().is_reachable());

    // Unreachable peers are not walked to again until heard from.
    assert!(a.take_step(None, 31_001).unwrap().is_none());
}

#[test]
fn answered_request_never_times_out() {
    let mut a = walker(1, 2);
    let mut b = walker(2, 3);

    let (identifier, request) = a.start_walk(addr(2), None, 0).unwrap();
    let reply = b
        .on_introduction_request(addr(1), None, &request, 5)
        .unwrap();
    assert_eq!(reply.response_to, addr(1));
    assert_eq!(reply.response.identifier, identifier);
    assert!(reply.puncture_request.is_none());

    let introduced = a
        .on_introduction_response(addr(2), None, &reply.response, 10_000)
        .unwrap();
    assert_eq!(introduced, None);
    assert_eq!(a.state(identifier, 10_001), ExchangeState::ResponseReceived);

    assert!(a.sweep(31_000).is_empty());
    assert_eq!(a.stats().timeouts, 0);
    assert_eq!(a.stats().successes, 1);
    assert!(a.candidates().get(&addr(2)).unwrap().is_reachable());
}

#[test]
fn sweep_forgets_stale_wan_votes() {
    let mut a = walker(1, 8);
    let mut b = walker(2, 9);
    let (_, request) = a.start_walk(addr(2), None, 0).unwrap();
    b.on_introduction_request(addr(1), None, &request, 5).unwrap();
    assert_eq!(b.local().voters(), 1);

    let lifetime = WalkerConfig::default().candidate_lifetime_ms;
    b.sweep(lifetime);
    assert_eq!(b.local().voters(), 1);
    b.sweep(lifetime + 5);
    assert_eq!(b.local().voters(), 0);
    assert_eq!(b.local().wan(), addr(2));
}

#[test]
fn late_response_is_rejected() {
    let mut a = walker(1, 4);
    let mut b = walker(2, 5);
    let (identifier, request) = a.start_walk(addr(2), None, 0).unwrap();
    let reply = b.on_introduction_request(addr(1), None, &request, 1).unwrap();

    let err = a
        .on_introduction_response(addr(2), None, &reply.response, TIMEOUT_MS)
        .unwrap_err();
    assert_eq!(err, WalkerError::UnknownIdentifier(identifier));
    assert_eq!(a.state(identifier, TIMEOUT_MS), ExchangeState::TimedOut);
}

// ============================================================================
// Introduction and puncture
// ============================================================================

#[test]
fn introduction_leads_to_puncture() {
    let mut a = walker(1, 6);
    let mut b = walker(2, 7);
    let mut c = walker(3, 8);

    // C walks to B first so that B has a verified candidate to introduce.
    let (_, from_c) = c.start_walk(addr(2), None, 0).unwrap();
    let first = b.on_introduction_request(addr(3), None, &from_c, 0).unwrap();
    assert!(first.puncture_request.is_none());

    let (identifier, request) = a.start_walk(addr(2), None, 10).unwrap();
    assert!(request.options.advice());
    assert!(!request.options.has_sync());
    assert_eq!(request.options.connection_type(), ConnectionType::Public);

    let reply = b
        .on_introduction_request(addr(1), None, &request, 20)
        .unwrap();
    assert_eq!(reply.response.options, request.options);
    assert_eq!(reply.response.lan_introduction, addr(3));
    assert_eq!(reply.response.wan_introduction, addr(3));
    assert_eq!(b.stats().introductions_served, 1);

    let (puncture_target, puncture_request) = reply.puncture_request.unwrap();
    assert_eq!(puncture_target, addr(3));
    assert_eq!(puncture_request.identifier, identifier);
    assert_eq!(puncture_request.lan_walker, addr(1));
    assert_eq!(puncture_request.wan_walker, addr(1));

    let introduced = a
        .on_introduction_response(addr(2), None, &reply.response, 10_000)
        .unwrap();
    assert_eq!(introduced, Some(addr(3)));
    assert_eq!(a.introduced_by(identifier), Some(addr(3)));

    let (target, puncture) = c.on_puncture_request(addr(2), &puncture_request).unwrap();
    assert_eq!(target, addr(1));
    assert_eq!(puncture.identifier, identifier);
    assert_eq!(c.stats().punctures_sent, 1);

    a.on_puncture(addr(3), &puncture, 10_050).unwrap();
    assert_eq!(a.punctured_by(identifier), Some(addr(3)));
    assert_eq!(a.stats().punctures_received, 1);
}

#[test]
fn puncture_request_naming_us_is_rejected() {
    let mut b = walker(2, 9);
    let mut c = walker(3, 10);
    let (_, from_b) = b.start_walk(addr(3), None, 0).unwrap();
    let reply = c.on_introduction_request(addr(2), None, &from_b, 0).unwrap();
    assert!(reply.puncture_request.is_none());

    let bogus = weft_wire::PunctureRequest {
        lan_walker: addr(3),
        wan_walker: addr(3),
        identifier: 1,
    };
    assert_matches!(
        c.on_puncture_request(addr(2), &bogus),
        Err(WalkerError::InvalidWalkerAddress { .. })
    );

    let from_sender = weft_wire::PunctureRequest {
        lan_walker: addr(2),
        wan_walker: addr(2),
        identifier: 1,
    };
    assert_matches!(
        c.on_puncture_request(addr(2), &from_sender),
        Err(WalkerError::InvalidWalkerAddress { .. })
    );
}

// ============================================================================
// Rejections
// ============================================================================

#[test]
fn own_request_is_dropped() {
    let mut a = walker(1, 11);
    let (identifier, request) = a.start_walk(addr(2), None, 0).unwrap();
    let err = a
        .on_introduction_request(addr(1), None, &request, 1)
        .unwrap_err();
    assert_eq!(err, WalkerError::SelfWalk(identifier));
    assert_eq!(err.disposition(), Disposition::Drop);
}

#[test]
fn unknown_identifier_is_ignored() {
    let mut a = walker(1, 12);
    let response = IntroductionResponse {
        destination: addr(1),
        source_lan: addr(2),
        source_wan: addr(2),
        lan_introduction: Address::NULL,
        wan_introduction: Address::NULL,
        options: OptionBits::default(),
        identifier: 4242,
    };
    let err = a
        .on_introduction_response(addr(2), None, &response, 0)
        .unwrap_err();
    assert_matches!(err, WalkerError::UnknownIdentifier(4242));
    assert_eq!(err.disposition(), Disposition::Ignore);
    assert_eq!(a.stats().successes, 0);
    assert!(a.candidates().is_empty());
}

#[test]
fn take_step_skips_busy_candidates() {
    let mut a = walker(1, 13);
    a.candidates_mut().seed(addr(2), 0);

    let (_, request) = a.take_step(None, 0).unwrap().unwrap();
    assert_eq!(request.destination, addr(2));
    assert!(a.take_step(None, 1).unwrap().is_none());
    assert_eq!(a.stats().attempts, 1);
}
