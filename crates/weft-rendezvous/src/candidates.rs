//! Known peers and how recently we heard from them.
//!
//! A candidate is *verified* once there has been direct contact: we walked to it and it answered,
//! or it walked to us. Only verified candidates are introduced to others. Introduced candidates
//! are walk targets but are never passed on second-hand.

use crate::address::is_valid_address;
use rand::seq::IteratorRandom;
use rand::Rng;
use std::collections::BTreeMap;
use weft_core::MemberId;
use weft_wire::{Address, ConnectionType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Address packets from this peer arrive from; the table key.
    pub sock: Address,
    /// Address inside the peer's own network.
    pub lan: Address,
    /// Address the rest of the internet reaches the peer at.
    pub wan: Address,
    /// NAT classification the peer reported.
    pub connection: ConnectionType,
    /// Peer shares its socket with another protocol and needs tunnelled packets.
    pub tunnel: bool,
    /// Member that signed the peer's walker traffic, once known.
    pub member: Option<MemberId>,
    last_walk_ms: Option<u64>,
    last_stumble_ms: Option<u64>,
    last_intro_ms: Option<u64>,
    unreachable_ms: Option<u64>,
}

impl Candidate {
    fn new(sock: Address, lan: Address, wan: Address) -> Self {
        Self {
            sock,
            lan,
            wan,
            connection: ConnectionType::Unknown,
            tunnel: false,
            member: None,
            last_walk_ms: None,
            last_stumble_ms: None,
            last_intro_ms: None,
            unreachable_ms: None,
        }
    }

    fn last_direct_ms(&self) -> Option<u64> {
        self.last_walk_ms.max(self.last_stumble_ms)
    }

    fn last_heard_ms(&self) -> Option<u64> {
        self.last_direct_ms().max(self.last_intro_ms)
    }

    /// Walked to or stumbled upon within `lifetime_ms`.
    pub fn is_verified(&self, now_ms: u64, lifetime_ms: u64) -> bool {
        self.last_direct_ms()
            .is_some_and(|at| now_ms < at.saturating_add(lifetime_ms))
    }

    /// Any contact within `lifetime_ms`.
    pub fn is_alive(&self, now_ms: u64, lifetime_ms: u64) -> bool {
        self.last_heard_ms()
            .is_some_and(|at| now_ms < at.saturating_add(lifetime_ms))
    }

    /// Not timed out since the last time we heard from it.
    pub fn is_reachable(&self) -> bool {
        match self.unreachable_ms {
            None => true,
            Some(at) => self.last_heard_ms().is_some_and(|heard| heard > at),
        }
    }
}

/// Candidates keyed by socket address.
#[derive(Debug, Clone, Default)]
pub struct CandidateTable {
    candidates: BTreeMap<Address, Candidate>,
}

impl CandidateTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn get(&self, sock: &Address) -> Option<&Candidate> {
        self.candidates.get(sock)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.values()
    }

    /// Insert or refresh the addresses of `sock`.
    pub fn upsert(&mut self, sock: Address, lan: Address, wan: Address) -> &mut Candidate {
        let candidate = self
            .candidates
            .entry(sock)
            .or_insert_with(|| Candidate::new(sock, lan, wan));
        candidate.lan = lan;
        candidate.wan = wan;
        candidate
    }

    /// We walked to `sock` and it answered.
    pub fn walked(&mut self, sock: &Address, now_ms: u64) {
        if let Some(candidate) = self.candidates.get_mut(sock) {
            candidate.last_walk_ms = Some(now_ms);
        }
    }

    /// `sock` walked to us.
    pub fn stumbled(&mut self, sock: &Address, now_ms: u64) {
        if let Some(candidate) = self.candidates.get_mut(sock) {
            candidate.last_stumble_ms = Some(now_ms);
        }
    }

    /// Someone introduced `sock` to us.
    pub fn introduced(&mut self, sock: &Address, now_ms: u64) {
        if let Some(candidate) = self.candidates.get_mut(sock) {
            candidate.last_intro_ms = Some(now_ms);
        }
    }

    /// A walk to `sock` timed out.
    pub fn unreachable(&mut self, sock: &Address, now_ms: u64) {
        if let Some(candidate) = self.candidates.get_mut(sock) {
            candidate.unreachable_ms = Some(now_ms);
        }
    }

    /// Random verified peer to introduce to `requester`.
    ///
    /// Excludes the requester itself, unreachable peers, and a symmetric-NAT peer behind a
    /// different WAN address than a symmetric-NAT requester.
    pub fn pick_introduction<R: Rng + ?Sized>(
        &self,
        requester: &Candidate,
        rng: &mut R,
        now_ms: u64,
        lifetime_ms: u64,
    ) -> Option<&Candidate> {
        self.candidates
            .values()
            .filter(|candidate| {
                candidate.sock != requester.sock
                    && candidate.lan != requester.lan
                    && candidate.wan != requester.wan
            })
            .filter(|candidate| candidate.is_verified(now_ms, lifetime_ms) && candidate.is_reachable())
            .filter(|candidate| is_valid_address(&candidate.lan) && is_valid_address(&candidate.wan))
            .filter(|candidate| {
                !(requester.connection == ConnectionType::SymmetricNat
                    && candidate.connection == ConnectionType::SymmetricNat
                    && requester.wan.ip() != candidate.wan.ip())
            })
            .choose(rng)
    }

    /// Random alive, reachable peer none of whose addresses is in `busy`.
    pub fn pick_walk_target<R: Rng + ?Sized>(
        &self,
        busy: &[Address],
        rng: &mut R,
        now_ms: u64,
        lifetime_ms: u64,
    ) -> Option<&Candidate> {
        self.candidates
            .values()
            .filter(|candidate| {
                ![candidate.sock, candidate.lan, candidate.wan]
                    .iter()
                    .any(|address| busy.contains(address))
            })
            .filter(|candidate| candidate.is_alive(now_ms, lifetime_ms) && candidate.is_reachable())
            .choose(rng)
    }

    /// Add a bootstrap or configured peer that counts as alive until `now_ms + lifetime`.
    pub fn seed(&mut self, sock: Address, now_ms: u64) {
        let candidate = self.upsert(sock, sock, sock);
        candidate.last_intro_ms = Some(now_ms);
    }

    /// Drop candidates not heard from within `lifetime_ms`. Returns how many were dropped.
    pub fn prune(&mut self, now_ms: u64, lifetime_ms: u64) -> usize {
        let before = self.candidates.len();
        self.candidates
            .retain(|_, candidate| candidate.is_alive(now_ms, lifetime_ms));
        before - self.candidates.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::net::Ipv4Addr;

    fn addr(d: u8) -> Address {
        Address::new(Ipv4Addr::new(1, 1, 1, d), 7000)
    }

    #[test]
    fn test_introduction_requires_direct_contact() {
        let mut table = CandidateTable::new();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let requester = table.upsert(addr(1), addr(1), addr(1)).clone();
        table.upsert(addr(2), addr(2), addr(2));
        table.introduced(&addr(2), 0);

        assert!(table.pick_introduction(&requester, &mut rng, 10, 1_000).is_none());

        table.stumbled(&addr(2), 5);
        let picked = table.pick_introduction(&requester, &mut rng, 10, 1_000);
        assert_eq!(picked.map(|candidate| candidate.sock), Some(addr(2)));
    }

    #[test]
    fn test_requester_never_introduced_to_itself() {
        let mut table = CandidateTable::new();
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        table.upsert(addr(1), addr(1), addr(1));
        table.stumbled(&addr(1), 0);
        let requester = table.get(&addr(1)).cloned().unwrap();
        assert!(table.pick_introduction(&requester, &mut rng, 1, 1_000).is_none());
    }

    #[test]
    fn test_unreachable_until_heard_again() {
        let mut table = CandidateTable::new();
        table.seed(addr(3), 0);
        table.unreachable(&addr(3), 10);
        assert!(!table.get(&addr(3)).unwrap().is_reachable());

        table.stumbled(&addr(3), 20);
        assert!(table.get(&addr(3)).unwrap().is_reachable());
    }

    #[test]
    fn test_different_symmetric_nats_not_paired() {
        let mut table = CandidateTable::new();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let requester = {
            let candidate = table.upsert(addr(1), addr(1), addr(1));
            candidate.connection = ConnectionType::SymmetricNat;
            candidate.clone()
        };
        table.upsert(addr(2), addr(2), addr(2)).connection = ConnectionType::SymmetricNat;
        table.stumbled(&addr(2), 0);

        assert!(table.pick_introduction(&requester, &mut rng, 1, 1_000).is_none());
    }

    #[test]
    fn test_prune_drops_silent_candidates() {
        let mut table = CandidateTable::new();
        table.seed(addr(1), 0);
        table.seed(addr(2), 500);
        assert_eq!(table.prune(1_000, 600), 1);
        assert!(table.get(&addr(2)).is_some());
    }
}
