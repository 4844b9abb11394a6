//! Address validity, peer address estimation and our own WAN address.

use std::collections::{BTreeMap, BTreeSet};
use weft_wire::{Address, ConnectionType};

/// Non-null host, non-zero port, last octet neither 0 nor 255.
pub fn is_valid_address(address: &Address) -> bool {
    let [_, _, _, last] = address.ip().octets();
    !address.ip().is_unspecified() && address.port() > 0 && last != 0 && last != 255
}

/// Our LAN and WAN addresses and NAT classification.
///
/// The WAN address is decided by majority vote over the destination addresses peers report for us.
/// Disagreeing votes mean each peer sees a different mapping, i.e. a symmetric NAT. A ballot
/// counts until it is older than the candidate lifetime.
#[derive(Debug, Clone)]
pub struct LocalAddresses {
    lan: Address,
    wan: Address,
    connection: ConnectionType,
    votes: BTreeMap<Address, BTreeSet<Address>>,
    ballots: BTreeMap<Address, Ballot>,
}

/// One voter's latest opinion of our WAN address.
#[derive(Debug, Clone, Copy)]
struct Ballot {
    address: Address,
    cast_ms: u64,
}

impl LocalAddresses {
    pub fn new(lan: Address, wan: Address) -> Self {
        let connection = if is_valid_address(&lan) && lan == wan {
            ConnectionType::Public
        } else {
            ConnectionType::Unknown
        };
        Self {
            lan,
            wan,
            connection,
            votes: BTreeMap::new(),
            ballots: BTreeMap::new(),
        }
    }

    pub fn lan(&self) -> Address {
        self.lan
    }

    pub fn wan(&self) -> Address {
        self.wan
    }

    pub fn connection(&self) -> ConnectionType {
        self.connection
    }

    /// LAN and WAN address of a peer that sent from `sock` claiming `lan` and `wan`.
    ///
    /// Either result may be [`Address::NULL`] when it cannot be determined.
    pub fn estimate(&self, sock: Address, lan: Address, wan: Address) -> (Address, Address) {
        let mut lan = if lan == self.lan || !is_valid_address(&lan) {
            sock
        } else {
            lan
        };
        let mut wan = if wan == self.wan || !is_valid_address(&wan) {
            sock
        } else {
            wan
        };

        if sock.ip() == self.wan.ip() {
            // Same NAT as us.
            lan = sock;
        } else if is_valid_address(&sock) {
            wan = sock;
        } else if !is_valid_address(&wan) {
            wan = Address::NULL;
        }

        if !is_valid_address(&lan) {
            lan = Address::NULL;
        }
        (lan, wan)
    }

    /// Address to reach a peer with the given LAN and WAN addresses.
    pub fn route_to(&self, lan: Address, wan: Address) -> Address {
        if wan.ip() == self.wan.ip() {
            lan
        } else {
            wan
        }
    }

    /// Voters with a ballot still counted.
    pub fn voters(&self) -> usize {
        self.ballots.len()
    }

    /// Record `voter`'s opinion of our WAN address. Returns `true` if our WAN address changed.
    pub fn vote(
        &mut self,
        address: Address,
        voter_sock: Address,
        voter_wan: Address,
        now_ms: u64,
    ) -> bool {
        if self.wan.ip() == voter_wan.ip() || self.wan.ip() == voter_sock.ip() {
            return false;
        }
        if !is_valid_address(&address) {
            return false;
        }

        let ballot = Ballot {
            address,
            cast_ms: now_ms,
        };
        if let Some(previous) = self.ballots.insert(voter_sock, ballot) {
            self.withdraw(previous.address, voter_sock);
        }
        self.votes.entry(address).or_default().insert(voter_sock);

        let mut changed = false;
        let support = self.votes.get(&address).map_or(0, BTreeSet::len);
        let current = self.votes.get(&self.wan).map_or(0, BTreeSet::len);
        if address != self.wan && support >= current {
            if self.votes.len() > 1 {
                self.connection = ConnectionType::SymmetricNat;
            } else {
                if self.connection == ConnectionType::SymmetricNat {
                    self.connection = ConnectionType::Unknown;
                }
                tracing::info!(from = %self.wan, to = %address, "WAN address updated");
                self.wan = address;
                if !is_valid_address(&self.lan) {
                    self.lan = Address::new(self.wan.ip(), self.lan.port());
                }
                changed = true;
            }
        }

        if self.connection == ConnectionType::Unknown && self.lan == self.wan {
            self.connection = ConnectionType::Public;
        }
        changed
    }

    /// Forget ballots cast more than `lifetime_ms` ago. Returns how many were dropped.
    ///
    /// The WAN address stays as decided; a symmetric-NAT verdict is lifted once the remaining
    /// ballots agree again.
    pub fn expire_votes(&mut self, now_ms: u64, lifetime_ms: u64) -> usize {
        let expired: Vec<(Address, Address)> = self
            .ballots
            .iter()
            .filter(|(_, ballot)| ballot.cast_ms.saturating_add(lifetime_ms) <= now_ms)
            .map(|(voter, ballot)| (*voter, ballot.address))
            .collect();
        for (voter, address) in &expired {
            self.ballots.remove(voter);
            self.withdraw(*address, *voter);
        }
        if self.connection == ConnectionType::SymmetricNat && self.votes.len() <= 1 {
            self.connection = ConnectionType::Unknown;
        }
        expired.len()
    }

    fn withdraw(&mut self, address: Address, voter: Address) {
        if let Some(voters) = self.votes.get_mut(&address) {
            voters.remove(&voter);
            if voters.is_empty() {
                self.votes.remove(&address);
            }
        }
    }
}
