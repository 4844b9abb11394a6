//! # Walker State Machine
//!
//! One exchange per outgoing introduction request, keyed by its 16-bit identifier:
//!
//! ```text
//! Idle -> RequestSent -> ResponseReceived
//!                     \-> TimedOut
//! ```
//!
//! The receiving side answers with an introduction response and, when it has someone to introduce,
//! a puncture request to that peer carrying the same identifier. The introduced peer then sends a
//! puncture to the walker. Punctures are fire-and-forget.
//!
//! Deadlines are compared against caller-supplied `now_ms`; [`Walker::sweep`] is the timer tick.

use crate::address::{is_valid_address, LocalAddresses};
use crate::candidates::{Candidate, CandidateTable};
use crate::error::WalkerError;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use weft_core::{CacheEntryState, MemberId, RequestCache, WalkerConfig};
use weft_wire::{
    Address, IntroductionRequest, IntroductionResponse, OptionBits, Puncture, PunctureRequest,
    SyncWindow,
};

/// Observable state of one outgoing exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExchangeState {
    /// No live exchange under this identifier.
    Idle,
    RequestSent,
    ResponseReceived,
    TimedOut,
}

impl From<CacheEntryState> for ExchangeState {
    fn from(state: CacheEntryState) -> Self {
        match state {
            CacheEntryState::Pending => ExchangeState::RequestSent,
            CacheEntryState::Completed => ExchangeState::ResponseReceived,
            CacheEntryState::TimedOut => ExchangeState::TimedOut,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkerStats {
    pub attempts: u64,
    pub successes: u64,
    pub timeouts: u64,
    pub introductions_served: u64,
    pub punctures_sent: u64,
    pub punctures_received: u64,
}

#[derive(Debug, Clone)]
struct Exchange {
    destination: Address,
    introduced: Option<Address>,
    punctured_by: Option<Address>,
}

/// What to send in answer to an introduction request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntroductionReply {
    pub response: IntroductionResponse,
    pub response_to: Address,
    /// Puncture request for the introduced peer, if any.
    pub puncture_request: Option<(Address, PunctureRequest)>,
}

/// Semi-random walker for one community.
pub struct Walker {
    local: LocalAddresses,
    candidates: CandidateTable,
    exchanges: RequestCache<u16, Exchange>,
    config: WalkerConfig,
    stats: WalkerStats,
    rng: Box<dyn RngCore + Send + Sync>,
}

impl Walker {
    pub fn new(
        local: LocalAddresses,
        config: WalkerConfig,
        rng: impl RngCore + Send + Sync + 'static,
    ) -> Self {
        Self {
            exchanges: RequestCache::new(config.response_timeout_ms, config.cleanup_delay_ms),
            local,
            candidates: CandidateTable::new(),
            config,
            stats: WalkerStats::default(),
            rng: Box::new(rng),
        }
    }

    pub fn local(&self) -> &LocalAddresses {
        &self.local
    }

    pub fn candidates(&self) -> &CandidateTable {
        &self.candidates
    }

    pub fn candidates_mut(&mut self) -> &mut CandidateTable {
        &mut self.candidates
    }

    pub fn stats(&self) -> &WalkerStats {
        &self.stats
    }

    /// Random source also used for sync slices and signature identifiers.
    pub fn rng_mut(&mut self) -> &mut (dyn RngCore + Send + Sync) {
        &mut *self.rng
    }

    /// State of exchange `identifier` at `now_ms`.
    pub fn state(&self, identifier: u16, now_ms: u64) -> ExchangeState {
        self.exchanges
            .state(&identifier, now_ms)
            .map_or(ExchangeState::Idle, ExchangeState::from)
    }

    /// Peer introduced to us through exchange `identifier`, if any.
    pub fn introduced_by(&self, identifier: u16) -> Option<Address> {
        self.exchanges.get(&identifier).and_then(|exchange| exchange.introduced)
    }

    /// Sender of the puncture that arrived for exchange `identifier`, if any.
    pub fn punctured_by(&self, identifier: u16) -> Option<Address> {
        self.exchanges
            .get(&identifier)
            .and_then(|exchange| exchange.punctured_by)
    }

    /// Start an exchange with `destination`: `Idle -> RequestSent`.
    pub fn start_walk(
        &mut self,
        destination: Address,
        sync: Option<SyncWindow>,
        now_ms: u64,
    ) -> Result<(u16, IntroductionRequest), WalkerError> {
        let exchange = Exchange {
            destination,
            introduced: None,
            punctured_by: None,
        };
        let identifier = self
            .exchanges
            .claim(&mut *self.rng, exchange, now_ms)
            .ok_or(WalkerError::IdentifiersExhausted)?;
        self.stats.attempts += 1;

        let options = OptionBits::default()
            .with_advice(true)
            .with_connection_type(self.local.connection())
            .with_sync(sync.is_some());
        tracing::debug!(identifier, destination = %destination, sync = sync.is_some(), "walking");
        Ok((
            identifier,
            IntroductionRequest {
                destination,
                source_lan: self.local.lan(),
                source_wan: self.local.wan(),
                options,
                identifier,
                sync,
            },
        ))
    }

    /// Pick a random live candidate without an outstanding exchange and walk to it.
    pub fn take_step(
        &mut self,
        sync: Option<SyncWindow>,
        now_ms: u64,
    ) -> Result<Option<(u16, IntroductionRequest)>, WalkerError> {
        let busy: Vec<Address> = self
            .exchanges
            .iter()
            .filter(|(identifier, _)| {
                self.exchanges.state(identifier, now_ms) == Some(CacheEntryState::Pending)
            })
            .map(|(_, exchange)| exchange.destination)
            .collect();
        let target = self
            .candidates
            .pick_walk_target(&busy, &mut *self.rng, now_ms, self.config.candidate_lifetime_ms)
            .map(|candidate| self.local.route_to(candidate.lan, candidate.wan));
        match target {
            Some(destination) => self.start_walk(destination, sync, now_ms).map(Some),
            None => Ok(None),
        }
    }

    /// Answer an introduction request from `sock`.
    pub fn on_introduction_request(
        &mut self,
        sock: Address,
        member: Option<MemberId>,
        request: &IntroductionRequest,
        now_ms: u64,
    ) -> Result<IntroductionReply, WalkerError> {
        if self.exchanges.contains(&request.identifier) && request.source_lan == self.local.lan() {
            return Err(WalkerError::SelfWalk(request.identifier));
        }

        let (lan, wan) = self
            .local
            .estimate(sock, request.source_lan, request.source_wan);
        if lan.is_null() || wan.is_null() {
            return Err(WalkerError::UnresolvedSource(sock));
        }
        self.local.vote(request.destination, sock, wan, now_ms);

        let requester = {
            let candidate = self.candidates.upsert(sock, lan, wan);
            candidate.connection = request.options.connection_type();
            candidate.tunnel = request.options.tunnel();
            if member.is_some() {
                candidate.member = member;
            }
            candidate.clone()
        };
        self.candidates.stumbled(&sock, now_ms);

        let introduced: Option<Candidate> = if request.options.advice() {
            self.candidates
                .pick_introduction(
                    &requester,
                    &mut *self.rng,
                    now_ms,
                    self.config.candidate_lifetime_ms,
                )
                .cloned()
        } else {
            None
        };

        let (lan_introduction, wan_introduction) = introduced
            .as_ref()
            .map_or((Address::NULL, Address::NULL), |peer| (peer.lan, peer.wan));
        let response = IntroductionResponse {
            destination: sock,
            source_lan: self.local.lan(),
            source_wan: self.local.wan(),
            lan_introduction,
            wan_introduction,
            options: request.options,
            identifier: request.identifier,
        };

        let puncture_request = introduced.map(|peer| {
            self.stats.introductions_served += 1;
            tracing::debug!(
                identifier = request.identifier,
                requester = %sock,
                introduced = %peer.sock,
                "introducing"
            );
            (
                self.local.route_to(peer.lan, peer.wan),
                PunctureRequest {
                    lan_walker: lan,
                    wan_walker: wan,
                    identifier: request.identifier,
                },
            )
        });

        Ok(IntroductionReply {
            response,
            response_to: sock,
            puncture_request,
        })
    }

    /// Handle the response to one of our requests: `RequestSent -> ResponseReceived`.
    ///
    /// Returns the address of the introduced peer, if the response names one.
    pub fn on_introduction_response(
        &mut self,
        sock: Address,
        member: Option<MemberId>,
        response: &IntroductionResponse,
        now_ms: u64,
    ) -> Result<Option<Address>, WalkerError> {
        if self
            .exchanges
            .complete(&response.identifier, now_ms)
            .is_none()
        {
            return Err(WalkerError::UnknownIdentifier(response.identifier));
        }
        self.stats.successes += 1;

        let (lan, wan) = self
            .local
            .estimate(sock, response.source_lan, response.source_wan);
        {
            let candidate = self.candidates.upsert(sock, lan, wan);
            candidate.connection = response.options.connection_type();
            if member.is_some() {
                candidate.member = member;
            }
        }
        self.candidates.walked(&sock, now_ms);
        self.local.vote(response.destination, sock, wan, now_ms);

        let lan_intro = response.lan_introduction;
        let wan_intro = response.wan_introduction;
        if lan_intro.is_null() || wan_intro.is_null() {
            return Ok(None);
        }
        if !is_valid_address(&lan_intro) || !is_valid_address(&wan_intro) {
            return Err(WalkerError::InvalidWalkerAddress {
                address: if is_valid_address(&lan_intro) {
                    wan_intro
                } else {
                    lan_intro
                },
                reason: "introduced address",
            });
        }

        let target = self.local.route_to(lan_intro, wan_intro);
        self.candidates.upsert(target, lan_intro, wan_intro);
        self.candidates.introduced(&target, now_ms);
        if let Some(exchange) = self.exchanges.get_mut(&response.identifier) {
            exchange.introduced = Some(target);
        }
        tracing::info!(identifier = response.identifier, introduced = %target, "walk succeeded");
        Ok(Some(target))
    }

    /// Someone introduced us to a walker: puncture our NAT towards it.
    pub fn on_puncture_request(
        &mut self,
        sock: Address,
        request: &PunctureRequest,
    ) -> Result<(Address, Puncture), WalkerError> {
        let lan = request.lan_walker;
        let wan = request.wan_walker;
        let invalid = |address: Address,
                       reason: &'static str|
         -> Result<(Address, Puncture), WalkerError> {
            Err(WalkerError::InvalidWalkerAddress { address, reason })
        };
        if lan == sock {
            return invalid(lan, "LAN walker is the sender");
        }
        if !is_valid_address(&lan) {
            return invalid(lan, "LAN walker");
        }
        if lan == self.local.lan() {
            return invalid(lan, "LAN walker is us");
        }
        if wan == sock {
            return invalid(wan, "WAN walker is the sender");
        }
        if !is_valid_address(&wan) {
            return invalid(wan, "WAN walker");
        }
        if wan == self.local.wan() {
            return invalid(wan, "WAN walker is us");
        }

        self.stats.punctures_sent += 1;
        let target = self.local.route_to(lan, wan);
        tracing::debug!(identifier = request.identifier, target = %target, "puncturing");
        Ok((
            target,
            Puncture {
                source_lan: self.local.lan(),
                source_wan: self.local.wan(),
                identifier: request.identifier,
            },
        ))
    }

    /// A peer we were introduced to punctured towards us. Does not stop the exchange's timeout.
    pub fn on_puncture(
        &mut self,
        sock: Address,
        puncture: &Puncture,
        now_ms: u64,
    ) -> Result<(), WalkerError> {
        let live = match self.exchanges.state(&puncture.identifier, now_ms) {
            Some(CacheEntryState::Pending) => true,
            Some(CacheEntryState::Completed) => self
                .exchanges
                .completed(&puncture.identifier, now_ms)
                .is_some(),
            _ => false,
        };
        if !live {
            return Err(WalkerError::UnknownIdentifier(puncture.identifier));
        }
        self.stats.punctures_received += 1;

        let (lan, wan) = self
            .local
            .estimate(sock, puncture.source_lan, puncture.source_wan);
        if !(lan.is_null() || wan.is_null()) {
            self.candidates.upsert(sock, lan, wan);
            self.candidates.introduced(&sock, now_ms);
        }
        if let Some(exchange) = self.exchanges.get_mut(&puncture.identifier) {
            exchange.punctured_by = Some(sock);
        }
        Ok(())
    }

    /// Timer tick. Expires exchanges, marks timed-out destinations unreachable, and forgets
    /// candidates and WAN votes past the candidate lifetime. Returns the timed-out destinations.
    pub fn sweep(&mut self, now_ms: u64) -> Vec<Address> {
        let timed_out: Vec<Address> = self
            .exchanges
            .sweep(now_ms)
            .into_iter()
            .map(|(identifier, exchange)| {
                tracing::info!(identifier, destination = %exchange.destination, "walk timed out");
                exchange.destination
            })
            .collect();
        for destination in &timed_out {
            self.stats.timeouts += 1;
            self.candidates.unreachable(destination, now_ms);
        }
        self.candidates
            .prune(now_ms, self.config.candidate_lifetime_ms);
        self.local
            .expire_votes(now_ms, self.config.candidate_lifetime_ms);
        timed_out
    }
}
