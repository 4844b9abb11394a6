//! # Community Message Layer
//!
//! One [`MessageLayer`] per joined community. Every incoming packet is decoded, checked against
//! the global-time margin, verified, and handed to the handler for its kind:
//!
//! - permission-bearing messages (authorize, revoke, dynamic settings, destroy, undo) update the
//!   timeline or undo ledger and are persisted
//! - application messages are checked against the timeline and persisted
//! - walker traffic drives the [`Walker`] and may answer a sync window
//! - missing-* requests are answered from the store
//! - signature requests go to the registered endorser
//!
//! A rejection that names missing data (identity, proof, sequence range, undo target) sends the
//! matching missing-* request back to the sender and holds the packet under the data it waits
//! for. Learning a key or storing a message wakes only the packets waiting for it; the rest stay
//! put until their request times out. The queue is capped per sender and in total.
//!
//! A new layer publishes the local member's signed identity, so peers that only know our member
//! id can ask for our key.

use crate::error::DispatchError;
use crate::held::{Awaiting, HeldPacket, HeldQueue, HoldResult};
use crate::outcome::{Dispatch, FollowUp, Outbound, Outcome, Rejection};
use rand::RngCore;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use weft_anti_entropy::SyncMatcher;
use weft_authorization::{
    AcceptanceError, AuthorizationError, Authorship, GrantTarget, SequenceError, Timeline,
    UndoLedger, UndoTarget, UndoViolation,
};
use weft_core::{
    CommunityId, CryptoEffects, Disposition, GlobalClock, GlobalTime, MemberId, MessageCatalog,
    MessageKind, MessageRef, ProtocolErrorCode, PublicKey, Scope, SessionId, WeftConfig,
    WeftError,
};
use weft_rendezvous::{LocalAddresses, Walker};
use weft_resolver::{
    answer_signature_request, MissingKey, MissingRequestTracker, Resolver, SignatureBroker,
    SignatureEndorser,
};
use weft_wire::{
    Address, BloomBuilder, BloomProbe, Body, Codec, CommunityHeader, Decoded, Header,
    IntroductionRequest, MessageStore, MissingLastMessage, MissingMessage, MissingSequence,
    PermissionGrant, SessionHeader, SignatureExchange, StoredMessage, SyncWindow,
};

/// Who we are and which community we joined.
#[derive(Debug, Clone)]
pub struct CommunitySetup {
    pub community: CommunityId,
    /// Key of the community's root member, origin of every permission.
    pub root: PublicKey,
    pub catalog: Arc<MessageCatalog>,
    /// Local member. Its private half lives behind the crypto effects.
    pub key: PublicKey,
    /// Session identifier for session-scoped messages we send.
    pub session: SessionId,
    pub local: LocalAddresses,
    pub config: WeftConfig,
}

/// Result of a timer tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub timed_out_walks: Vec<Address>,
    pub expired_requests: usize,
    pub expired_signatures: Vec<u16>,
    pub dropped_held: usize,
}

// =============================================================================
// MessageLayer
// =============================================================================

pub struct MessageLayer<S, C, B> {
    codec: Codec,
    store: S,
    crypto: C,
    bloom: B,
    key: PublicKey,
    session: SessionId,
    config: WeftConfig,
    clock: GlobalClock,
    timeline: Timeline,
    undo: UndoLedger,
    matcher: SyncMatcher,
    walker: Walker,
    resolver: Resolver,
    tracker: MissingRequestTracker,
    broker: SignatureBroker,
    endorser: Option<Arc<dyn SignatureEndorser>>,
    keys: HashMap<MemberId, PublicKey>,
    held: HeldQueue,
    /// Progress since the last retry pass.
    woken: Vec<Awaiting>,
    /// Deadline carried over while a held packet is re-dispatched.
    retry_deadline: Option<u64>,
}

impl<S, C, B> MessageLayer<S, C, B>
where
    S: MessageStore,
    C: CryptoEffects,
    B: BloomProbe + BloomBuilder,
{
    pub fn new(
        setup: CommunitySetup,
        store: S,
        crypto: C,
        bloom: B,
        rng: impl RngCore + Send + Sync + 'static,
    ) -> Result<Self, WeftError> {
        setup.config.validate()?;
        let CommunitySetup {
            community,
            root,
            catalog,
            key,
            session,
            local,
            config,
        } = setup;

        let mut keys = HashMap::new();
        keys.insert(root.member_id(), root.clone());
        keys.insert(key.member_id(), key.clone());

        tracing::info!(
            community = %community,
            member = %key.member_id(),
            root = %root.member_id(),
            "joined community"
        );
        let mut layer = Self {
            codec: Codec::new(community, Arc::clone(&catalog), config.wire.clone()),
            timeline: Timeline::new(root.member_id(), Arc::clone(&catalog)),
            matcher: SyncMatcher::new(community, catalog, config.sync.clone()),
            walker: Walker::new(local, config.walker.clone(), rng),
            resolver: Resolver::new(community, config.resolver.clone()),
            tracker: MissingRequestTracker::new(config.resolver.request_timeout_ms),
            broker: SignatureBroker::new(&config.resolver),
            clock: GlobalClock::new(config.timeline.acceptable_global_time_margin),
            undo: UndoLedger::new(),
            endorser: None,
            held: HeldQueue::new(
                config.resolver.held_per_source,
                config.resolver.held_limit,
            ),
            woken: Vec::new(),
            retry_deadline: None,
            keys,
            store,
            crypto,
            bloom,
            key,
            session,
            config,
        };
        layer.publish_identity()?;
        Ok(layer)
    }

    /// Store the local member's identity unless the store already holds one.
    fn publish_identity(&mut self) -> Result<(), WeftError> {
        let community = self.codec.community();
        let member = self.member();
        if let Some(existing) = self.store.identities(&community, &member).last() {
            self.clock.observe(existing.global_time);
            return Ok(());
        }
        let header = Header::Session(SessionHeader {
            session: self.session,
            global_time: self.clock.claim(),
        });
        let body = Body::Identity {
            public_key: self.key.clone(),
        };
        let decoded = self
            .codec
            .encode_signed(header, body, &self.crypto, &self.key)?;
        self.persist(&decoded).map_err(|rejection| rejection.error)?;
        tracing::debug!(
            member = %member,
            global_time = decoded.message.global_time(),
            "identity published"
        );
        Ok(())
    }

    /// Consult `endorser` for incoming signature requests. Without one every request is declined.
    pub fn with_endorser(mut self, endorser: Arc<dyn SignatureEndorser>) -> Self {
        self.endorser = Some(endorser);
        self
    }

    pub fn community(&self) -> CommunityId {
        self.codec.community()
    }

    pub fn member(&self) -> MemberId {
        self.key.member_id()
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn clock(&self) -> &GlobalClock {
        &self.clock
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn undo_ledger(&self) -> &UndoLedger {
        &self.undo
    }

    pub fn walker(&self) -> &Walker {
        &self.walker
    }

    pub fn walker_mut(&mut self) -> &mut Walker {
        &mut self.walker
    }

    pub fn tracker(&self) -> &MissingRequestTracker {
        &self.tracker
    }

    pub fn broker(&self) -> &SignatureBroker {
        &self.broker
    }

    /// Number of packets waiting for missing data.
    pub fn held_len(&self) -> usize {
        self.held.len()
    }

    pub fn known_key(&self, member: &MemberId) -> Option<&PublicKey> {
        self.keys.get(member)
    }

    /// Learn a member's key out of band.
    pub fn register_key(&mut self, key: PublicKey) -> MemberId {
        self.learn_key(&key);
        key.member_id()
    }

    fn learn_key(&mut self, key: &PublicKey) {
        let member = key.member_id();
        if let Entry::Vacant(entry) = self.keys.entry(member) {
            entry.insert(key.clone());
            self.woken.push(Awaiting::Key(member));
        }
    }

    // =========================================================================
    // Inbound
    // =========================================================================

    /// Handle one packet received from `source`.
    pub fn handle_packet(&mut self, packet: &[u8], source: Address, now_ms: u64) -> Dispatch {
        let mut dispatch = Dispatch::default();
        self.dispatch_packet(packet, source, now_ms, true, &mut dispatch);
        self.retry_held(now_ms, &mut dispatch);
        dispatch
    }

    /// Packets answering a peer's sync window.
    pub fn sync_response(&self, window: &SyncWindow) -> Vec<Vec<u8>> {
        self.matcher
            .respond(&self.store, &self.bloom, window, self.clock.current(), None)
    }

    fn dispatch_packet(
        &mut self,
        packet: &[u8],
        source: Address,
        now_ms: u64,
        top_level: bool,
        out: &mut Dispatch,
    ) {
        let decoded = match self.codec.decode(packet) {
            Ok(decoded) => decoded,
            Err(err) => {
                tracing::warn!(
                    source = %source,
                    code = err.code(),
                    error = %err,
                    "undecodable packet"
                );
                out.outcomes.push(Outcome::Rejected {
                    kind: None,
                    code: err.code(),
                    disposition: err.disposition(),
                });
                return;
            }
        };

        if let Body::Collection(elements) = &decoded.message.body {
            if !top_level {
                let rejection = Rejection::new(DispatchError::NestedCollection);
                self.reject(&decoded, source, rejection, now_ms, out);
                return;
            }
            out.outcomes.push(Outcome::Handled {
                kind: MessageKind::Collection,
            });
            // Each element stands alone; one bad element does not affect its siblings.
            for element in elements {
                self.dispatch_packet(element, source, now_ms, false, out);
            }
            return;
        }

        match self.accept(&decoded, source, now_ms, out) {
            Ok(outcome) => out.outcomes.push(outcome),
            Err(rejection) => self.reject(&decoded, source, rejection, now_ms, out),
        }
    }

    fn accept(
        &mut self,
        decoded: &Decoded,
        source: Address,
        now_ms: u64,
        out: &mut Dispatch,
    ) -> Result<Outcome, Rejection> {
        let message = &decoded.message;
        let kind = message.kind();
        let global_time = message.global_time();
        if !self.clock.is_acceptable(global_time) {
            return Err(Rejection::new(DispatchError::FutureGlobalTime {
                global_time,
                bound: self.clock.acceptable_bound(),
            }));
        }
        self.verify(decoded)?;

        let handled = Outcome::Handled { kind };
        match &message.body {
            Body::Identity { public_key } => self.accept_identity(decoded, public_key),
            Body::Authorize(grants) => self.accept_grants(decoded, grants, false),
            Body::Revoke(grants) => self.accept_grants(decoded, grants, true),
            Body::DynamicSettings(settings) => {
                let author = self.authorship(decoded)?;
                self.ensure_new(author.reference())?;
                self.timeline
                    .apply_dynamic_settings(author, settings)
                    .map_err(|err| acceptance_rejection(err, &author))?;
                self.persist(decoded)
            }
            Body::DestroyCommunity { degree } => {
                let author = self.authorship(decoded)?;
                self.ensure_new(author.reference())?;
                self.timeline
                    .destroy(&author.member, author.global_time, *degree)
                    .map_err(|err| acceptance_rejection(err.into(), &author))?;
                self.persist(decoded)
            }
            Body::UndoOwn {
                global_time: target,
            } => self.accept_undo(decoded, None, *target),
            Body::UndoOther {
                member,
                global_time: target,
            } => self.accept_undo(decoded, Some(*member), *target),
            Body::Application { .. } => self.accept_application(decoded),

            Body::IntroductionRequest(request) => {
                self.on_introduction_request(message.member(), request, source, now_ms, out)?;
                Ok(handled)
            }
            Body::IntroductionResponse(response) => {
                self.walker
                    .on_introduction_response(source, message.member(), response, now_ms)
                    .map_err(Rejection::new)?;
                Ok(handled)
            }
            Body::PunctureRequest(request) => {
                let (target, puncture) = self
                    .walker
                    .on_puncture_request(source, request)
                    .map_err(Rejection::new)?;
                self.send(target, Body::Puncture(puncture), out);
                Ok(handled)
            }
            Body::Puncture(puncture) => {
                self.walker
                    .on_puncture(source, puncture, now_ms)
                    .map_err(Rejection::new)?;
                Ok(handled)
            }

            Body::MissingIdentity { member } => {
                let packets = self.resolver.missing_identity(&self.store, member);
                send_all(out, source, packets);
                Ok(handled)
            }
            Body::MissingSequence(request) => {
                let packets = self.resolver.missing_sequence(&self.store, request);
                send_all(out, source, packets);
                Ok(handled)
            }
            Body::MissingMessage(request) => {
                let packets = self.resolver.missing_message(&self.store, request);
                send_all(out, source, packets);
                Ok(handled)
            }
            Body::MissingLastMessage(request) => {
                let packets = self.resolver.missing_last_message(&self.store, request);
                send_all(out, source, packets);
                Ok(handled)
            }
            Body::MissingProof {
                member,
                global_time,
            } => {
                let packets = self.resolver.missing_proof(
                    &self.store,
                    &self.codec,
                    &self.timeline,
                    member,
                    *global_time,
                );
                send_all(out, source, packets);
                Ok(handled)
            }

            Body::SignatureRequest(request) => {
                self.on_signature_request(request, source, out)?;
                Ok(handled)
            }
            Body::SignatureResponse(response) => {
                let proposal = self
                    .broker
                    .on_response(&self.codec, response, now_ms)
                    .map_err(Rejection::new)?;
                out.proposals.push(proposal);
                Ok(handled)
            }

            Body::Collection(_) => Err(Rejection::new(DispatchError::NestedCollection)),
        }
    }

    /// Community messages verify against the signer's known key; identity messages against the
    /// key they carry. Other session-scoped messages are authenticated by the session layer.
    fn verify(&self, decoded: &Decoded) -> Result<(), Rejection> {
        let message = &decoded.message;
        let key = match (message.member(), &message.body) {
            (Some(member), _) => self.keys.get(&member).ok_or_else(|| {
                Rejection::new(DispatchError::UnknownSigner(member))
                    .with_follow_up(Some(FollowUp::Identity(member)))
            })?,
            (None, Body::Identity { public_key }) => public_key,
            (None, _) => return Ok(()),
        };
        if self
            .crypto
            .verify(decoded.signed_prefix(), decoded.signature(), key)
        {
            Ok(())
        } else {
            Err(Rejection::new(DispatchError::BadSignature(key.member_id())))
        }
    }

    fn authorship(&self, decoded: &Decoded) -> Result<Authorship, Rejection> {
        let header = decoded
            .message
            .community_header()
            .ok_or_else(|| Rejection::new(DispatchError::Unsigned(decoded.message.kind())))?;
        Ok(Authorship {
            member: header.member,
            global_time: header.global_time,
            sequence: header.sequence,
        })
    }

    fn ensure_new(&self, reference: MessageRef) -> Result<(), Rejection> {
        let community = self.codec.community();
        match self
            .store
            .get(&community, &reference.member, reference.global_time)
        {
            Some(_) => Err(Rejection::new(DispatchError::AlreadyStored(reference))),
            None => Ok(()),
        }
    }

    fn accept_identity(
        &mut self,
        decoded: &Decoded,
        public_key: &PublicKey,
    ) -> Result<Outcome, Rejection> {
        let member = public_key.member_id();
        let outcome = self.persist(decoded)?;
        self.learn_key(public_key);
        self.tracker.fulfilled(&MissingKey::Identity(member));
        Ok(outcome)
    }

    fn accept_grants(
        &mut self,
        decoded: &Decoded,
        grants: &[PermissionGrant],
        revoke: bool,
    ) -> Result<Outcome, Rejection> {
        let author = self.authorship(decoded)?;
        self.ensure_new(author.reference())?;
        let targets: Vec<GrantTarget> = grants
            .iter()
            .map(|grant| GrantTarget {
                grantee: grant.public_key.member_id(),
                permissions: grant.permissions.clone(),
            })
            .collect();
        let applied = if revoke {
            self.timeline.revoke(author, &targets)
        } else {
            self.timeline.authorize(author, &targets)
        };
        applied.map_err(|err| acceptance_rejection(err, &author))?;

        // Grants carry full public keys, so grantees become verifiable.
        for grant in grants {
            self.learn_key(&grant.public_key);
        }
        self.persist(decoded)
    }

    fn accept_undo(
        &mut self,
        decoded: &Decoded,
        target_member: Option<MemberId>,
        target_time: GlobalTime,
    ) -> Result<Outcome, Rejection> {
        let author = self.authorship(decoded)?;
        self.ensure_new(author.reference())?;
        let reference = MessageRef::new(target_member.unwrap_or(author.member), target_time);
        let community = self.codec.community();
        let Some(stored) = self
            .store
            .get(&community, &reference.member, reference.global_time)
        else {
            let err = AcceptanceError::Undo(UndoViolation::TargetUnknown(reference));
            return Err(acceptance_rejection(err, &author));
        };

        let target = UndoTarget {
            reference,
            kind: stored.kind,
        };
        let record = match target_member {
            None => self.undo.undo_own(&mut self.timeline, author, target),
            Some(_) => self.undo.undo_other(&mut self.timeline, author, target),
        }
        .map_err(|err| acceptance_rejection(err, &author))?;

        let outcome = self.persist(decoded)?;
        self.store
            .set_undone(&community, &reference.member, reference.global_time, true);
        tracing::info!(
            undo = %record.undo,
            target = %record.target,
            own = record.own,
            "message undone"
        );
        Ok(outcome)
    }

    fn accept_application(&mut self, decoded: &Decoded) -> Result<Outcome, Rejection> {
        let author = self.authorship(decoded)?;
        self.ensure_new(author.reference())?;
        let kind = decoded.message.kind();

        let sequence = if self.timeline.catalog().is_sequenced(kind) {
            let sequence = author.sequence.ok_or_else(|| {
                acceptance_rejection(AuthorizationError::Unsequenced(kind).into(), &author)
            })?;
            self.timeline
                .check_sequence(&author.member, kind, sequence)
                .map_err(|err| acceptance_rejection(err.into(), &author))?;
            Some(sequence)
        } else {
            None
        };
        self.timeline
            .check_message(&author.member, kind, author.global_time)
            .map_err(|err| acceptance_rejection(err.into(), &author))?;
        if let Some(sequence) = sequence {
            self.timeline
                .accept_sequence(&author.member, kind, sequence)
                .map_err(|err| acceptance_rejection(err.into(), &author))?;
        }
        self.persist(decoded)
    }

    /// Store an accepted message and settle whatever was waiting for it.
    fn persist(&mut self, decoded: &Decoded) -> Result<Outcome, Rejection> {
        let kind = decoded.message.kind();
        let Some(stored) = StoredMessage::from_decoded(decoded) else {
            return Ok(Outcome::Handled { kind });
        };
        if stored.is_identity() {
            return self.persist_identity(stored);
        }
        let reference = stored.reference();
        let sequence = stored.sequence;
        let community = self.codec.community();
        let inserted = self
            .store
            .put(&community, stored)
            .map_err(|err| Rejection::new(DispatchError::Store(err)))?;
        if !inserted {
            return Err(Rejection::new(DispatchError::AlreadyStored(reference)));
        }

        self.clock.observe(reference.global_time);
        if let Some(sequence) = sequence {
            self.tracker
                .sequence_arrived(reference.member, kind, sequence);
            self.woken.push(Awaiting::Sequence(reference.member, kind));
        }
        self.woken.push(Awaiting::Message(reference));
        if matches!(
            kind,
            MessageKind::Authorize | MessageKind::Revoke | MessageKind::DynamicSettings
        ) {
            self.woken.push(Awaiting::Permissions);
        }
        self.tracker
            .fulfilled(&MissingKey::Message(reference.member, reference.global_time));
        self.tracker
            .fulfilled(&MissingKey::Proof(reference.member, reference.global_time));
        self.tracker
            .fulfilled(&MissingKey::LastMessage(reference.member, kind));
        if self.undo.is_undone(&reference) {
            self.store
                .set_undone(&community, &reference.member, reference.global_time, true);
        }
        tracing::debug!(
            kind = ?kind,
            member = %reference.member,
            global_time = reference.global_time,
            "message stored"
        );
        Ok(Outcome::Stored { kind, reference })
    }

    /// Identities are kept apart from community messages, which may share their
    /// `(member, global time)`.
    fn persist_identity(&mut self, stored: StoredMessage) -> Result<Outcome, Rejection> {
        let reference = stored.reference();
        let inserted = self
            .store
            .put_identity(&self.codec.community(), stored)
            .map_err(|err| Rejection::new(DispatchError::Store(err)))?;
        if !inserted {
            return Err(Rejection::new(DispatchError::AlreadyStored(reference)));
        }
        self.clock.observe(reference.global_time);
        tracing::debug!(
            member = %reference.member,
            global_time = reference.global_time,
            "identity stored"
        );
        Ok(Outcome::Stored {
            kind: MessageKind::Identity,
            reference,
        })
    }

    fn on_introduction_request(
        &mut self,
        member: Option<MemberId>,
        request: &IntroductionRequest,
        source: Address,
        now_ms: u64,
        out: &mut Dispatch,
    ) -> Result<(), Rejection> {
        let reply = self
            .walker
            .on_introduction_request(source, member, request, now_ms)
            .map_err(Rejection::new)?;
        self.send(
            reply.response_to,
            Body::IntroductionResponse(reply.response),
            out,
        );
        if let Some((target, puncture_request)) = reply.puncture_request {
            self.send(target, Body::PunctureRequest(puncture_request), out);
        }
        if let Some(window) = &request.sync {
            send_all(out, source, self.sync_response(window));
        }
        Ok(())
    }

    fn on_signature_request(
        &self,
        request: &SignatureExchange,
        source: Address,
        out: &mut Dispatch,
    ) -> Result<(), Rejection> {
        let Some(endorser) = self.endorser.as_ref() else {
            tracing::debug!(identifier = request.identifier, "no endorser, signature declined");
            return Ok(());
        };
        match answer_signature_request(&self.codec, request, endorser.as_ref())
            .map_err(Rejection::new)?
        {
            Some(response) => self.send(source, Body::SignatureResponse(response), out),
            None => tracing::debug!(identifier = request.identifier, "signature declined"),
        }
        Ok(())
    }

    // =========================================================================
    // Rejection and retry
    // =========================================================================

    fn reject(
        &mut self,
        decoded: &Decoded,
        source: Address,
        rejection: Rejection,
        now_ms: u64,
        out: &mut Dispatch,
    ) {
        let kind = decoded.message.kind();
        let Rejection {
            code,
            disposition,
            error,
            follow_up,
        } = rejection;
        if disposition == Disposition::Ignore {
            tracing::debug!(kind = ?kind, source = %source, code, error = %error, "ignored");
        } else {
            tracing::warn!(kind = ?kind, source = %source, code, error = %error, "rejected");
        }

        let Some(follow_up) = follow_up else {
            out.outcomes.push(Outcome::Rejected {
                kind: Some(kind),
                code,
                disposition,
            });
            return;
        };
        let awaiting = self.awaiting(follow_up);
        match self.hold(awaiting, decoded.packet.clone(), source, now_ms) {
            HoldResult::Full => {
                let overflow = DispatchError::HoldOverflow(source);
                tracing::warn!(kind = ?kind, source = %source, error = %overflow, "not held");
                out.outcomes.push(Outcome::Rejected {
                    kind: Some(kind),
                    code: overflow.code(),
                    disposition: overflow.disposition(),
                });
                return;
            }
            HoldResult::Held | HoldResult::AlreadyHeld => {}
        }
        if let Some(body) = self.follow_up_request(follow_up, now_ms) {
            self.send(source, body, out);
        }
        out.outcomes.push(Outcome::Held { kind, code });
    }

    fn awaiting(&self, follow_up: FollowUp) -> Awaiting {
        match follow_up {
            FollowUp::Identity(member) => Awaiting::Key(member),
            FollowUp::Proof(_) => Awaiting::Permissions,
            FollowUp::Sequence { member, kind, .. } => Awaiting::Sequence(member, kind),
            FollowUp::Message(reference) if !self.keys.contains_key(&reference.member) => {
                Awaiting::Key(reference.member)
            }
            FollowUp::Message(reference) => Awaiting::Message(reference),
        }
    }

    /// The missing-* request for `follow_up`, unless an identical one is still outstanding.
    fn follow_up_request(&mut self, follow_up: FollowUp, now_ms: u64) -> Option<Body> {
        match follow_up {
            FollowUp::Identity(member) => self
                .tracker
                .track(MissingKey::Identity(member), now_ms)
                .then_some(Body::MissingIdentity { member }),
            FollowUp::Proof(reference) => self
                .tracker
                .track(
                    MissingKey::Proof(reference.member, reference.global_time),
                    now_ms,
                )
                .then_some(Body::MissingProof {
                    member: reference.member,
                    global_time: reference.global_time,
                }),
            FollowUp::Sequence {
                member,
                kind,
                low,
                high,
            } => self
                .tracker
                .track_sequence(member, kind, low, high, now_ms)
                .map(|(low, high)| {
                    Body::MissingSequence(MissingSequence {
                        member,
                        kind,
                        low,
                        high,
                        max_response_size: 0,
                    })
                }),
            FollowUp::Message(reference) => {
                let Some(public_key) = self.keys.get(&reference.member).cloned() else {
                    return self.follow_up_request(FollowUp::Identity(reference.member), now_ms);
                };
                self.tracker
                    .track(
                        MissingKey::Message(reference.member, reference.global_time),
                        now_ms,
                    )
                    .then(|| {
                        Body::MissingMessage(MissingMessage {
                            public_key,
                            global_times: vec![reference.global_time],
                        })
                    })
            }
        }
    }

    fn hold(
        &mut self,
        awaiting: Awaiting,
        packet: Vec<u8>,
        source: Address,
        now_ms: u64,
    ) -> HoldResult {
        let deadline_ms = self
            .retry_deadline
            .unwrap_or_else(|| now_ms.saturating_add(self.config.resolver.request_timeout_ms));
        let held = HeldPacket {
            packet,
            source,
            deadline_ms,
        };
        self.held.hold(awaiting, held, now_ms)
    }

    /// Re-run the packets woken by progress until nothing new is woken.
    fn retry_held(&mut self, now_ms: u64, out: &mut Dispatch) {
        while let Some(awaiting) = self.woken.pop() {
            for held in self.held.wake(&awaiting) {
                if held.deadline_ms <= now_ms {
                    continue;
                }
                let mut retry = Dispatch::default();
                self.retry_deadline = Some(held.deadline_ms);
                self.dispatch_packet(&held.packet, held.source, now_ms, false, &mut retry);
                self.retry_deadline = None;

                out.outbound.extend(retry.outbound);
                out.proposals.extend(retry.proposals);
                out.outcomes.extend(retry.outcomes.into_iter().filter(|outcome| {
                    !outcome.is_held()
                        && !matches!(
                            outcome,
                            Outcome::Rejected {
                                disposition: Disposition::Ignore,
                                ..
                            }
                        )
                }));
            }
        }
    }

    // =========================================================================
    // Outbound
    // =========================================================================

    /// Author a community message: claim a global time, take the next sequence number when the
    /// kind is sequenced, sign, and accept it like a received message.
    pub fn create(&mut self, body: Body, now_ms: u64) -> Result<Decoded, WeftError> {
        let kind = body.kind();
        if !is_authored(kind) {
            return Err(WeftError::invalid(format!("{kind} is not authored directly")));
        }
        let member = self.member();
        let sequence = self
            .timeline
            .catalog()
            .is_sequenced(kind)
            .then(|| self.timeline.highest_sequence(&member, kind) + 1);
        let header = Header::Community(CommunityHeader {
            community: self.codec.community(),
            member,
            global_time: self.clock.claim(),
            sequence,
        });
        let decoded = self
            .codec
            .encode_signed(header, body, &self.crypto, &self.key)?;

        let mut scratch = Dispatch::default();
        match self.accept(&decoded, Address::NULL, now_ms, &mut scratch) {
            Ok(_) => Ok(decoded),
            Err(rejection) => {
                tracing::warn!(
                    kind = ?kind,
                    code = rejection.code,
                    error = %rejection.error,
                    "own message rejected"
                );
                Err(rejection.error)
            }
        }
    }

    /// Walk to a random candidate, carrying a sync window over our own history.
    pub fn take_step(&mut self, now_ms: u64) -> Result<Option<Outbound>, WeftError> {
        let window = self.claim_window();
        match self.walker.take_step(Some(window), now_ms)? {
            Some((_, request)) => self.introduction_request(request).map(Some),
            None => Ok(None),
        }
    }

    /// Walk to `destination`. Returns the exchange identifier with the request packet.
    pub fn walk_to(
        &mut self,
        destination: Address,
        now_ms: u64,
    ) -> Result<(u16, Outbound), WeftError> {
        let window = self.claim_window();
        let (identifier, request) = self.walker.start_walk(destination, Some(window), now_ms)?;
        Ok((identifier, self.introduction_request(request)?))
    }

    /// Ask `destination` to countersign `message`.
    pub fn request_signature(
        &mut self,
        message: &Decoded,
        destination: Address,
        now_ms: u64,
    ) -> Result<Outbound, WeftError> {
        let request = self
            .broker
            .request(self.walker.rng_mut(), message, now_ms)?;
        let packet = self.encode_local(Body::SignatureRequest(request))?.packet;
        Ok(Outbound {
            destination,
            packet,
        })
    }

    /// Ask `destination` for the newest `count` messages of `kind` by `member`. `None` while an
    /// identical request is outstanding.
    pub fn request_last_messages(
        &mut self,
        member: MemberId,
        kind: MessageKind,
        count: u8,
        destination: Address,
        now_ms: u64,
    ) -> Result<Option<Outbound>, WeftError> {
        if !self
            .tracker
            .track(MissingKey::LastMessage(member, kind), now_ms)
        {
            return Ok(None);
        }
        let body = Body::MissingLastMessage(MissingLastMessage {
            member,
            kind,
            count,
        });
        let packet = self.encode_local(body)?.packet;
        Ok(Some(Outbound {
            destination,
            packet,
        }))
    }

    /// Timer tick: expire walks, requests and held packets.
    pub fn sweep(&mut self, now_ms: u64) -> SweepReport {
        let report = SweepReport {
            timed_out_walks: self.walker.sweep(now_ms),
            expired_requests: self.tracker.sweep(now_ms),
            expired_signatures: self.broker.sweep(now_ms),
            dropped_held: self.held.expire(now_ms),
        };
        if report.dropped_held > 0 {
            tracing::debug!(dropped = report.dropped_held, "held packets expired");
        }
        report
    }

    fn claim_window(&mut self) -> SyncWindow {
        let current = self.clock.current();
        self.matcher
            .claim_window(&self.store, &self.bloom, self.walker.rng_mut(), current)
    }

    fn introduction_request(&self, request: IntroductionRequest) -> Result<Outbound, WeftError> {
        let destination = request.destination;
        let packet = self
            .encode_local(Body::IntroductionRequest(request))?
            .packet;
        Ok(Outbound {
            destination,
            packet,
        })
    }

    /// Sign `body` as the local member under the header its scope calls for.
    fn encode_local(&self, body: Body) -> Result<Decoded, WeftError> {
        let global_time = self.clock.current();
        let header = match body.kind().scope() {
            Scope::Community => Header::Community(CommunityHeader {
                community: self.codec.community(),
                member: self.member(),
                global_time,
                sequence: None,
            }),
            Scope::Session => Header::Session(SessionHeader {
                session: self.session,
                global_time,
            }),
        };
        self.codec
            .encode_signed(header, body, &self.crypto, &self.key)
    }

    fn send(&self, destination: Address, body: Body, out: &mut Dispatch) {
        let kind = body.kind();
        match self.encode_local(body) {
            Ok(decoded) => out.send(destination, decoded.packet),
            Err(err) => {
                tracing::warn!(
                    kind = ?kind,
                    destination = %destination,
                    error = %err,
                    "reply not sent"
                );
            }
        }
    }
}

fn send_all(out: &mut Dispatch, destination: Address, packets: Vec<Vec<u8>>) {
    for packet in packets {
        out.send(destination, packet);
    }
}

/// Kinds a member signs and the community persists.
fn is_authored(kind: MessageKind) -> bool {
    matches!(
        kind,
        MessageKind::Authorize
            | MessageKind::Revoke
            | MessageKind::UndoOwn
            | MessageKind::UndoOther
            | MessageKind::DynamicSettings
            | MessageKind::DestroyCommunity
            | MessageKind::Application(_)
    )
}

/// Flatten an engine error, attaching the request that could resolve it.
fn acceptance_rejection(err: AcceptanceError, author: &Authorship) -> Rejection {
    let follow_up = match &err {
        AcceptanceError::Sequence(SequenceError::Gap {
            member,
            kind,
            low,
            high,
        }) => Some(FollowUp::Sequence {
            member: *member,
            kind: *kind,
            low: *low,
            high: *high,
        }),
        AcceptanceError::Authorization(AuthorizationError::MissingPermission { .. }) => {
            Some(FollowUp::Proof(author.reference()))
        }
        AcceptanceError::Undo(UndoViolation::TargetUnknown(reference)) => {
            Some(FollowUp::Message(*reference))
        }
        _ => None,
    };
    Rejection::new(err).with_follow_up(follow_up)
}
