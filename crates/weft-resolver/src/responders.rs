//! Answers to missing-* requests.
//!
//! Every responder reads the store and returns the raw packets to send back. Nothing here mutates
//! the store or the timeline, so responders may run alongside acceptance against a consistent
//! snapshot.

use weft_authorization::Timeline;
use weft_core::{
    CommunityId, GlobalTime, MemberId, MessageKind, MessageRef, Permission, PolicyType,
    ResolutionPolicy, ResolverConfig,
};
use weft_wire::{
    Body, Codec, Message, MessageStore, MissingLastMessage, MissingMessage, MissingSequence,
    StoredMessage,
};

// =============================================================================
// Resolver
// =============================================================================

/// Store-backed responders for one community.
#[derive(Debug, Clone)]
pub struct Resolver {
    community: CommunityId,
    config: ResolverConfig,
}

impl Resolver {
    /// Responders answering for `community`, bounded by `config`.
    pub fn new(community: CommunityId, config: ResolverConfig) -> Self {
        Self { community, config }
    }

    /// Community whose store entries these responders serve.
    pub fn community(&self) -> CommunityId {
        self.community
    }

    /// Limits applied to every answer.
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Identity packets for `member`, at most `identity_limit` of them.
    pub fn missing_identity<S: MessageStore + ?Sized>(
        &self,
        store: &S,
        member: &MemberId,
    ) -> Vec<Vec<u8>> {
        let packets: Vec<Vec<u8>> = store
            .identities(&self.community, member)
            .into_iter()
            .take(self.config.identity_limit)
            .map(|message| message.packet)
            .collect();
        if packets.is_empty() {
            tracing::debug!(member = %member, "no identity to offer");
        }
        packets
    }

    /// Byte budget for a missing-sequence answer: the smaller of the requester's limit (zero
    /// meaning none) and our own cap.
    pub fn sequence_budget(&self, requested: u32) -> usize {
        let cap = self.config.sequence_response_cap;
        match requested {
            0 => cap,
            limit => usize::try_from(limit).map_or(cap, |limit| limit.min(cap)),
        }
    }

    /// Messages of `request.kind` by `request.member` with a sequence in `low..=high`, ascending.
    ///
    /// Sequences we do not have are skipped silently. Emission stops after the packet that
    /// exhausts the budget.
    pub fn missing_sequence<S: MessageStore + ?Sized>(
        &self,
        store: &S,
        request: &MissingSequence,
    ) -> Vec<Vec<u8>> {
        let range = request.low..=request.high;
        let mut matching: Vec<StoredMessage> = store
            .scan_member_kind(&self.community, &request.member, request.kind)
            .into_iter()
            .filter(|message| message.sequence.is_some_and(|sequence| range.contains(&sequence)))
            .collect();
        matching.sort_by_key(|message| message.sequence);

        let mut budget = self.sequence_budget(request.max_response_size);
        let mut packets = Vec::new();
        for message in matching {
            if budget == 0 {
                tracing::debug!(
                    member = %request.member,
                    kind = ?request.kind,
                    sent = packets.len(),
                    "missing-sequence budget exhausted"
                );
                break;
            }
            budget = budget.saturating_sub(message.packet.len());
            packets.push(message.packet);
        }
        packets
    }

    /// Messages of the key's member at exactly the listed global times, in request order.
    pub fn missing_message<S: MessageStore + ?Sized>(
        &self,
        store: &S,
        request: &MissingMessage,
    ) -> Vec<Vec<u8>> {
        let member = request.public_key.member_id();
        let mut seen: Vec<GlobalTime> = Vec::with_capacity(request.global_times.len());
        let mut packets = Vec::new();
        for global_time in &request.global_times {
            if seen.contains(global_time) {
                continue;
            }
            seen.push(*global_time);
            if let Some(message) = store.get(&self.community, &member, *global_time) {
                packets.push(message.packet);
            }
        }
        packets
    }

    /// The newest `count` messages of `request.kind` by `request.member`, oldest first.
    pub fn missing_last_message<S: MessageStore + ?Sized>(
        &self,
        store: &S,
        request: &MissingLastMessage,
    ) -> Vec<Vec<u8>> {
        let messages = store.scan_member_kind(&self.community, &request.member, request.kind);
        let skip = messages.len().saturating_sub(usize::from(request.count));
        messages
            .into_iter()
            .skip(skip)
            .map(|message| message.packet)
            .collect()
    }

    /// Authorize packets proving that the message at `(member, global_time)` was allowed.
    ///
    /// Packets are ordered root-most first and deduplicated. Nothing is returned for messages we
    /// do not have, messages that need no permission, or messages we cannot prove ourselves.
    pub fn missing_proof<S: MessageStore + ?Sized>(
        &self,
        store: &S,
        codec: &Codec,
        timeline: &Timeline,
        member: &MemberId,
        global_time: GlobalTime,
    ) -> Vec<Vec<u8>> {
        let Some(stored) = store.get(&self.community, member, global_time) else {
            tracing::debug!(member = %member, global_time, "proof requested for unknown message");
            return Vec::new();
        };
        let message = match codec.decode(&stored.packet) {
            Ok(decoded) => decoded.message,
            Err(err) => {
                tracing::warn!(member = %member, global_time, error = %err, "stored packet does not decode");
                return Vec::new();
            }
        };

        let mut references: Vec<MessageRef> = Vec::new();
        for (kind, permission) in self.required_permissions(store, timeline, &message) {
            let Some(chain) = timeline.proof_chain(member, kind, permission, global_time) else {
                tracing::debug!(member = %member, kind = ?kind, permission = %permission, "cannot prove permission");
                continue;
            };
            for reference in chain {
                if !references.contains(&reference) {
                    references.push(reference);
                }
            }
        }

        references
            .into_iter()
            .rev()
            .filter_map(|reference| {
                store
                    .get(&self.community, &reference.member, reference.global_time)
                    .map(|proof| proof.packet)
            })
            .collect()
    }

    /// Bits the signer of `message` must hold for it to be accepted.
    fn required_permissions<S: MessageStore + ?Sized>(
        &self,
        store: &S,
        timeline: &Timeline,
        message: &Message,
    ) -> Vec<(MessageKind, Permission)> {
        let global_time = message.global_time();
        let mut required: Vec<(MessageKind, Permission)> = Vec::new();
        let mut require = |kind: MessageKind, permission: Permission| {
            if !required.contains(&(kind, permission)) {
                required.push((kind, permission));
            }
        };

        match &message.body {
            Body::Application { .. } => {
                let kind = message.kind();
                let policy = timeline.resolve_policy(kind, PolicyType::Resolution, global_time);
                if matches!(policy, ResolutionPolicy::Linear) {
                    require(kind, Permission::Permit);
                }
            }
            Body::Authorize(grants) => grants
                .iter()
                .flat_map(|grant| grant.permissions.iter())
                .for_each(|(kind, _)| require(*kind, Permission::Authorize)),
            Body::Revoke(grants) => grants
                .iter()
                .flat_map(|grant| grant.permissions.iter())
                .for_each(|(kind, _)| require(*kind, Permission::Revoke)),
            Body::DynamicSettings(settings) => settings
                .iter()
                .for_each(|setting| require(setting.kind, Permission::Authorize)),
            Body::DestroyCommunity { .. } => {
                require(MessageKind::DestroyCommunity, Permission::Permit);
            }
            Body::UndoOther {
                member,
                global_time: target_time,
            } => {
                if let Some(target) = store.get(&self.community, member, *target_time) {
                    require(target.kind, Permission::Undo);
                }
            }
            _ => {}
        }
        required
    }
}
