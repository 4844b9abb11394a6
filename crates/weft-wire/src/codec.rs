//! # Wire Codec
//!
//! Bidirectional mapping between packets and [`Message`] records.
//!
//! ## Frame layout
//!
//! Community-scoped: `0x00 | 0x01 | community[20] | tag | member[20] | global_time u64 |
//! [sequence u32] | payload_len u16 | payload | signature`.
//!
//! Session-scoped: `tag | session u32 | global_time u64 | payload_len u16 | payload | signature`.
//!
//! All integers are big-endian. The declared payload length must account for every byte of the
//! frame; a disagreement abandons the frame.

use crate::address::OptionBits;
use crate::cursor::{Reader, Writer};
use crate::error::{DecodeError, EncodeError};
use crate::message::{
    Body, CommunityHeader, Decoded, DestroyDegree, Header, IntroductionRequest,
    IntroductionResponse, Message, MissingLastMessage, MissingMessage, MissingSequence,
    PermissionGrant, PolicySetting, Puncture, PunctureRequest, SessionHeader, SignatureExchange,
};
use crate::window::{BloomFilter, SyncWindow};
use std::sync::Arc;
use weft_core::{
    CommunityId, CryptoEffects, MemberId, MessageCatalog, MessageKind, PermissionSet, PolicyType,
    PublicKey, Scope, SessionId, WeftError, WireConfig,
};

/// First byte of every community-scoped frame.
pub const PROTOCOL_VERSION: u8 = 0x00;
/// Second byte of every community-scoped frame.
pub const COMMUNITY_VERSION: u8 = 0x01;

/// Codec bound to one community and its catalog.
#[derive(Debug, Clone)]
pub struct Codec {
    community: CommunityId,
    catalog: Arc<MessageCatalog>,
    config: WireConfig,
}

impl Codec {
    pub fn new(community: CommunityId, catalog: Arc<MessageCatalog>, config: WireConfig) -> Self {
        Self {
            community,
            catalog,
            config,
        }
    }

    pub fn community(&self) -> CommunityId {
        self.community
    }

    pub fn catalog(&self) -> &MessageCatalog {
        &self.catalog
    }

    pub fn signature_length(&self) -> usize {
        self.config.signature_length
    }

    /// Decode one packet.
    pub fn decode(&self, packet: &[u8]) -> Result<Decoded, DecodeError> {
        let first = *packet.first().ok_or(DecodeError::Empty)?;
        let mut reader = Reader::new(packet);

        let (header, kind) = if first == PROTOCOL_VERSION {
            self.read_community_header(&mut reader)?
        } else {
            match MessageKind::from_tag(first) {
                Some(kind) if kind.scope() == Scope::Session => {
                    reader.u8("message identifier")?;
                    let session = SessionId(reader.u32("session identifier")?);
                    let global_time = reader.u64("global time")?;
                    (
                        Header::Session(SessionHeader {
                            session,
                            global_time,
                        }),
                        kind,
                    )
                }
                _ => return Err(DecodeError::UnknownFrame(first)),
            }
        };

        let payload_len = usize::from(reader.u16("payload length")?);
        if payload_len > self.config.max_payload {
            return Err(DecodeError::invalid(
                "payload length",
                format!("{payload_len} exceeds {}", self.config.max_payload),
            ));
        }
        let declared = reader.position() + payload_len + self.config.signature_length;
        if declared != packet.len() {
            return Err(DecodeError::FrameLength {
                declared,
                actual: packet.len(),
            });
        }

        let payload = reader.bytes("payload", payload_len)?;
        let signed_len = reader.position();
        let signature = reader.rest().to_vec();
        let body = self.decode_body(kind, payload)?;

        Ok(Decoded {
            message: Message {
                header,
                body,
                signature,
            },
            packet: packet.to_vec(),
            signed_len,
        })
    }

    fn read_community_header(
        &self,
        reader: &mut Reader<'_>,
    ) -> Result<(Header, MessageKind), DecodeError> {
        let protocol = reader.u8("protocol version")?;
        let community_version = reader.u8("community version")?;
        if protocol != PROTOCOL_VERSION || community_version != COMMUNITY_VERSION {
            return Err(DecodeError::UnsupportedVersion {
                protocol,
                community: community_version,
            });
        }
        let community = CommunityId(reader.array("community identifier")?);
        if community != self.community {
            return Err(DecodeError::WrongCommunity);
        }

        let tag = reader.u8("message identifier")?;
        let kind = MessageKind::from_tag(tag).ok_or(DecodeError::UnknownKind(tag))?;
        if kind.scope() != Scope::Community {
            return Err(DecodeError::ScopeMismatch {
                kind,
                frame: "community",
            });
        }
        if !self.catalog.contains(kind) {
            return Err(DecodeError::UnknownKind(tag));
        }

        let member = MemberId(reader.array("member identifier")?);
        let global_time = reader.u64("global time")?;
        let sequence = if self.catalog.is_sequenced(kind) {
            let sequence = reader.u32("sequence number")?;
            if sequence == 0 {
                return Err(DecodeError::invalid("sequence number", "must start at 1"));
            }
            Some(sequence)
        } else {
            None
        };

        Ok((
            Header::Community(CommunityHeader {
                community,
                member,
                global_time,
                sequence,
            }),
            kind,
        ))
    }

    fn decode_body(&self, kind: MessageKind, payload: &[u8]) -> Result<Body, DecodeError> {
        let mut r = Reader::new(payload);
        let body = match kind {
            MessageKind::MissingSequence => {
                let member = MemberId(r.array("member")?);
                let target = read_kind(&mut r)?;
                let low = r.u32("low sequence")?;
                let high = r.u32("high sequence")?;
                let max_response_size = r.u32("max response size")?;
                if low == 0 || high < low {
                    return Err(DecodeError::invalid(
                        "sequence range",
                        format!("[{low}, {high}]"),
                    ));
                }
                Body::MissingSequence(MissingSequence {
                    member,
                    kind: target,
                    low,
                    high,
                    max_response_size,
                })
            }
            MessageKind::MissingProof => Body::MissingProof {
                member: MemberId(r.array("member")?),
                global_time: r.u64("global time")?,
            },
            MessageKind::SignatureRequest => Body::SignatureRequest(read_exchange(&mut r)?),
            MessageKind::SignatureResponse => Body::SignatureResponse(read_exchange(&mut r)?),
            MessageKind::PunctureRequest => Body::PunctureRequest(PunctureRequest {
                lan_walker: r.address("lan walker address")?,
                wan_walker: r.address("wan walker address")?,
                identifier: r.u16("identifier")?,
            }),
            MessageKind::Puncture => Body::Puncture(Puncture {
                source_lan: r.address("source lan address")?,
                source_wan: r.address("source wan address")?,
                identifier: r.u16("identifier")?,
            }),
            MessageKind::Identity => Body::Identity {
                public_key: read_public_key(&mut r)?,
            },
            MessageKind::MissingIdentity => Body::MissingIdentity {
                member: MemberId(r.array("member")?),
            },
            MessageKind::IntroductionRequest => {
                Body::IntroductionRequest(read_introduction_request(&mut r)?)
            }
            MessageKind::IntroductionResponse => {
                Body::IntroductionResponse(IntroductionResponse {
                    destination: r.address("destination address")?,
                    source_lan: r.address("source lan address")?,
                    source_wan: r.address("source wan address")?,
                    lan_introduction: r.address("lan introduction address")?,
                    wan_introduction: r.address("wan introduction address")?,
                    options: OptionBits(r.u8("options")?),
                    identifier: r.u16("identifier")?,
                })
            }
            MessageKind::DestroyCommunity => {
                let tag = r.u8("degree")?;
                let degree = DestroyDegree::from_tag(tag)
                    .ok_or_else(|| DecodeError::invalid("degree", format!("{tag:#04x}")))?;
                Body::DestroyCommunity { degree }
            }
            MessageKind::Authorize => Body::Authorize(read_grants(&mut r)?),
            MessageKind::Revoke => Body::Revoke(read_grants(&mut r)?),
            MessageKind::MissingMessage => {
                let public_key = read_public_key(&mut r)?;
                let mut global_times = Vec::with_capacity(r.remaining() / 8);
                while !r.is_empty() {
                    global_times.push(r.u64("global time")?);
                }
                if global_times.is_empty() {
                    return Err(DecodeError::invalid("global times", "none listed"));
                }
                Body::MissingMessage(MissingMessage {
                    public_key,
                    global_times,
                })
            }
            MessageKind::UndoOwn => Body::UndoOwn {
                global_time: r.u64("target global time")?,
            },
            MessageKind::UndoOther => Body::UndoOther {
                member: MemberId(r.array("target member")?),
                global_time: r.u64("target global time")?,
            },
            MessageKind::DynamicSettings => {
                let mut settings = Vec::new();
                while !r.is_empty() {
                    let target = read_kind(&mut r)?;
                    let policy_tag = r.u8("policy type")?;
                    let policy_type = PolicyType::from_tag(policy_tag).ok_or_else(|| {
                        DecodeError::invalid("policy type", format!("{policy_tag:#04x}"))
                    })?;
                    settings.push(PolicySetting {
                        kind: target,
                        policy_type,
                        index: r.u8("policy index")?,
                    });
                }
                if settings.is_empty() {
                    return Err(DecodeError::invalid("dynamic settings", "no entries"));
                }
                Body::DynamicSettings(settings)
            }
            MessageKind::MissingLastMessage => {
                let member = MemberId(r.array("member")?);
                let target = read_kind(&mut r)?;
                let count = r.u8("count")?;
                if count == 0 {
                    return Err(DecodeError::invalid("count", "must be positive"));
                }
                Body::MissingLastMessage(MissingLastMessage {
                    member,
                    kind: target,
                    count,
                })
            }
            MessageKind::Collection => Body::Collection(read_collection(&mut r)?),
            MessageKind::Application(tag) => Body::Application {
                tag,
                data: r.rest().to_vec(),
            },
        };

        if !r.is_empty() {
            return Err(DecodeError::TrailingBytes {
                kind,
                remaining: r.remaining(),
            });
        }
        Ok(body)
    }

    /// Bytes covered by the signature of a message with this header and body.
    pub fn signed_prefix(&self, header: &Header, body: &Body) -> Result<Vec<u8>, EncodeError> {
        let kind = body.kind();
        if let MessageKind::Application(tag) = kind {
            if !self.catalog.contains(kind) {
                return Err(EncodeError::UnknownKind(tag));
            }
        }

        let payload = self.encode_body(body)?;
        let max = self.config.max_payload.min(usize::from(u16::MAX));
        let payload_len = u16::try_from(payload.len())
            .ok()
            .filter(|len| usize::from(*len) <= max)
            .ok_or(EncodeError::TooLong {
                field: "payload",
                len: payload.len(),
                max,
            })?;

        let mut w = Writer::with_capacity(64 + payload.len() + self.config.signature_length);
        match (header, kind.scope()) {
            (Header::Community(h), Scope::Community) => {
                if h.sequence.is_some() != self.catalog.is_sequenced(kind) {
                    return Err(EncodeError::SequenceMismatch(kind));
                }
                w.u8(PROTOCOL_VERSION);
                w.u8(COMMUNITY_VERSION);
                w.bytes(h.community.as_bytes());
                w.u8(kind.tag());
                w.bytes(h.member.as_bytes());
                w.u64(h.global_time);
                if let Some(sequence) = h.sequence {
                    w.u32(sequence);
                }
            }
            (Header::Session(h), Scope::Session) => {
                w.u8(kind.tag());
                w.u32(h.session.0);
                w.u64(h.global_time);
            }
            (_, Scope::Community) => {
                return Err(EncodeError::HeaderMismatch {
                    kind,
                    expected: "community",
                })
            }
            (_, Scope::Session) => {
                return Err(EncodeError::HeaderMismatch {
                    kind,
                    expected: "session",
                })
            }
        }
        w.u16(payload_len);
        w.bytes(&payload);
        Ok(w.into_inner())
    }

    /// Encode a message whose signature is already present.
    pub fn encode(&self, message: &Message) -> Result<Vec<u8>, EncodeError> {
        if message.signature.len() != self.config.signature_length {
            return Err(EncodeError::SignatureLength {
                expected: self.config.signature_length,
                actual: message.signature.len(),
            });
        }
        let mut packet = self.signed_prefix(&message.header, &message.body)?;
        packet.extend_from_slice(&message.signature);
        Ok(packet)
    }

    /// Sign with `key` through the crypto collaborator and encode.
    pub fn encode_signed<C: CryptoEffects + ?Sized>(
        &self,
        header: Header,
        body: Body,
        crypto: &C,
        key: &PublicKey,
    ) -> Result<Decoded, WeftError> {
        let prefix = self.signed_prefix(&header, &body)?;
        let signature = crypto.sign(&prefix, key)?;
        if signature.len() != self.config.signature_length {
            return Err(EncodeError::SignatureLength {
                expected: self.config.signature_length,
                actual: signature.len(),
            }
            .into());
        }
        let signed_len = prefix.len();
        let mut packet = prefix;
        packet.extend_from_slice(&signature);
        Ok(Decoded {
            message: Message {
                header,
                body,
                signature,
            },
            packet,
            signed_len,
        })
    }

    fn encode_body(&self, body: &Body) -> Result<Vec<u8>, EncodeError> {
        let kind = body.kind();
        let mut w = Writer::default();
        match body {
            Body::MissingSequence(m) => {
                w.bytes(m.member.as_bytes());
                w.u8(m.kind.tag());
                w.u32(m.low);
                w.u32(m.high);
                w.u32(m.max_response_size);
            }
            Body::MissingProof {
                member,
                global_time,
            } => {
                w.bytes(member.as_bytes());
                w.u64(*global_time);
            }
            Body::SignatureRequest(exchange) | Body::SignatureResponse(exchange) => {
                w.u16(exchange.identifier);
                w.short_bytes("signature blob", &exchange.blob)?;
            }
            Body::PunctureRequest(p) => {
                w.address(&p.lan_walker);
                w.address(&p.wan_walker);
                w.u16(p.identifier);
            }
            Body::Puncture(p) => {
                w.address(&p.source_lan);
                w.address(&p.source_wan);
                w.u16(p.identifier);
            }
            Body::Identity { public_key } => {
                w.short_bytes("public key", public_key.as_bytes())?;
            }
            Body::MissingIdentity { member } => w.bytes(member.as_bytes()),
            Body::IntroductionRequest(req) => {
                if req.options.has_sync() != req.sync.is_some() {
                    return Err(EncodeError::WindowMismatch);
                }
                w.address(&req.destination);
                w.address(&req.source_lan);
                w.address(&req.source_wan);
                w.u8(req.options.0);
                w.u16(req.identifier);
                if let Some(window) = &req.sync {
                    w.u64(window.time_low);
                    w.u64(window.time_high);
                    w.u16(window.modulo);
                    w.u16(window.offset);
                    w.u8(window.bloom.functions);
                    w.u8(window.bloom.prefix);
                    w.short_bytes("bloom filter", &window.bloom.bits)?;
                }
            }
            Body::IntroductionResponse(resp) => {
                w.address(&resp.destination);
                w.address(&resp.source_lan);
                w.address(&resp.source_wan);
                w.address(&resp.lan_introduction);
                w.address(&resp.wan_introduction);
                w.u8(resp.options.0);
                w.u16(resp.identifier);
            }
            Body::DestroyCommunity { degree } => w.u8(degree.tag()),
            Body::Authorize(grants) | Body::Revoke(grants) => {
                if grants.is_empty() {
                    return Err(EncodeError::Empty {
                        kind,
                        field: "grant",
                    });
                }
                for grant in grants {
                    w.short_bytes("public key", grant.public_key.as_bytes())?;
                    let count = u8::try_from(grant.permissions.len())
                        .ok()
                        .filter(|count| *count > 0)
                        .ok_or(EncodeError::TooLong {
                            field: "permission pairs",
                            len: grant.permissions.len(),
                            max: usize::from(u8::MAX),
                        })?;
                    w.u8(count);
                    for (target, permissions) in &grant.permissions {
                        w.u8(target.tag());
                        w.u8(permissions.bits());
                    }
                }
            }
            Body::MissingMessage(m) => {
                if m.global_times.is_empty() {
                    return Err(EncodeError::Empty {
                        kind,
                        field: "global time",
                    });
                }
                w.short_bytes("public key", m.public_key.as_bytes())?;
                for global_time in &m.global_times {
                    w.u64(*global_time);
                }
            }
            Body::UndoOwn { global_time } => w.u64(*global_time),
            Body::UndoOther {
                member,
                global_time,
            } => {
                w.bytes(member.as_bytes());
                w.u64(*global_time);
            }
            Body::DynamicSettings(settings) => {
                if settings.is_empty() {
                    return Err(EncodeError::Empty {
                        kind,
                        field: "policy setting",
                    });
                }
                for setting in settings {
                    w.u8(setting.kind.tag());
                    w.u8(setting.policy_type.tag());
                    w.u8(setting.index);
                }
            }
            Body::MissingLastMessage(m) => {
                w.bytes(m.member.as_bytes());
                w.u8(m.kind.tag());
                w.u8(m.count);
            }
            Body::Collection(packets) => {
                if packets.is_empty() {
                    return Err(EncodeError::Empty {
                        kind,
                        field: "packet",
                    });
                }
                for packet in packets {
                    w.short_bytes("collection element", packet)?;
                }
            }
            Body::Application { data, .. } => w.bytes(data),
        }
        tracing::trace!(kind = %kind, len = w.len(), "encoded payload");
        Ok(w.into_inner())
    }
}

fn read_kind(r: &mut Reader<'_>) -> Result<MessageKind, DecodeError> {
    let tag = r.u8("message identifier")?;
    MessageKind::from_tag(tag).ok_or(DecodeError::UnknownKind(tag))
}

fn read_public_key(r: &mut Reader<'_>) -> Result<PublicKey, DecodeError> {
    let key = r.short_bytes("public key")?;
    if key.is_empty() {
        return Err(DecodeError::invalid("public key", "empty"));
    }
    Ok(PublicKey::new(key))
}

fn read_exchange(r: &mut Reader<'_>) -> Result<SignatureExchange, DecodeError> {
    let identifier = r.u16("identifier")?;
    let blob = r.short_bytes("signature blob")?.to_vec();
    Ok(SignatureExchange { identifier, blob })
}

fn read_grants(r: &mut Reader<'_>) -> Result<Vec<PermissionGrant>, DecodeError> {
    let mut grants = Vec::new();
    while !r.is_empty() {
        let public_key = read_public_key(r)?;
        let count = r.u8("permission pair count")?;
        if count == 0 {
            return Err(DecodeError::invalid("permission pair count", "must be positive"));
        }
        let mut permissions = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            let target = read_kind(r)?;
            let bits = r.u8("permission bits")?;
            let set = PermissionSet::from_bits(bits)
                .filter(|set| !set.is_empty())
                .ok_or(DecodeError::InvalidPermissions(bits))?;
            permissions.push((target, set));
        }
        grants.push(PermissionGrant {
            public_key,
            permissions,
        });
    }
    if grants.is_empty() {
        return Err(DecodeError::invalid("grants", "no groups"));
    }
    Ok(grants)
}

fn read_introduction_request(r: &mut Reader<'_>) -> Result<IntroductionRequest, DecodeError> {
    let destination = r.address("destination address")?;
    let source_lan = r.address("source lan address")?;
    let source_wan = r.address("source wan address")?;
    let options = OptionBits(r.u8("options")?);
    let identifier = r.u16("identifier")?;

    let sync = if options.has_sync() {
        if r.is_empty() {
            return Err(DecodeError::WindowMismatch("sync bit set without a window"));
        }
        Some(read_sync_window(r).map_err(|err| match err {
            DecodeError::Truncated { .. } => DecodeError::WindowMismatch("partial sync window"),
            other => other,
        })?)
    } else {
        if !r.is_empty() {
            return Err(DecodeError::WindowMismatch("window present without sync bit"));
        }
        None
    };

    Ok(IntroductionRequest {
        destination,
        source_lan,
        source_wan,
        options,
        identifier,
        sync,
    })
}

fn read_sync_window(r: &mut Reader<'_>) -> Result<SyncWindow, DecodeError> {
    let time_low = r.u64("time low")?;
    let time_high = r.u64("time high")?;
    let modulo = r.u16("modulo")?;
    let offset = r.u16("offset")?;
    let functions = r.u8("bloom functions")?;
    let prefix = r.u8("bloom prefix")?;
    let bits = r.short_bytes("bloom filter")?.to_vec();

    if time_low == 0 || (time_high != 0 && time_high < time_low) {
        return Err(DecodeError::invalid(
            "sync range",
            format!("[{time_low}, {time_high}]"),
        ));
    }
    if modulo == 0 || offset >= modulo {
        return Err(DecodeError::invalid(
            "sync modulo",
            format!("offset {offset} modulo {modulo}"),
        ));
    }
    if functions == 0 || bits.is_empty() {
        return Err(DecodeError::invalid("bloom filter", "no functions or bits"));
    }

    Ok(SyncWindow {
        time_low,
        time_high,
        modulo,
        offset,
        bloom: BloomFilter {
            functions,
            prefix,
            bits,
        },
    })
}

fn read_collection(r: &mut Reader<'_>) -> Result<Vec<Vec<u8>>, DecodeError> {
    let mut packets = Vec::new();
    while !r.is_empty() {
        if r.remaining() < 2 {
            return Err(DecodeError::CollectionOverrun {
                declared: 2,
                remaining: r.remaining(),
            });
        }
        let len = usize::from(r.u16("collection element length")?);
        if len == 0 {
            return Err(DecodeError::invalid("collection element", "empty"));
        }
        if len > r.remaining() {
            return Err(DecodeError::CollectionOverrun {
                declared: len,
                remaining: r.remaining(),
            });
        }
        packets.push(r.bytes("collection element", len)?.to_vec());
    }
    if packets.is_empty() {
        return Err(DecodeError::invalid("collection", "no elements"));
    }
    Ok(packets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;
    use assert_matches::assert_matches;
    use std::net::Ipv4Addr;
    use weft_core::{MessageMeta, Permission};

    const SIG: usize = 4;

    fn codec() -> Codec {
        let catalog = MessageCatalog::with_builtins()
            .with(MessageMeta::application(0x01, "text").with_sequence())
            .unwrap()
            .with(MessageMeta::application(0x02, "note"))
            .unwrap();
        Codec::new(
            CommunityId::from_seed(9),
            Arc::new(catalog),
            WireConfig {
                signature_length: SIG,
                ..WireConfig::default()
            },
        )
    }

    fn community_header(sequence: Option<u32>) -> Header {
        Header::Community(CommunityHeader {
            community: CommunityId::from_seed(9),
            member: MemberId::from_seed(1),
            global_time: 42,
            sequence,
        })
    }

    fn session_header() -> Header {
        Header::Session(SessionHeader {
            session: SessionId(0xdead_beef),
            global_time: 7,
        })
    }

    fn encode(header: Header, body: Body) -> Vec<u8> {
        codec()
            .encode(&Message {
                header,
                body,
                signature: vec![0xAA; SIG],
            })
            .unwrap()
    }

    #[test]
    fn test_sequenced_kind_requires_sequence() {
        let err = codec()
            .encode(&Message {
                header: community_header(None),
                body: Body::UndoOwn { global_time: 1 },
                signature: vec![0; SIG],
            })
            .unwrap_err();
        assert_eq!(err, EncodeError::SequenceMismatch(MessageKind::UndoOwn));
    }

    #[test]
    fn test_undo_own_frame_bytes() {
        let packet = encode(community_header(Some(3)), Body::UndoOwn { global_time: 5 });
        assert_eq!(packet[22], 0xEE);
        assert_eq!(&packet[23..43], &[1u8; 20]);
        assert_eq!(&packet[43..51], &42u64.to_be_bytes());
        assert_eq!(&packet[51..55], &3u32.to_be_bytes());
        assert_eq!(&packet[55..57], &8u16.to_be_bytes());
        assert_eq!(&packet[57..65], &5u64.to_be_bytes());
        assert_eq!(&packet[65..], &[0xAA; SIG]);

        let decoded = codec().decode(&packet).unwrap();
        assert_eq!(decoded.signed_prefix(), &packet[..65]);
        assert_eq!(decoded.message.sequence(), Some(3));
    }

    #[test]
    fn test_session_frame_bytes() {
        let packet = encode(
            session_header(),
            Body::MissingIdentity {
                member: MemberId::from_seed(4),
            },
        );
        assert_eq!(packet[0], 0xF7);
        assert_eq!(&packet[1..5], &0xdead_beefu32.to_be_bytes());
        assert_eq!(&packet[13..15], &20u16.to_be_bytes());
        assert_eq!(packet.len(), 15 + 20 + SIG);
    }

    #[test]
    fn test_authorize_round_trip() {
        let body = Body::Authorize(vec![PermissionGrant {
            public_key: PublicKey::new(vec![1, 2, 3]),
            permissions: vec![
                (
                    MessageKind::Application(1),
                    [Permission::Permit, Permission::Undo].into_iter().collect(),
                ),
                (
                    MessageKind::Revoke,
                    PermissionSet::empty().with(Permission::Authorize),
                ),
            ],
        }]);
        let packet = encode(community_header(Some(1)), body.clone());
        let decoded = codec().decode(&packet).unwrap();
        assert_eq!(decoded.message.body, body);
    }

    #[test]
    fn test_rejects_empty_permission_mask() {
        let packet = encode(
            community_header(Some(1)),
            Body::Authorize(vec![PermissionGrant {
                public_key: PublicKey::new(vec![7]),
                permissions: vec![(MessageKind::Application(1), PermissionSet::empty())],
            }]),
        );
        assert_eq!(
            codec().decode(&packet).unwrap_err(),
            DecodeError::InvalidPermissions(0)
        );
    }

    #[test]
    fn test_introduction_request_sync_bit_contract() {
        let request = IntroductionRequest {
            destination: Address::new(Ipv4Addr::new(1, 2, 3, 4), 1000),
            source_lan: Address::new(Ipv4Addr::new(192, 168, 1, 2), 1000),
            source_wan: Address::new(Ipv4Addr::new(5, 6, 7, 8), 1000),
            options: OptionBits::default().with_advice(true),
            identifier: 77,
            sync: None,
        };
        let packet = encode(community_header(None), Body::IntroductionRequest(request));

        // Flip the sync bit without supplying a window.
        let mut flipped = packet.clone();
        let options_at = 53 + 18;
        flipped[options_at] |= OptionBits::SYNC;
        assert_matches!(
            codec().decode(&flipped),
            Err(DecodeError::WindowMismatch(_))
        );
    }

    #[test]
    fn test_partial_window_is_window_mismatch() {
        let window = SyncWindow {
            time_low: 1,
            time_high: 0,
            modulo: 1,
            offset: 0,
            bloom: BloomFilter {
                functions: 3,
                prefix: 0,
                bits: vec![0xFF; 8],
            },
        };
        let request = IntroductionRequest {
            destination: Address::NULL,
            source_lan: Address::NULL,
            source_wan: Address::NULL,
            options: OptionBits::default().with_sync(true),
            identifier: 1,
            sync: Some(window),
        };
        let full = codec()
            .signed_prefix(&community_header(None), &Body::IntroductionRequest(request))
            .unwrap();
        let payload = &full[53..];
        // Cut the window short and rebuild the frame around the shorter payload.
        let short_payload = &payload[..payload.len() - 10];
        let mut packet = full[..51].to_vec();
        packet.extend_from_slice(&(short_payload.len() as u16).to_be_bytes());
        packet.extend_from_slice(short_payload);
        packet.extend_from_slice(&[0; SIG]);
        assert_matches!(
            codec().decode(&packet),
            Err(DecodeError::WindowMismatch("partial sync window"))
        );
    }

    #[test]
    fn test_collection_overrun_severs_frame() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&3u16.to_be_bytes());
        payload.extend_from_slice(&[1, 2, 3]);
        payload.extend_from_slice(&9u16.to_be_bytes());
        payload.extend_from_slice(&[4, 5]);

        let mut packet = vec![0xE0];
        packet.extend_from_slice(&1u32.to_be_bytes());
        packet.extend_from_slice(&1u64.to_be_bytes());
        packet.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        packet.extend_from_slice(&payload);
        packet.extend_from_slice(&[0; SIG]);

        let err = codec().decode(&packet).unwrap_err();
        assert!(err.severs_frame());
        assert_matches!(err, DecodeError::CollectionOverrun { declared: 9, .. });
    }

    #[test]
    fn test_unknown_first_byte() {
        assert_eq!(
            codec().decode(&[0x42, 0, 0]).unwrap_err(),
            DecodeError::UnknownFrame(0x42)
        );
        assert_eq!(codec().decode(&[]).unwrap_err(), DecodeError::Empty);
    }

    #[test]
    fn test_wrong_community_rejected() {
        let mut packet = encode(
            community_header(None),
            Body::Application {
                tag: 2,
                data: vec![1],
            },
        );
        packet[2] ^= 0xFF;
        assert_eq!(codec().decode(&packet).unwrap_err(), DecodeError::WrongCommunity);
    }

    #[test]
    fn test_unregistered_application_kind_rejected() {
        let err = codec()
            .signed_prefix(
                &community_header(None),
                &Body::Application {
                    tag: 0x33,
                    data: vec![],
                },
            )
            .unwrap_err();
        assert_eq!(err, EncodeError::UnknownKind(0x33));
    }

    #[test]
    fn test_extra_byte_is_frame_length_mismatch() {
        let mut packet = encode(
            session_header(),
            Body::MissingIdentity {
                member: MemberId::from_seed(4),
            },
        );
        packet.push(0);
        assert_matches!(
            codec().decode(&packet),
            Err(DecodeError::FrameLength { .. })
        );
    }
}
