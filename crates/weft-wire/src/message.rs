//! Typed message records.
//!
//! One [`Body`] variant per message kind. Headers come in two families: community-scoped messages
//! name the community and the signing member, session-scoped messages name a session instead.

use crate::address::{Address, OptionBits};
use crate::window::SyncWindow;
use serde::{Deserialize, Serialize};
use weft_core::{
    CommunityId, GlobalTime, MemberId, MessageKind, PermissionSet, PolicyType, PublicKey, Scope,
    SessionId,
};

/// Header of a community-scoped message. Protocol and community versions are fixed constants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunityHeader {
    pub community: CommunityId,
    pub member: MemberId,
    pub global_time: GlobalTime,
    /// Present exactly for sequenced kinds.
    pub sequence: Option<u32>,
}

/// Header of a session-scoped message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionHeader {
    pub session: SessionId,
    pub global_time: GlobalTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Header {
    Community(CommunityHeader),
    Session(SessionHeader),
}

impl Header {
    pub fn global_time(&self) -> GlobalTime {
        match self {
            Header::Community(header) => header.global_time,
            Header::Session(header) => header.global_time,
        }
    }

    pub fn scope(&self) -> Scope {
        match self {
            Header::Community(_) => Scope::Community,
            Header::Session(_) => Scope::Session,
        }
    }
}

/// Permission bits granted or revoked to one public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGrant {
    pub public_key: PublicKey,
    pub permissions: Vec<(MessageKind, PermissionSet)>,
}

/// One dynamic-settings entry: switch `kind`'s `policy_type` to variant `index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySetting {
    pub kind: MessageKind,
    pub policy_type: PolicyType,
    pub index: u8,
}

/// Destroy-community degree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DestroyDegree {
    Soft,
    Hard,
}

impl DestroyDegree {
    pub fn tag(self) -> u8 {
        match self {
            DestroyDegree::Soft => 0x73,
            DestroyDegree::Hard => 0x68,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x73 => Some(DestroyDegree::Soft),
            0x68 => Some(DestroyDegree::Hard),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntroductionRequest {
    pub destination: Address,
    pub source_lan: Address,
    pub source_wan: Address,
    pub options: OptionBits,
    pub identifier: u16,
    /// Present iff the sync option bit is set.
    pub sync: Option<SyncWindow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntroductionResponse {
    pub destination: Address,
    pub source_lan: Address,
    pub source_wan: Address,
    pub lan_introduction: Address,
    pub wan_introduction: Address,
    pub options: OptionBits,
    pub identifier: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PunctureRequest {
    pub lan_walker: Address,
    pub wan_walker: Address,
    pub identifier: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Puncture {
    pub source_lan: Address,
    pub source_wan: Address,
    pub identifier: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingSequence {
    pub member: MemberId,
    pub kind: MessageKind,
    pub low: u32,
    pub high: u32,
    /// Zero means no requester-side limit.
    pub max_response_size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingMessage {
    pub public_key: PublicKey,
    pub global_times: Vec<GlobalTime>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingLastMessage {
    pub member: MemberId,
    pub kind: MessageKind,
    pub count: u8,
}

/// Payload of signature requests and responses: a correlation identifier and an embedded packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureExchange {
    pub identifier: u16,
    pub blob: Vec<u8>,
}

/// Kind-specific payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Body {
    MissingSequence(MissingSequence),
    MissingProof {
        member: MemberId,
        global_time: GlobalTime,
    },
    SignatureRequest(SignatureExchange),
    SignatureResponse(SignatureExchange),
    PunctureRequest(PunctureRequest),
    Puncture(Puncture),
    Identity {
        public_key: PublicKey,
    },
    MissingIdentity {
        member: MemberId,
    },
    IntroductionRequest(IntroductionRequest),
    IntroductionResponse(IntroductionResponse),
    DestroyCommunity {
        degree: DestroyDegree,
    },
    Authorize(Vec<PermissionGrant>),
    Revoke(Vec<PermissionGrant>),
    MissingMessage(MissingMessage),
    UndoOwn {
        global_time: GlobalTime,
    },
    UndoOther {
        member: MemberId,
        global_time: GlobalTime,
    },
    DynamicSettings(Vec<PolicySetting>),
    MissingLastMessage(MissingLastMessage),
    /// Length-prefixed packets, each decoded independently.
    Collection(Vec<Vec<u8>>),
    Application {
        tag: u8,
        data: Vec<u8>,
    },
}

impl Body {
    pub fn kind(&self) -> MessageKind {
        match self {
            Body::MissingSequence(_) => MessageKind::MissingSequence,
            Body::MissingProof { .. } => MessageKind::MissingProof,
            Body::SignatureRequest(_) => MessageKind::SignatureRequest,
            Body::SignatureResponse(_) => MessageKind::SignatureResponse,
            Body::PunctureRequest(_) => MessageKind::PunctureRequest,
            Body::Puncture(_) => MessageKind::Puncture,
            Body::Identity { .. } => MessageKind::Identity,
            Body::MissingIdentity { .. } => MessageKind::MissingIdentity,
            Body::IntroductionRequest(_) => MessageKind::IntroductionRequest,
            Body::IntroductionResponse(_) => MessageKind::IntroductionResponse,
            Body::DestroyCommunity { .. } => MessageKind::DestroyCommunity,
            Body::Authorize(_) => MessageKind::Authorize,
            Body::Revoke(_) => MessageKind::Revoke,
            Body::MissingMessage(_) => MessageKind::MissingMessage,
            Body::UndoOwn { .. } => MessageKind::UndoOwn,
            Body::UndoOther { .. } => MessageKind::UndoOther,
            Body::DynamicSettings(_) => MessageKind::DynamicSettings,
            Body::MissingLastMessage(_) => MessageKind::MissingLastMessage,
            Body::Collection(_) => MessageKind::Collection,
            Body::Application { tag, .. } => MessageKind::Application(*tag),
        }
    }
}

/// A decoded or to-be-encoded message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub header: Header,
    pub body: Body,
    pub signature: Vec<u8>,
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        self.body.kind()
    }

    pub fn global_time(&self) -> GlobalTime {
        self.header.global_time()
    }

    /// Signing member of a community-scoped message.
    pub fn member(&self) -> Option<MemberId> {
        match &self.header {
            Header::Community(header) => Some(header.member),
            Header::Session(_) => None,
        }
    }

    pub fn sequence(&self) -> Option<u32> {
        match &self.header {
            Header::Community(header) => header.sequence,
            Header::Session(_) => None,
        }
    }

    pub fn community_header(&self) -> Option<&CommunityHeader> {
        match &self.header {
            Header::Community(header) => Some(header),
            Header::Session(_) => None,
        }
    }
}

/// Result of a successful decode: the message plus the exact bytes it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub message: Message,
    pub packet: Vec<u8>,
    /// Length of the signed prefix; the signature occupies the rest of `packet`.
    pub signed_len: usize,
}

impl Decoded {
    /// Bytes covered by the signature.
    pub fn signed_prefix(&self) -> &[u8] {
        &self.packet[..self.signed_len]
    }

    pub fn signature(&self) -> &[u8] {
        &self.packet[self.signed_len..]
    }
}
