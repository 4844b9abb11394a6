//! Message kinds and their one-byte wire tags.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Highest tag available to community-defined application kinds.
pub const APPLICATION_TAG_MAX: u8 = 0xDF;

/// Header family of a message kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    /// Protocol version, community version, community id, member id.
    Community,
    /// Four-byte session identifier.
    Session,
}

/// Closed set of message kinds.
///
/// Built-in kinds occupy `0xE0..=0xFE`; `Application` covers the community catalog range
/// `0x00..=0xDF`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MessageKind {
    MissingSequence,
    MissingProof,
    SignatureRequest,
    SignatureResponse,
    PunctureRequest,
    Puncture,
    Identity,
    MissingIdentity,
    IntroductionRequest,
    IntroductionResponse,
    DestroyCommunity,
    Authorize,
    Revoke,
    MissingMessage,
    UndoOwn,
    UndoOther,
    DynamicSettings,
    MissingLastMessage,
    Collection,
    Application(u8),
}

impl MessageKind {
    /// Every built-in kind, in tag order.
    pub const BUILTIN: [MessageKind; 19] = [
        MessageKind::MissingSequence,
        MessageKind::MissingProof,
        MessageKind::SignatureRequest,
        MessageKind::SignatureResponse,
        MessageKind::PunctureRequest,
        MessageKind::Puncture,
        MessageKind::Identity,
        MessageKind::MissingIdentity,
        MessageKind::IntroductionRequest,
        MessageKind::IntroductionResponse,
        MessageKind::DestroyCommunity,
        MessageKind::Authorize,
        MessageKind::Revoke,
        MessageKind::MissingMessage,
        MessageKind::UndoOwn,
        MessageKind::UndoOther,
        MessageKind::DynamicSettings,
        MessageKind::MissingLastMessage,
        MessageKind::Collection,
    ];

    /// Wire tag of this kind.
    pub fn tag(self) -> u8 {
        match self {
            MessageKind::MissingSequence => 0xFE,
            MessageKind::MissingProof => 0xFD,
            MessageKind::SignatureRequest => 0xFC,
            MessageKind::SignatureResponse => 0xFB,
            MessageKind::PunctureRequest => 0xFA,
            MessageKind::Puncture => 0xF9,
            MessageKind::Identity => 0xF8,
            MessageKind::MissingIdentity => 0xF7,
            MessageKind::IntroductionRequest => 0xF6,
            MessageKind::IntroductionResponse => 0xF5,
            MessageKind::DestroyCommunity => 0xF4,
            MessageKind::Authorize => 0xF3,
            MessageKind::Revoke => 0xF2,
            MessageKind::MissingMessage => 0xEF,
            MessageKind::UndoOwn => 0xEE,
            MessageKind::UndoOther => 0xED,
            MessageKind::DynamicSettings => 0xEC,
            MessageKind::MissingLastMessage => 0xEB,
            MessageKind::Collection => 0xE0,
            MessageKind::Application(tag) => tag,
        }
    }

    /// Kind for a wire tag, `None` for reserved tags.
    pub fn from_tag(tag: u8) -> Option<Self> {
        if tag <= APPLICATION_TAG_MAX {
            return Some(MessageKind::Application(tag));
        }
        MessageKind::BUILTIN.into_iter().find(|kind| kind.tag() == tag)
    }

    /// Header family used on the wire.
    pub fn scope(self) -> Scope {
        match self {
            MessageKind::Identity
            | MessageKind::MissingIdentity
            | MessageKind::MissingSequence
            | MessageKind::MissingMessage
            | MessageKind::MissingLastMessage
            | MessageKind::MissingProof
            | MessageKind::SignatureRequest
            | MessageKind::SignatureResponse
            | MessageKind::Collection => Scope::Session,
            _ => Scope::Community,
        }
    }

    /// Whether a built-in kind carries a sequence number.
    ///
    /// Application kinds answer `false` here; the catalog decides for them.
    pub fn is_sequenced_builtin(self) -> bool {
        matches!(
            self,
            MessageKind::Authorize
                | MessageKind::Revoke
                | MessageKind::UndoOwn
                | MessageKind::UndoOther
                | MessageKind::DynamicSettings
        )
    }

    pub fn is_application(self) -> bool {
        matches!(self, MessageKind::Application(_))
    }

    /// Kinds that are kept in the message store and gossiped.
    pub fn is_stored(self) -> bool {
        matches!(
            self,
            MessageKind::Authorize
                | MessageKind::Revoke
                | MessageKind::UndoOwn
                | MessageKind::UndoOther
                | MessageKind::DynamicSettings
                | MessageKind::DestroyCommunity
                | MessageKind::Identity
                | MessageKind::Application(_)
        )
    }

    /// Protocol name of the kind.
    pub fn name(self) -> &'static str {
        match self {
            MessageKind::MissingSequence => "missing-sequence",
            MessageKind::MissingProof => "missing-proof",
            MessageKind::SignatureRequest => "signature-request",
            MessageKind::SignatureResponse => "signature-response",
            MessageKind::PunctureRequest => "puncture-request",
            MessageKind::Puncture => "puncture",
            MessageKind::Identity => "identity",
            MessageKind::MissingIdentity => "missing-identity",
            MessageKind::IntroductionRequest => "introduction-request",
            MessageKind::IntroductionResponse => "introduction-response",
            MessageKind::DestroyCommunity => "destroy-community",
            MessageKind::Authorize => "authorize",
            MessageKind::Revoke => "revoke",
            MessageKind::MissingMessage => "missing-message",
            MessageKind::UndoOwn => "undo-own",
            MessageKind::UndoOther => "undo-other",
            MessageKind::DynamicSettings => "dynamic-settings",
            MessageKind::MissingLastMessage => "missing-last-message",
            MessageKind::Collection => "collection",
            MessageKind::Application(_) => "application",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Application(tag) => write!(f, "application-{tag:#04x}"),
            other => f.write_str(other.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_round_trip() {
        for kind in MessageKind::BUILTIN {
            assert_eq!(MessageKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(
            MessageKind::from_tag(0x42),
            Some(MessageKind::Application(0x42))
        );
    }

    #[test]
    fn test_builtin_tags_in_reserved_range() {
        for kind in MessageKind::BUILTIN {
            assert!((0xE0..=0xFE).contains(&kind.tag()), "{kind} out of range");
        }
    }

    #[test]
    fn test_reserved_tags_are_unknown() {
        assert_eq!(MessageKind::from_tag(0xE1), None);
        assert_eq!(MessageKind::from_tag(0xFF), None);
    }

    #[test]
    fn test_builtin_tags_unique() {
        let tags: std::collections::HashSet<u8> =
            MessageKind::BUILTIN.iter().map(|k| k.tag()).collect();
        assert_eq!(tags.len(), MessageKind::BUILTIN.len());
    }
}
