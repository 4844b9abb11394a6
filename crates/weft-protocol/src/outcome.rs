//! What one call into the message layer produced.

use weft_core::{Disposition, MemberId, MessageKind, MessageRef, ProtocolErrorCode, WeftError};
use weft_resolver::SignatureProposal;
use weft_wire::Address;

/// A packet to put on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub destination: Address,
    pub packet: Vec<u8>,
}

/// Fate of one decoded message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Accepted and persisted.
    Stored {
        kind: MessageKind,
        reference: MessageRef,
    },
    /// Acted on without being persisted: walker traffic, requests, responses, collections.
    Handled { kind: MessageKind },
    /// Retained until the data it depends on arrives or the request times out.
    Held {
        kind: MessageKind,
        code: &'static str,
    },
    /// Discarded. `kind` is `None` when the packet did not decode.
    Rejected {
        kind: Option<MessageKind>,
        code: &'static str,
        disposition: Disposition,
    },
}

impl Outcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, Outcome::Stored { .. })
    }

    pub fn is_held(&self) -> bool {
        matches!(self, Outcome::Held { .. })
    }
}

/// Everything produced while handling one incoming packet.
#[derive(Debug, Default)]
pub struct Dispatch {
    pub outbound: Vec<Outbound>,
    /// One entry per decoded message, collection elements included, in processing order.
    pub outcomes: Vec<Outcome>,
    /// Countersignature proposals matched to our requests.
    pub proposals: Vec<SignatureProposal>,
}

impl Dispatch {
    pub fn stored(&self) -> impl Iterator<Item = &MessageRef> {
        self.outcomes.iter().filter_map(|outcome| match outcome {
            Outcome::Stored { reference, .. } => Some(reference),
            _ => None,
        })
    }

    /// Packets addressed to `destination`.
    pub fn sent_to(&self, destination: Address) -> impl Iterator<Item = &[u8]> {
        self.outbound
            .iter()
            .filter(move |outbound| outbound.destination == destination)
            .map(|outbound| outbound.packet.as_slice())
    }

    pub(crate) fn send(&mut self, destination: Address, packet: Vec<u8>) {
        self.outbound.push(Outbound {
            destination,
            packet,
        });
    }
}

/// Follow-up request implied by a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FollowUp {
    Identity(MemberId),
    Proof(MessageRef),
    Sequence {
        member: MemberId,
        kind: MessageKind,
        low: u32,
        high: u32,
    },
    Message(MessageRef),
}

/// A typed engine error flattened for logging and the caller, plus what to ask for next.
#[derive(Debug, Clone)]
pub(crate) struct Rejection {
    pub code: &'static str,
    pub disposition: Disposition,
    pub error: WeftError,
    pub follow_up: Option<FollowUp>,
}

impl Rejection {
    pub fn new<E>(err: E) -> Self
    where
        E: ProtocolErrorCode + Into<WeftError>,
    {
        Self {
            code: err.code(),
            disposition: err.disposition(),
            error: err.into(),
            follow_up: None,
        }
    }

    pub fn with_follow_up(mut self, follow_up: Option<FollowUp>) -> Self {
        self.follow_up = follow_up;
        self
    }
}
