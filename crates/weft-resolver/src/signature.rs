//! Countersignature requests.
//!
//! The requester wraps a message it authored in a signature request under a fresh 2-byte
//! identifier. The peer hands the embedded message to its [`SignatureEndorser`], which may decline,
//! countersign, or countersign an amended version, and wraps the answer under the same identifier.
//! The requester accepts a proposal only if kind, first member and global time are unchanged.
//! Signing itself always happens outside this module.

use crate::error::CorrelationError;
use rand::Rng;
use weft_core::{
    CacheEntryState, GlobalTime, MemberId, MessageKind, RequestCache, ResolverConfig,
};
use weft_wire::{Codec, DecodeError, Decoded, SignatureExchange};

/// External signer consulted for incoming signature requests.
pub trait SignatureEndorser: Send + Sync {
    /// The countersigned, possibly amended packet for `message`, or `None` to decline.
    fn endorse(&self, message: &Decoded) -> Option<Vec<u8>>;
}

impl<T: SignatureEndorser + ?Sized> SignatureEndorser for std::sync::Arc<T> {
    fn endorse(&self, message: &Decoded) -> Option<Vec<u8>> {
        (**self).endorse(message)
    }
}

#[derive(Debug, Clone)]
struct PendingSignature {
    kind: MessageKind,
    member: MemberId,
    global_time: GlobalTime,
    signed_prefix: Vec<u8>,
}

/// A proposal returned for one of our requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureProposal {
    pub identifier: u16,
    pub proposed: Decoded,
    /// The signed bytes differ from the ones we sent.
    pub modified: bool,
}

/// Outstanding signature requests keyed by identifier.
#[derive(Debug, Clone)]
pub struct SignatureBroker {
    pending: RequestCache<u16, PendingSignature>,
}

impl SignatureBroker {
    pub fn new(config: &ResolverConfig) -> Self {
        Self {
            pending: RequestCache::new(config.request_timeout_ms, 0),
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Register `message` for countersigning and return the request payload.
    pub fn request<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        message: &Decoded,
        now_ms: u64,
    ) -> Result<SignatureExchange, CorrelationError> {
        let kind = message.message.kind();
        let member = message
            .message
            .member()
            .ok_or(CorrelationError::SessionScoped(kind))?;
        let pending = PendingSignature {
            kind,
            member,
            global_time: message.message.global_time(),
            signed_prefix: message.signed_prefix().to_vec(),
        };
        let identifier = self
            .pending
            .claim(rng, pending, now_ms)
            .ok_or(CorrelationError::IdentifiersExhausted)?;
        tracing::debug!(identifier, member = %member, kind = ?kind, "signature requested");
        Ok(SignatureExchange {
            identifier,
            blob: message.packet.clone(),
        })
    }

    /// Match a signature response to its request.
    ///
    /// A proposal that changes kind, first member or global time is rejected and the request stays
    /// pending; an accepted proposal closes the request.
    pub fn on_response(
        &mut self,
        codec: &Codec,
        response: &SignatureExchange,
        now_ms: u64,
    ) -> Result<SignatureProposal, CorrelationError> {
        let identifier = response.identifier;
        let pending = match self.pending.state(&identifier, now_ms) {
            Some(CacheEntryState::Pending) => self.pending.get(&identifier).cloned(),
            _ => None,
        }
        .ok_or(CorrelationError::UnknownIdentifier(identifier))?;

        let proposed =
            codec
                .decode(&response.blob)
                .map_err(|err| CorrelationError::Undecodable {
                    identifier,
                    reason: err.to_string(),
                })?;
        let message = &proposed.message;
        if message.kind() != pending.kind {
            return Err(CorrelationError::KindChanged {
                identifier,
                expected: pending.kind,
                actual: message.kind(),
            });
        }
        if message.member() != Some(pending.member) {
            return Err(CorrelationError::MemberChanged { identifier });
        }
        if message.global_time() != pending.global_time {
            return Err(CorrelationError::GlobalTimeChanged {
                identifier,
                expected: pending.global_time,
                actual: message.global_time(),
            });
        }

        let modified = proposed.signed_prefix() != pending.signed_prefix.as_slice();
        self.pending.remove(&identifier);
        Ok(SignatureProposal {
            identifier,
            proposed,
            modified,
        })
    }

    /// Drop requests past their deadline. Returns their identifiers.
    pub fn sweep(&mut self, now_ms: u64) -> Vec<u16> {
        self.pending
            .sweep(now_ms)
            .into_iter()
            .map(|(identifier, _)| identifier)
            .collect()
    }
}

/// Answer a signature request: consult `endorser` and wrap its packet under the request's
/// identifier. `Ok(None)` when the endorser declines.
pub fn answer_signature_request<E: SignatureEndorser + ?Sized>(
    codec: &Codec,
    request: &SignatureExchange,
    endorser: &E,
) -> Result<Option<SignatureExchange>, DecodeError> {
    let message = codec.decode(&request.blob)?;
    Ok(endorser
        .endorse(&message)
        .map(|blob| SignatureExchange {
            identifier: request.identifier,
            blob,
        }))
}
