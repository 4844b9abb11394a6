//! # Weft Resolver - Layer 3: Missing-Data Resolution
//!
//! Peers that cannot accept a message ask for what is missing: identities, sequence ranges,
//! specific messages, the latest messages of a kind, or the proof that a signer was authorized.
//!
//! - `Resolver`: responder side, one function per missing-* request
//! - `MissingRequestTracker`: requester side, suppresses duplicate and overlapping requests
//! - `SignatureBroker`: countersignature requests correlated by a 2-byte identifier
//!
//! ## Design Principles
//!
//! - **Read-only responders**: answers come straight from the store and the timeline
//! - **Bounded answers**: sequence responses honour both the requester's and our own byte limit
//! - **Signing stays outside**: the broker correlates and validates, an endorser signs

#![forbid(unsafe_code)]

pub mod error;
pub mod responders;
pub mod signature;
pub mod tracker;

pub use error::CorrelationError;
pub use responders::Resolver;
pub use signature::{
    answer_signature_request, SignatureBroker, SignatureEndorser, SignatureProposal,
};
pub use tracker::{MissingKey, MissingRequestTracker};
