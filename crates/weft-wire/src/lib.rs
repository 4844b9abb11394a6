//! # Weft Wire - Layer 2: Message Model and Codec
//!
//! Typed records for every message kind and the binary codec that maps them to and from packets.
//!
//! ## Design Principles
//!
//! - **Closed dispatch**: one `Body` variant per kind, matched exhaustively at the codec boundary
//! - **Adversarial input**: every length is checked against the remaining buffer; decode never panics
//! - **Signed prefix**: decode exposes the exact bytes the signature covers
//! - **Deterministic headers**: protocol and community versions are constants, not fields

#![forbid(unsafe_code)]

pub mod address;
pub mod codec;
mod cursor;
pub mod error;
pub mod message;
pub mod store;
pub mod window;

pub use address::{Address, ConnectionType, OptionBits, ADDRESS_LEN};
pub use codec::{Codec, COMMUNITY_VERSION, PROTOCOL_VERSION};
pub use error::{DecodeError, EncodeError};
pub use message::{
    Body, CommunityHeader, Decoded, DestroyDegree, Header, IntroductionRequest,
    IntroductionResponse, Message, MissingLastMessage, MissingMessage, MissingSequence,
    PermissionGrant, PolicySetting, Puncture, PunctureRequest, SessionHeader, SignatureExchange,
};
pub use store::{MessageStore, StoreError, StoredMessage};
pub use window::{BloomBuilder, BloomFilter, BloomProbe, SyncWindow};
