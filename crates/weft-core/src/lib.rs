//! # Weft Core - Layer 1: Foundation Types
//!
//! Shared vocabulary for every Weft crate:
//! - Identifiers (`CommunityId`, `MemberId`, `SessionId`, `PublicKey`, `MessageRef`)
//! - The closed set of message kinds and their wire tags
//! - Permission bits and the per-community message catalog
//! - Unified error type and the `Disposition` each error maps to
//! - Configuration loaded from TOML
//! - Collaborator contracts for signing and verification
//! - A generic request cache with deadlines, and the community global-time clock
//!
//! ## Design Principles
//!
//! - **Closed dispatch**: every message kind is a variant; tags are mapped in one place
//! - **No I/O**: nothing in this crate touches a socket, disk, or wall clock
//! - **Explicit time**: callers pass `now_ms`; deadlines are compared, never awaited

#![forbid(unsafe_code)]

pub mod catalog;
pub mod clock;
pub mod config;
pub mod effects;
pub mod errors;
pub mod identifiers;
pub mod kind;
pub mod permission;
pub mod request_cache;

pub use catalog::{MessageCatalog, MessageMeta, PolicyType, ResolutionPolicy, SyncDirection};
pub use clock::GlobalClock;
pub use config::{
    ResolverConfig, SyncConfig, TimelineConfig, WalkerConfig, WeftConfig, WireConfig,
};
pub use effects::{CryptoEffects, CryptoError};
pub use errors::{Disposition, ProtocolErrorCode, Result, WeftError};
pub use identifiers::{CommunityId, GlobalTime, MemberId, MessageRef, PublicKey, SessionId};
pub use kind::{MessageKind, Scope};
pub use permission::{Permission, PermissionSet};
pub use request_cache::{CacheEntryState, RequestCache};
