//! # Weft Anti-Entropy - Layer 3: Bloom Filter Synchronization
//!
//! Range synchronization piggybacked on introduction requests.
//!
//! - `SyncMatcher::candidates`: responder side, what to send for a peer's window
//! - `SyncMatcher::claim_window`: requester side, which window and filter to ask with
//!
//! ## Design Principles
//!
//! - **Pull-based**: the requester drives sync; nothing is pushed unsolicited
//! - **Deterministic**: identical store contents and window give the identical ordered answer
//! - **Bounded**: responses stop at the byte budget; bloom false positives only suppress re-sends

#![forbid(unsafe_code)]

pub mod claim;
pub mod matcher;

pub use matcher::{Candidates, SyncMatcher};
