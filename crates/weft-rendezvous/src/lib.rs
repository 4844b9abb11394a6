//! # Weft Rendezvous - Layer 3: Peer Discovery
//!
//! The semi-random walker. Each step sends an introduction request to a known candidate; the
//! receiver answers and introduces a third peer, whom it also asks to puncture towards the walker
//! so that both NATs carry a mapping before the walker's next step.
//!
//! - `Walker`: outgoing exchanges and the handlers for the four walker messages
//! - `CandidateTable`: known peers with walk, stumble and introduction timestamps
//! - `LocalAddresses`: our LAN/WAN addresses, peer address estimation, NAT classification
//!
//! ## Design Principles
//!
//! - **Sans-I/O**: handlers take decoded payloads and return payloads to send with their targets
//! - **Explicit time**: every deadline is checked against a caller-supplied `now_ms`
//! - **Injected randomness**: the walker owns an `RngCore` so tests can seed it

#![forbid(unsafe_code)]

pub mod address;
pub mod candidates;
pub mod error;
pub mod walker;

pub use address::{is_valid_address, LocalAddresses};
pub use candidates::{Candidate, CandidateTable};
pub use error::WalkerError;
pub use walker::{ExchangeState, IntroductionReply, Walker, WalkerStats};
