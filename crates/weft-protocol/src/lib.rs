//! # Weft Protocol - Layer 4: Community Message Layer
//!
//! Binds the codec, permission timeline, undo ledger, sync matcher, walker and resolvers of one
//! community into a single packet dispatcher.
//!
//! - `MessageLayer`: decode, verify, accept or hold, persist, answer
//! - `SharedMessageLayer`: the same layer behind an async read/write lock for multi-task hosts
//! - `Dispatch`: outbound packets and per-message outcomes of one call
//!
//! ## Design Principles
//!
//! - **Sans-I/O**: packets in, packets out; transport and timers belong to the host
//! - **Per-message isolation**: one bad element of a collection never affects its siblings
//! - **Self-healing**: rejections naming missing data trigger the matching missing-* request and
//!   hold the message until the data arrives
//! - **Bounded waiting**: held packets are capped per sender and in total

#![forbid(unsafe_code)]

pub mod error;
mod held;
pub mod layer;
pub mod outcome;
pub mod shared;

pub use error::DispatchError;
pub use layer::{CommunitySetup, MessageLayer, SweepReport};
pub use outcome::{Dispatch, Outbound, Outcome};
pub use shared::SharedMessageLayer;
