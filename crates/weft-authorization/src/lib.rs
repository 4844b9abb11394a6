//! # Weft Authorization - Layer 3: Permission & Undo Engines
//!
//! Decides whether an authored message is acceptable given the community's permission history.
//!
//! - `Timeline`: authorize/revoke records, dynamic settings, destroy-community, sequence floors
//! - `UndoLedger`: undo-own and undo-other records against target messages
//!
//! ## Design Principles
//!
//! - **Append-only records**: grants and undos are never rewritten; the active bit-set is derived
//!   on read from the records in force at a given global time
//! - **No partial effects**: a rejected message leaves every floor and record untouched
//! - **Sequence first**: ordering is checked before content so redelivery is idempotent

#![forbid(unsafe_code)]

pub mod errors;
pub mod timeline;
pub mod undo;

pub use errors::{AcceptanceError, AuthorizationError, SequenceError, UndoViolation};
pub use timeline::{Authorship, GrantTarget, Timeline};
pub use undo::{UndoLedger, UndoRecord, UndoTarget};
