//! Walker rejections.

use weft_core::{Disposition, ProtocolErrorCode, WeftError};
use weft_wire::Address;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalkerError {
    /// Response or puncture whose identifier matches no live exchange.
    #[error("no outstanding exchange with identifier {0}")]
    UnknownIdentifier(u16),

    /// Our own introduction request came back to us.
    #[error("introduction request {0} is our own")]
    SelfWalk(u16),

    /// The sender's LAN or WAN address could not be estimated.
    #[error("cannot estimate addresses of {0}")]
    UnresolvedSource(Address),

    #[error("invalid walker address {address}: {reason}")]
    InvalidWalkerAddress {
        address: Address,
        reason: &'static str,
    },

    #[error("every request identifier is in use")]
    IdentifiersExhausted,
}

impl ProtocolErrorCode for WalkerError {
    fn code(&self) -> &'static str {
        match self {
            WalkerError::UnknownIdentifier(_) => "walker_unknown_identifier",
            WalkerError::SelfWalk(_) => "walker_self_walk",
            WalkerError::UnresolvedSource(_) => "walker_unresolved_source",
            WalkerError::InvalidWalkerAddress { .. } => "walker_invalid_address",
            WalkerError::IdentifiersExhausted => "walker_identifiers_exhausted",
        }
    }

    fn disposition(&self) -> Disposition {
        match self {
            WalkerError::UnknownIdentifier(_) => Disposition::Ignore,
            _ => Disposition::Drop,
        }
    }
}

impl From<WalkerError> for WeftError {
    fn from(err: WalkerError) -> Self {
        match err {
            WalkerError::UnknownIdentifier(_) => WeftError::correlation(err.to_string()),
            _ => WeftError::walker(err.to_string()),
        }
    }
}
