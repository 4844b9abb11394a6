//! Signature exchange rejections.

use weft_core::{Disposition, GlobalTime, MessageKind, ProtocolErrorCode, WeftError};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CorrelationError {
    /// Response whose identifier matches no pending request, or a request that already timed out.
    #[error("no pending signature request {0}")]
    UnknownIdentifier(u16),

    #[error("every signature request identifier is in use")]
    IdentifiersExhausted,

    #[error("only community-scoped messages can be countersigned, got {0}")]
    SessionScoped(MessageKind),

    #[error("signature response {identifier} does not decode: {reason}")]
    Undecodable { identifier: u16, reason: String },

    #[error("signature response {identifier} changed kind {expected} to {actual}")]
    KindChanged {
        identifier: u16,
        expected: MessageKind,
        actual: MessageKind,
    },

    #[error("signature response {identifier} changed the first member")]
    MemberChanged { identifier: u16 },

    #[error("signature response {identifier} changed global time {expected} to {actual}")]
    GlobalTimeChanged {
        identifier: u16,
        expected: GlobalTime,
        actual: GlobalTime,
    },
}

impl ProtocolErrorCode for CorrelationError {
    fn code(&self) -> &'static str {
        match self {
            CorrelationError::UnknownIdentifier(_) => "correlation_unknown_identifier",
            CorrelationError::IdentifiersExhausted => "correlation_identifiers_exhausted",
            CorrelationError::SessionScoped(_) => "correlation_session_scoped",
            CorrelationError::Undecodable { .. } => "correlation_undecodable",
            CorrelationError::KindChanged { .. } => "correlation_kind_changed",
            CorrelationError::MemberChanged { .. } => "correlation_member_changed",
            CorrelationError::GlobalTimeChanged { .. } => "correlation_global_time_changed",
        }
    }

    fn disposition(&self) -> Disposition {
        match self {
            CorrelationError::UnknownIdentifier(_) => Disposition::Ignore,
            _ => Disposition::Drop,
        }
    }
}

impl From<CorrelationError> for WeftError {
    fn from(err: CorrelationError) -> Self {
        match err {
            CorrelationError::UnknownIdentifier(_) => WeftError::correlation(err.to_string()),
            _ => WeftError::invalid(err.to_string()),
        }
    }
}
