//! Codec errors.

use weft_core::{Disposition, MessageKind, ProtocolErrorCode, WeftError};

/// Malformed bytes. Never a panic: every decode path returns one of these instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("frame is empty")]
    Empty,

    #[error("first byte {0:#04x} is neither a protocol version nor a session message identifier")]
    UnknownFrame(u8),

    #[error("unsupported versions: protocol {protocol:#04x}, community {community:#04x}")]
    UnsupportedVersion { protocol: u8, community: u8 },

    #[error("frame addressed to another community")]
    WrongCommunity,

    #[error("message identifier {0:#04x} is not in the catalog")]
    UnknownKind(u8),

    #[error("{kind} cannot appear in a {frame} frame")]
    ScopeMismatch {
        kind: MessageKind,
        frame: &'static str,
    },

    #[error("frame is {actual} bytes but its header declares {declared}")]
    FrameLength { declared: usize, actual: usize },

    #[error("{field} needs {needed} bytes, {remaining} remain")]
    Truncated {
        field: &'static str,
        needed: usize,
        remaining: usize,
    },

    #[error("{kind} payload has {remaining} trailing bytes")]
    TrailingBytes { kind: MessageKind, remaining: usize },

    #[error("invalid {field}: {reason}")]
    InvalidField {
        field: &'static str,
        reason: String,
    },

    #[error("permission bits {0:#04x} are empty or undefined")]
    InvalidPermissions(u8),

    #[error("sync window inconsistent with option bits: {0}")]
    WindowMismatch(&'static str),

    #[error("collection element of {declared} bytes overruns the {remaining} remaining")]
    CollectionOverrun { declared: usize, remaining: usize },
}

impl DecodeError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        DecodeError::InvalidField {
            field,
            reason: reason.into(),
        }
    }

    /// Whether the remaining bytes of the enclosing frame are untrustworthy.
    pub fn severs_frame(&self) -> bool {
        matches!(
            self,
            DecodeError::FrameLength { .. } | DecodeError::CollectionOverrun { .. }
        )
    }
}

impl ProtocolErrorCode for DecodeError {
    fn code(&self) -> &'static str {
        match self {
            DecodeError::Empty => "decode_empty",
            DecodeError::UnknownFrame(_) => "decode_unknown_frame",
            DecodeError::UnsupportedVersion { .. } => "decode_unsupported_version",
            DecodeError::WrongCommunity => "decode_wrong_community",
            DecodeError::UnknownKind(_) => "decode_unknown_kind",
            DecodeError::ScopeMismatch { .. } => "decode_scope_mismatch",
            DecodeError::FrameLength { .. } => "decode_frame_length",
            DecodeError::Truncated { .. } => "decode_truncated",
            DecodeError::TrailingBytes { .. } => "decode_trailing_bytes",
            DecodeError::InvalidField { .. } => "decode_invalid_field",
            DecodeError::InvalidPermissions(_) => "decode_invalid_permissions",
            DecodeError::WindowMismatch(_) => "window_mismatch",
            DecodeError::CollectionOverrun { .. } => "decode_collection_overrun",
        }
    }

    fn disposition(&self) -> Disposition {
        if self.severs_frame() {
            Disposition::SeverFrame
        } else {
            Disposition::Drop
        }
    }
}

impl From<DecodeError> for WeftError {
    fn from(err: DecodeError) -> Self {
        if err.severs_frame() {
            WeftError::frame(err.to_string())
        } else {
            WeftError::decode(err.to_string())
        }
    }
}

/// A message that cannot be put on the wire.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    #[error("{field} is {len} bytes, limit is {max}")]
    TooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("signature is {actual} bytes, expected {expected}")]
    SignatureLength { expected: usize, actual: usize },

    #[error("{kind} needs a {expected} header")]
    HeaderMismatch {
        kind: MessageKind,
        expected: &'static str,
    },

    #[error("sequence number presence does not match the catalog for {0}")]
    SequenceMismatch(MessageKind),

    #[error("{kind} needs at least one {field}")]
    Empty {
        kind: MessageKind,
        field: &'static str,
    },

    #[error("sync window inconsistent with option bits")]
    WindowMismatch,

    #[error("application kind {0:#04x} is not in the catalog")]
    UnknownKind(u8),
}

impl ProtocolErrorCode for EncodeError {
    fn code(&self) -> &'static str {
        match self {
            EncodeError::TooLong { .. } => "encode_too_long",
            EncodeError::SignatureLength { .. } => "encode_signature_length",
            EncodeError::HeaderMismatch { .. } => "encode_header_mismatch",
            EncodeError::SequenceMismatch(_) => "encode_sequence_mismatch",
            EncodeError::Empty { .. } => "encode_empty",
            EncodeError::WindowMismatch => "encode_window_mismatch",
            EncodeError::UnknownKind(_) => "encode_unknown_kind",
        }
    }
}

impl From<EncodeError> for WeftError {
    fn from(err: EncodeError) -> Self {
        WeftError::encode(err.to_string())
    }
}
