//! Unified error system for Weft
//!
//! Each engine crate carries its own `thiserror` enum; all of them convert into [`WeftError`]
//! and report a stable code plus the [`Disposition`] the message layer applies.

use serde::{Deserialize, Serialize};

/// What the message layer does with an input after an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Disposition {
    /// Discard the message.
    Drop,
    /// Discard silently; the input is a harmless repeat or stale correlation.
    Ignore,
    /// Hold the message and ask the sender for the missing authorization proof.
    RequestProof,
    /// Hold the message and ask the sender for the missing sequence range.
    RequestSequence,
    /// Hold the message and ask the sender for the signer's identity.
    RequestIdentity,
    /// Hold the message and ask the sender for a referenced message.
    RequestMessage,
    /// Abandon the remaining bytes of the frame.
    SeverFrame,
}

/// Stable error codes for logging and peer-facing diagnostics.
pub trait ProtocolErrorCode {
    /// Snake-case code that never changes between releases.
    fn code(&self) -> &'static str;

    /// Handling applied to the offending input.
    fn disposition(&self) -> Disposition {
        Disposition::Drop
    }
}

/// Unified error type for all Weft operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum WeftError {
    /// Malformed bytes from a peer
    #[error("Decode error: {message}")]
    Decode {
        /// Error message describing the malformed input
        message: String,
        /// Whether the enclosing frame can no longer be trusted
        severs_frame: bool,
    },

    /// A message could not be serialized
    #[error("Encode error: {message}")]
    Encode {
        /// Error message describing the encoding failure
        message: String,
    },

    /// Signer lacks a permission or its chain is unresolved
    #[error("Authorization error: {message}")]
    Authorization {
        /// Error message describing the missing permission
        message: String,
    },

    /// Sequence gap or duplicate
    #[error("Sequence error: {message}")]
    Sequence {
        /// Error message describing the sequence violation
        message: String,
        /// Whether the message repeats one already accepted
        duplicate: bool,
    },

    /// Rejected undo
    #[error("Undo violation: {message}")]
    Undo {
        /// Error message describing the rejected undo
        message: String,
    },

    /// Response without a pending request
    #[error("Correlation error: {message}")]
    Correlation {
        /// Error message describing the unmatched response
        message: String,
    },

    /// Walker handshake failure
    #[error("Walker error: {message}")]
    Walker {
        /// Error message describing the walker failure
        message: String,
    },

    /// Signing or verification failure
    #[error("Crypto error: {message}")]
    Crypto {
        /// Error message describing the cryptographic failure
        message: String,
    },

    /// Message store failure
    #[error("Storage error: {message}")]
    Storage {
        /// Error message describing the storage failure
        message: String,
    },

    /// Invalid input or configuration
    #[error("Invalid: {message}")]
    Invalid {
        /// Error message describing the invalid input
        message: String,
    },
}

impl WeftError {
    /// Create a decode error that only drops the message
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
            severs_frame: false,
        }
    }

    /// Create a decode error that abandons the rest of the frame
    pub fn frame(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
            severs_frame: true,
        }
    }

    /// Create an encode error
    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode {
            message: message.into(),
        }
    }

    /// Create an authorization error
    pub fn authorization(message: impl Into<String>) -> Self {
        Self::Authorization {
            message: message.into(),
        }
    }

    /// Create a sequence gap error
    pub fn sequence_gap(message: impl Into<String>) -> Self {
        Self::Sequence {
            message: message.into(),
            duplicate: false,
        }
    }

    /// Create a duplicate sequence error
    pub fn sequence_duplicate(message: impl Into<String>) -> Self {
        Self::Sequence {
            message: message.into(),
            duplicate: true,
        }
    }

    /// Create an undo violation
    pub fn undo(message: impl Into<String>) -> Self {
        Self::Undo {
            message: message.into(),
        }
    }

    /// Create a correlation error
    pub fn correlation(message: impl Into<String>) -> Self {
        Self::Correlation {
            message: message.into(),
        }
    }

    /// Create a walker error
    pub fn walker(message: impl Into<String>) -> Self {
        Self::Walker {
            message: message.into(),
        }
    }

    /// Create a crypto error
    pub fn crypto(message: impl Into<String>) -> Self {
        Self::Crypto {
            message: message.into(),
        }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create an invalid input error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

impl ProtocolErrorCode for WeftError {
    fn code(&self) -> &'static str {
        match self {
            WeftError::Decode { .. } => "decode",
            WeftError::Encode { .. } => "encode",
            WeftError::Authorization { .. } => "authorization",
            WeftError::Sequence { .. } => "sequence",
            WeftError::Undo { .. } => "undo",
            WeftError::Correlation { .. } => "correlation",
            WeftError::Walker { .. } => "walker",
            WeftError::Crypto { .. } => "crypto",
            WeftError::Storage { .. } => "storage",
            WeftError::Invalid { .. } => "invalid",
        }
    }

    fn disposition(&self) -> Disposition {
        match self {
            WeftError::Decode {
                severs_frame: true, ..
            } => Disposition::SeverFrame,
            WeftError::Authorization { .. } => Disposition::RequestProof,
            WeftError::Sequence {
                duplicate: true, ..
            } => Disposition::Ignore,
            WeftError::Sequence { .. } => Disposition::RequestSequence,
            WeftError::Correlation { .. } => Disposition::Ignore,
            _ => Disposition::Drop,
        }
    }
}

/// Standard Result type for Weft operations
pub type Result<T> = std::result::Result<T, WeftError>;

impl From<toml::de::Error> for WeftError {
    fn from(err: toml::de::Error) -> Self {
        Self::invalid(format!("config: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = WeftError::invalid("test message");
        assert!(matches!(err, WeftError::Invalid { .. }));
        assert_eq!(err.to_string(), "Invalid: test message");
    }

    #[test]
    fn test_frame_errors_sever() {
        assert_eq!(
            WeftError::frame("length mismatch").disposition(),
            Disposition::SeverFrame
        );
        assert_eq!(WeftError::decode("bad tag").disposition(), Disposition::Drop);
    }

    #[test]
    fn test_sequence_dispositions() {
        assert_eq!(
            WeftError::sequence_duplicate("seq 3").disposition(),
            Disposition::Ignore
        );
        assert_eq!(
            WeftError::sequence_gap("seq 5").disposition(),
            Disposition::RequestSequence
        );
    }

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(WeftError::authorization("x").code(), "authorization");
        assert_eq!(WeftError::correlation("x").code(), "correlation");
    }
}
