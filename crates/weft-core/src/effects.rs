//! Collaborator contracts for signing and verification.
//!
//! Algorithm choice belongs to the implementor. The message layer only hands over the signed
//! prefix of a packet and the key that must have produced it.

use crate::identifiers::PublicKey;

/// Failure reported by a [`CryptoEffects`] implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    #[error("no private key available for {0:?}")]
    MissingKey(PublicKey),
    #[error("signing failed: {0}")]
    Signing(String),
}

impl crate::ProtocolErrorCode for CryptoError {
    fn code(&self) -> &'static str {
        match self {
            CryptoError::MissingKey(_) => "crypto_missing_key",
            CryptoError::Signing(_) => "crypto_signing",
        }
    }
}

impl From<CryptoError> for crate::WeftError {
    fn from(err: CryptoError) -> Self {
        crate::WeftError::crypto(err.to_string())
    }
}

/// Signing and verification.
pub trait CryptoEffects: Send + Sync {
    /// Sign `data` with the private key matching `key`.
    fn sign(&self, data: &[u8], key: &PublicKey) -> Result<Vec<u8>, CryptoError>;

    /// Check `signature` over `data` against `key`.
    fn verify(&self, data: &[u8], signature: &[u8], key: &PublicKey) -> bool;
}

impl<T: CryptoEffects + ?Sized> CryptoEffects for std::sync::Arc<T> {
    fn sign(&self, data: &[u8], key: &PublicKey) -> Result<Vec<u8>, CryptoError> {
        (**self).sign(data, key)
    }

    fn verify(&self, data: &[u8], signature: &[u8], key: &PublicKey) -> bool {
        (**self).verify(data, signature, key)
    }
}
