//! Deterministic signing for tests.
//!
//! Signatures are `SHA-256(key || data)` stretched or cut to the configured length. Anyone holding
//! the public key can forge them, which is exactly what a test harness wants.

use sha2::{Digest, Sha256};
use std::collections::HashSet;
use weft_core::{CryptoEffects, CryptoError, PublicKey};

#[derive(Debug, Clone)]
pub struct DeterministicCrypto {
    signature_length: usize,
    /// `None` signs for any key.
    keys: Option<HashSet<PublicKey>>,
}

impl DeterministicCrypto {
    pub fn new(signature_length: usize) -> Self {
        Self {
            signature_length,
            keys: None,
        }
    }

    /// Only sign for the listed keys; others fail with `MissingKey`.
    pub fn restricted(signature_length: usize, keys: impl IntoIterator<Item = PublicKey>) -> Self {
        Self {
            signature_length,
            keys: Some(keys.into_iter().collect()),
        }
    }

    fn digest(&self, data: &[u8], key: &PublicKey) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.signature_length);
        let mut round: u32 = 0;
        while out.len() < self.signature_length {
            let mut hasher = Sha256::new();
            hasher.update(round.to_be_bytes());
            hasher.update(key.as_bytes());
            hasher.update(data);
            out.extend_from_slice(&hasher.finalize());
            round += 1;
        }
        out.truncate(self.signature_length);
        out
    }
}

impl CryptoEffects for DeterministicCrypto {
    fn sign(&self, data: &[u8], key: &PublicKey) -> Result<Vec<u8>, CryptoError> {
        if let Some(keys) = &self.keys {
            if !keys.contains(key) {
                return Err(CryptoError::MissingKey(key.clone()));
            }
        }
        Ok(self.digest(data, key))
    }

    fn verify(&self, data: &[u8], signature: &[u8], key: &PublicKey) -> bool {
        signature == self.digest(data, key).as_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify() {
        let crypto = DeterministicCrypto::new(70);
        let key = PublicKey::new(vec![1, 2, 3]);
        let signature = crypto.sign(b"hello", &key).unwrap();
        assert_eq!(signature.len(), 70);
        assert!(crypto.verify(b"hello", &signature, &key));
        assert!(!crypto.verify(b"hellp", &signature, &key));
        assert!(!crypto.verify(b"hello", &signature, &PublicKey::new(vec![9])));
    }

    #[test]
    fn test_restricted_refuses_unknown_key() {
        let crypto = DeterministicCrypto::restricted(16, [PublicKey::new(vec![1])]);
        assert!(crypto.sign(b"x", &PublicKey::new(vec![1])).is_ok());
        assert!(matches!(
            crypto.sign(b"x", &PublicKey::new(vec![2])),
            Err(CryptoError::MissingKey(_))
        ));
    }
}
