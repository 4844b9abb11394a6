//! Community, member, and session identifiers.

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::fmt;

/// Per-member logical clock value assigned by a message's author.
pub type GlobalTime = u64;

/// Length of community and member identifiers on the wire.
pub const IDENTIFIER_LEN: usize = 20;

macro_rules! digest_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub [u8; IDENTIFIER_LEN]);

        impl $name {
            /// Wrap raw identifier bytes.
            pub const fn new(bytes: [u8; IDENTIFIER_LEN]) -> Self {
                Self(bytes)
            }

            /// Raw identifier bytes.
            pub fn as_bytes(&self) -> &[u8; IDENTIFIER_LEN] {
                &self.0
            }

            /// Deterministic identifier for tests and fixtures.
            pub fn from_seed(seed: u8) -> Self {
                Self([seed; IDENTIFIER_LEN])
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", hex::encode(&self.0[..4]))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), hex::encode(self.0))
            }
        }

        impl From<[u8; IDENTIFIER_LEN]> for $name {
            fn from(bytes: [u8; IDENTIFIER_LEN]) -> Self {
                Self(bytes)
            }
        }
    };
}

digest_identifier!(
    /// Identifier of a permissioned overlay.
    CommunityId
);

digest_identifier!(
    /// Identifier of a member, the SHA-1 digest of its public key.
    MemberId
);

/// Serialized public key of a member. The encoding is owned by the crypto collaborator.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PublicKey(pub Vec<u8>);

impl PublicKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Member identifier derived from this key.
    pub fn member_id(&self) -> MemberId {
        let digest = Sha1::digest(&self.0);
        let mut bytes = [0u8; IDENTIFIER_LEN];
        bytes.copy_from_slice(&digest);
        MemberId(bytes)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.member_id())
    }
}

/// Session identifier carried by session-scoped messages instead of the community header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u32);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{:08x}", self.0)
    }
}

/// Store key of an accepted message within a community: `(member, global time)` is unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageRef {
    pub member: MemberId,
    pub global_time: GlobalTime,
}

impl MessageRef {
    pub fn new(member: MemberId, global_time: GlobalTime) -> Self {
        Self {
            member,
            global_time,
        }
    }
}

impl fmt::Display for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.member, self.global_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_id_is_sha1_of_key() {
        let key = PublicKey::new(b"member key".to_vec());
        let expected = Sha1::digest(b"member key");
        assert_eq!(key.member_id().as_bytes()[..], expected[..]);
    }

    #[test]
    fn test_member_id_differs_per_key() {
        let a = PublicKey::new(vec![1, 2, 3]).member_id();
        let b = PublicKey::new(vec![1, 2, 4]).member_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_display_is_short_hex() {
        let id = CommunityId::from_seed(0xab);
        assert_eq!(id.to_string(), "abababab");
    }

    #[test]
    fn test_message_ref_ordering() {
        let member = MemberId::from_seed(1);
        assert!(MessageRef::new(member, 1) < MessageRef::new(member, 2));
    }
}
