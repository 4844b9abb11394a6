//! Permission bits carried by authorize and revoke messages.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single permission bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Permission {
    /// May author messages of the kind.
    Permit,
    /// May grant bits on the kind to others.
    Authorize,
    /// May revoke bits on the kind from others.
    Revoke,
    /// May undo other members' messages of the kind.
    Undo,
}

impl Permission {
    pub const ALL: [Permission; 4] = [
        Permission::Permit,
        Permission::Authorize,
        Permission::Revoke,
        Permission::Undo,
    ];

    /// Mask of this bit within a [`PermissionSet`].
    pub fn bit(self) -> u8 {
        match self {
            Permission::Permit => 0b0001,
            Permission::Authorize => 0b0010,
            Permission::Revoke => 0b0100,
            Permission::Undo => 0b1000,
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Permission::Permit => "permit",
            Permission::Authorize => "authorize",
            Permission::Revoke => "revoke",
            Permission::Undo => "undo",
        };
        f.write_str(name)
    }
}

/// Bitmask of permissions: bit0 permit, bit1 authorize, bit2 revoke, bit3 undo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PermissionSet(u8);

impl PermissionSet {
    /// Mask covering every defined bit.
    pub const VALID_MASK: u8 = 0b1111;

    pub const fn empty() -> Self {
        Self(0)
    }

    /// Parse a wire byte; `None` when undefined bits are set.
    pub fn from_bits(bits: u8) -> Option<Self> {
        if bits & !Self::VALID_MASK != 0 {
            return None;
        }
        Some(Self(bits))
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn with(mut self, permission: Permission) -> Self {
        self.0 |= permission.bit();
        self
    }

    pub fn contains(self, permission: Permission) -> bool {
        self.0 & permission.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Individual bits set in this mask, lowest first.
    pub fn iter(self) -> impl Iterator<Item = Permission> {
        Permission::ALL
            .into_iter()
            .filter(move |permission| self.contains(*permission))
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        iter.into_iter()
            .fold(PermissionSet::empty(), PermissionSet::with)
    }
}
