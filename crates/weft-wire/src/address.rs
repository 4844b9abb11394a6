//! Socket addresses and option bits carried by walker messages.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};

/// Encoded size of an [`Address`].
pub const ADDRESS_LEN: usize = 6;

/// IPv4 address and port, six bytes on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(pub SocketAddrV4);

impl Address {
    /// `0.0.0.0:0`, used when no address is known.
    pub const NULL: Address = Address(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0));

    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self(SocketAddrV4::new(ip, port))
    }

    pub fn ip(&self) -> Ipv4Addr {
        *self.0.ip()
    }

    pub fn port(&self) -> u16 {
        self.0.port()
    }

    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }

    pub fn to_bytes(&self) -> [u8; ADDRESS_LEN] {
        let [a, b, c, d] = self.ip().octets();
        let [p0, p1] = self.port().to_be_bytes();
        [a, b, c, d, p0, p1]
    }

    pub fn from_bytes(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self::new(
            Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]),
            u16::from_be_bytes([bytes[4], bytes[5]]),
        )
    }
}

impl From<SocketAddrV4> for Address {
    fn from(addr: SocketAddrV4) -> Self {
        Self(addr)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.0)
    }
}

/// NAT classification advertised in the option bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ConnectionType {
    #[default]
    Unknown,
    Public,
    SymmetricNat,
}

/// Option byte of introduction requests and responses.
///
/// The raw byte is kept as received so that unknown bits survive an echo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct OptionBits(pub u8);

impl OptionBits {
    pub const ADVICE: u8 = 0b0000_0001;
    pub const SYNC: u8 = 0b0000_0010;
    pub const CONNECTION_MASK: u8 = 0b0000_1100;
    pub const TUNNEL: u8 = 0b0001_0000;

    pub fn advice(self) -> bool {
        self.0 & Self::ADVICE != 0
    }

    pub fn has_sync(self) -> bool {
        self.0 & Self::SYNC != 0
    }

    pub fn tunnel(self) -> bool {
        self.0 & Self::TUNNEL != 0
    }

    /// `00` unknown, `01` public, `11` symmetric NAT; the undefined `10` reads as unknown.
    pub fn connection_type(self) -> ConnectionType {
        match (self.0 & Self::CONNECTION_MASK) >> 2 {
            0b01 => ConnectionType::Public,
            0b11 => ConnectionType::SymmetricNat,
            _ => ConnectionType::Unknown,
        }
    }

    pub fn with_advice(self, advice: bool) -> Self {
        self.set(Self::ADVICE, advice)
    }

    pub fn with_sync(self, sync: bool) -> Self {
        self.set(Self::SYNC, sync)
    }

    pub fn with_tunnel(self, tunnel: bool) -> Self {
        self.set(Self::TUNNEL, tunnel)
    }

    pub fn with_connection_type(self, connection: ConnectionType) -> Self {
        let bits = match connection {
            ConnectionType::Unknown => 0b00,
            ConnectionType::Public => 0b01,
            ConnectionType::SymmetricNat => 0b11,
        };
        Self((self.0 & !Self::CONNECTION_MASK) | (bits << 2))
    }

    fn set(self, mask: u8, on: bool) -> Self {
        if on {
            Self(self.0 | mask)
        } else {
            Self(self.0 & !mask)
        }
    }
}
