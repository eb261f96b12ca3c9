//! 64-bit IPv6 interface identifiers.

use std::{fmt, net::Ipv6Addr};

use serde::{Deserialize, Serialize};

/// Lower 64 bits of an IPv6 address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InterfaceIdentifier([u8; 8]);

impl InterfaceIdentifier {
    /// Size on the wire.
    pub const SIZE: usize = 8;

    /// Wrap raw bytes.
    pub const fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// Raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    /// Identifier part of `addr`.
    pub fn of(addr: &Ipv6Addr) -> Self {
        let octets = addr.octets();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&octets[8..]);
        Self(bytes)
    }

    /// Subnet-router anycast identifier (all zero).
    pub fn is_subnet_router_anycast(&self) -> bool {
        self.0 == [0; 8]
    }

    /// Reserved subnet anycast range `fdff:ffff:ffff:ff80` to
    /// `fdff:ffff:ffff:ffff`.
    pub fn is_reserved_subnet_anycast(&self) -> bool {
        self.0[..7] == [0xfd, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff] && self.0[7] >= 0x80
    }

    /// Mesh anycast locator `0000:00ff:fe00:fcXX`.
    pub fn is_anycast_locator(&self) -> bool {
        self.0[..7] == [0x00, 0x00, 0x00, 0xff, 0xfe, 0x00, 0xfc]
    }

    /// True if the identifier must never be assigned to a unicast address.
    pub fn is_reserved(&self) -> bool {
        self.is_subnet_router_anycast()
            || self.is_reserved_subnet_anycast()
            || self.is_anycast_locator()
    }
}

impl From<u64> for InterfaceIdentifier {
    fn from(value: u64) -> Self {
        Self(value.to_be_bytes())
    }
}

impl From<InterfaceIdentifier> for u64 {
    fn from(iid: InterfaceIdentifier) -> Self {
        Self::from_be_bytes(iid.0)
    }
}

impl fmt::Display for InterfaceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            write!(f, "{byte:02x}")?;
            if i % 2 == 1 && i != 7 {
                f.write_str(":")?;
            }
        }
        Ok(())
    }
}
