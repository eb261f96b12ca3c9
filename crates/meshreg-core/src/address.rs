//! Domain prefix and domain unicast address types.

use std::{fmt, net::Ipv6Addr, str::FromStr};

use meshreg_proto::InterfaceIdentifier;

use crate::error::PrefixError;

/// Longest domain prefix that leaves room for a 64-bit interface identifier.
pub const MAX_DOMAIN_PREFIX_LENGTH: u8 = 64;

/// An IPv6 prefix with host bits cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ip6Prefix {
    bytes: [u8; 16],
    length: u8,
}

impl Ip6Prefix {
    /// Build a prefix from `addr`, keeping only the first `length` bits.
    ///
    /// Returns `None` if `length` exceeds 128.
    pub fn new(addr: Ipv6Addr, length: u8) -> Option<Self> {
        if length > 128 {
            return None;
        }

        let mut bytes = addr.octets();
        for (i, byte) in bytes.iter_mut().enumerate() {
            let bit = (i * 8) as u8;
            if bit >= length {
                *byte = 0;
            } else if length - bit < 8 {
                *byte &= 0xff << (8 - (length - bit));
            }
        }

        Some(Self { bytes, length })
    }

    /// Prefix length in bits.
    pub fn length(&self) -> u8 {
        self.length
    }

    /// Prefix as an address with host bits zero.
    pub fn network(&self) -> Ipv6Addr {
        Ipv6Addr::from(self.bytes)
    }

    /// Bytes covering the prefix bits.
    pub fn significant_bytes(&self) -> &[u8] {
        &self.bytes[..usize::from(self.length).div_ceil(8)]
    }

    /// True if `addr` falls inside this prefix.
    pub fn contains(&self, addr: &Ipv6Addr) -> bool {
        Self::new(*addr, self.length).is_some_and(|masked| masked.bytes == self.bytes)
    }

    /// Address made of this prefix followed by `iid` in the lower 64 bits.
    ///
    /// Returns `None` if the prefix is longer than
    /// [`MAX_DOMAIN_PREFIX_LENGTH`], since the identifier would overwrite
    /// prefix bits.
    pub fn with_iid(&self, iid: &InterfaceIdentifier) -> Option<Ipv6Addr> {
        if self.length > MAX_DOMAIN_PREFIX_LENGTH {
            return None;
        }

        let mut bytes = self.bytes;
        bytes[8..].copy_from_slice(iid.as_bytes());
        Some(Ipv6Addr::from(bytes))
    }
}

impl FromStr for Ip6Prefix {
    type Err = PrefixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, length) =
            s.split_once('/').ok_or_else(|| PrefixError::MissingLength(s.to_string()))?;
        let addr: Ipv6Addr =
            addr.parse().map_err(|_| PrefixError::InvalidAddress(s.to_string()))?;
        let length: u8 = length.parse().map_err(|_| PrefixError::InvalidLength(s.to_string()))?;

        Self::new(addr, length).ok_or_else(|| PrefixError::InvalidLength(s.to_string()))
    }
}

impl fmt::Display for Ip6Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network(), self.length)
    }
}

/// The device's domain unicast address as exposed to the address table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainUnicastAddress {
    /// Full address
    pub address: Ipv6Addr,
    /// Length of the domain prefix part
    pub prefix_length: u8,
    /// Set once the address survived the DAD period
    pub preferred: bool,
}

impl DomainUnicastAddress {
    /// Unassigned address (`::/0`).
    pub const fn unspecified() -> Self {
        Self { address: Ipv6Addr::UNSPECIFIED, prefix_length: 0, preferred: false }
    }

    /// Interface identifier part.
    pub fn iid(&self) -> InterfaceIdentifier {
        InterfaceIdentifier::of(&self.address)
    }
}

impl Default for DomainUnicastAddress {
    fn default() -> Self {
        Self::unspecified()
    }
}
