//! Semantically opaque interface identifier generation.
//!
//! Identifiers are derived in the style of RFC 7217:
//!
//! ```text
//! IID = first 64 bits of SHA-256(prefix ‖ network id ‖ dad counter ‖ secret)
//! ```
//!
//! The same inputs always produce the same identifier, so a device keeps its
//! domain address across reboots. Bumping the DAD counter after a duplicate
//! yields an unrelated candidate.

use meshreg_proto::InterfaceIdentifier;
use sha2::{Digest, Sha256};

use crate::{address::Ip6Prefix, error::DuaError};

/// Candidates tried before giving up on reserved collisions.
pub const MAX_IID_CREATION_ATTEMPTS: u16 = 256;

/// Size of the per-device secret.
pub const IID_SECRET_KEY_SIZE: usize = 32;

/// Per-device secret mixed into every generated identifier.
#[derive(Clone, PartialEq, Eq)]
pub struct IidSecretKey([u8; IID_SECRET_KEY_SIZE]);

impl IidSecretKey {
    /// Wrap raw key material.
    pub const fn from_bytes(bytes: [u8; IID_SECRET_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw key material.
    pub const fn as_bytes(&self) -> &[u8; IID_SECRET_KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for IidSecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("IidSecretKey(..)")
    }
}

/// Generate an identifier for `prefix`.
///
/// Reserved candidates are skipped by advancing `dad_counter`, so the caller
/// must persist the counter if it changed.
pub fn generate_opaque_iid(
    prefix: &Ip6Prefix,
    network_id: &[u8; 8],
    dad_counter: &mut u8,
    secret: &IidSecretKey,
) -> Result<InterfaceIdentifier, DuaError> {
    for _ in 0..MAX_IID_CREATION_ATTEMPTS {
        let digest = Sha256::new()
            .chain_update(prefix.significant_bytes())
            .chain_update(network_id)
            .chain_update([*dad_counter])
            .chain_update(secret.as_bytes())
            .finalize();

        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        let iid = InterfaceIdentifier::from_bytes(bytes);

        if !iid.is_reserved() {
            return Ok(iid);
        }

        *dad_counter = dad_counter.wrapping_add(1);
    }

    Err(DuaError::IidGeneration { attempts: MAX_IID_CREATION_ATTEMPTS })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefix() -> Ip6Prefix {
        "2001:db8::/64".parse().unwrap()
    }

    const NETWORK_ID: [u8; 8] = [0xde, 0xad, 0x00, 0xbe, 0xef, 0x00, 0xca, 0xfe];

    #[test]
    fn generation_is_deterministic() {
        let secret = IidSecretKey::from_bytes([7; IID_SECRET_KEY_SIZE]);
        let mut counter_a = 0;
        let mut counter_b = 0;

        let a = generate_opaque_iid(&prefix(), &NETWORK_ID, &mut counter_a, &secret).unwrap();
        let b = generate_opaque_iid(&prefix(), &NETWORK_ID, &mut counter_b, &secret).unwrap();

        assert_eq!(a, b);
        assert_eq!(counter_a, 0);
        assert!(!a.is_reserved());
    }

    #[test]
    fn dad_counter_changes_identifier() {
        let secret = IidSecretKey::from_bytes([7; IID_SECRET_KEY_SIZE]);
        let mut counter = 0;
        let first = generate_opaque_iid(&prefix(), &NETWORK_ID, &mut counter, &secret).unwrap();

        counter += 1;
        let second = generate_opaque_iid(&prefix(), &NETWORK_ID, &mut counter, &secret).unwrap();

        assert_ne!(first, second);
    }

    #[test]
    fn inputs_all_contribute() {
        let secret = IidSecretKey::from_bytes([7; IID_SECRET_KEY_SIZE]);
        let other_secret = IidSecretKey::from_bytes([8; IID_SECRET_KEY_SIZE]);
        let other_prefix: Ip6Prefix = "2001:db8:1::/64".parse().unwrap();

        let base = generate_opaque_iid(&prefix(), &NETWORK_ID, &mut 0, &secret).unwrap();
        assert_ne!(base, generate_opaque_iid(&other_prefix, &NETWORK_ID, &mut 0, &secret).unwrap());
        assert_ne!(base, generate_opaque_iid(&prefix(), &[0; 8], &mut 0, &secret).unwrap());
        assert_ne!(base, generate_opaque_iid(&prefix(), &NETWORK_ID, &mut 0, &other_secret).unwrap());
    }

    #[test]
    fn secret_is_not_printed() {
        let secret = IidSecretKey::from_bytes([0xaa; IID_SECRET_KEY_SIZE]);
        assert_eq!(format!("{secret:?}"), "IidSecretKey(..)");
    }
}
