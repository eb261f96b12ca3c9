//! Registration status codes returned by the primary registrar.

use std::fmt;

use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::errors::ProtocolError;

/// Verdict for one registration target.
///
/// # Recovery classes
///
/// - `Success`: the target is registered
/// - `ReRegister`: registrar asks for a fresh registration
/// - `Invalid`, `Duplicate`: the address itself is unusable
/// - `NoResources`, `NotPrimary`, `GeneralFailure`: transient registrar
///   trouble, retried after a randomized delay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum DuaStatus {
    /// Registration accepted
    Success = 0,
    /// Registrar requests re-registration
    ReRegister = 1,
    /// Target is not a valid domain address (e.g. stale prefix)
    Invalid = 2,
    /// Target is already registered by another device
    Duplicate = 3,
    /// Registrar has no room for another entry
    NoResources = 4,
    /// Recipient is not the primary registrar
    NotPrimary = 5,
    /// Unspecified failure
    GeneralFailure = 6,
}

impl DuaStatus {
    /// All status values in wire order.
    pub const ALL: [Self; 7] = [
        Self::Success,
        Self::ReRegister,
        Self::Invalid,
        Self::Duplicate,
        Self::NoResources,
        Self::NotPrimary,
        Self::GeneralFailure,
    ];

    /// Wire value.
    pub const fn to_u8(self) -> u8 {
        self as u8
    }

    /// True for failures recovered by a randomized re-registration delay.
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::NoResources | Self::NotPrimary | Self::GeneralFailure)
    }

    /// True for statuses that make the target address unusable.
    pub const fn invalidates_address(self) -> bool {
        matches!(self, Self::Invalid | Self::Duplicate)
    }
}

impl TryFrom<u8> for DuaStatus {
    type Error = ProtocolError;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        Self::ALL.get(raw as usize).copied().ok_or(ProtocolError::UnknownStatus(raw))
    }
}

impl fmt::Display for DuaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Success => "Success",
            Self::ReRegister => "ReRegister",
            Self::Invalid => "Invalid",
            Self::Duplicate => "Duplicate",
            Self::NoResources => "NoResources",
            Self::NotPrimary => "NotPrimary",
            Self::GeneralFailure => "GeneralFailure",
        };
        f.write_str(name)
    }
}
