//! Error types for registration and its collaborators.

use meshreg_proto::{InterfaceIdentifier, ProtocolError};
use thiserror::Error;

use crate::address::Ip6Prefix;

/// Errors surfaced by the registration manager.
///
/// Only the configuration surface returns these to callers; everything else
/// is logged and folded into state transitions or backoff.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DuaError {
    /// Requested interface identifier is reserved
    #[error("interface identifier {0} is reserved")]
    InvalidArgs(InterfaceIdentifier),

    /// Every candidate identifier was reserved
    #[error("no usable interface identifier after {attempts} attempts")]
    IidGeneration {
        /// Number of candidates tried
        attempts: u16,
    },

    /// Leader has no domain prefix
    #[error("no domain prefix available")]
    NoDomainPrefix,

    /// Domain prefix leaves no room for a 64-bit interface identifier
    #[error("domain prefix {0} is longer than 64 bits")]
    UnsupportedPrefix(Ip6Prefix),

    /// Settings store failed
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Persisted record could not be encoded or decoded
    #[error("settings record: {0}")]
    Record(String),

    /// Outgoing message could not be built
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Invalid [`crate::DuaConfig`] values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A delay that must arm a countdown was zero
    #[error("{name} must be at least one tick")]
    ZeroDelay {
        /// Field name
        name: &'static str,
    },

    /// DAD grace period was zero
    #[error("DAD period must be non-zero")]
    ZeroDadPeriod,
}

/// Failure reported synchronously when handing a message to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    /// No message buffers available
    #[error("no buffers")]
    NoBufs,

    /// Any other send failure
    #[error("send failed")]
    Failed,
}

/// Outcome of an outstanding request other than a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransportError {
    /// No response within the transport's retransmission window
    #[error("response timeout")]
    ResponseTimeout,

    /// Transaction was aborted locally
    #[error("transaction aborted")]
    Aborted,

    /// Peer reset or any other transport failure
    #[error("transport failure")]
    Failed,
}

/// Settings store failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// Underlying flash or file access failed
    #[error("settings access failed: {0}")]
    Io(String),
}

/// Malformed prefix text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrefixError {
    /// Missing `/len` suffix
    #[error("missing prefix length in {0:?}")]
    MissingLength(String),

    /// Address part did not parse
    #[error("invalid address in {0:?}")]
    InvalidAddress(String),

    /// Length part did not parse or exceeds 128
    #[error("invalid prefix length in {0:?}")]
    InvalidLength(String),
}
