//! Error types for DUA message decoding.

use thiserror::Error;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while encoding or decoding registration messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Buffer ended in the middle of a TLV header or value
    #[error("truncated TLV at offset {offset}")]
    Truncated {
        /// Byte offset where the TLV started
        offset: usize,
    },

    /// A TLV of known type carried a value of the wrong size
    #[error("TLV type {tlv_type} has length {actual}, expected {expected}")]
    InvalidLength {
        /// TLV type code
        tlv_type: u8,
        /// Expected value length
        expected: usize,
        /// Length found on the wire
        actual: usize,
    },

    /// A mandatory TLV is absent
    #[error("missing TLV type {0}")]
    MissingTlv(u8),

    /// Status TLV carried a value outside the defined range
    #[error("unknown DUA status {0}")]
    UnknownStatus(u8),

    /// Value does not fit in a single-byte TLV length
    #[error("TLV value too long: {0} bytes")]
    ValueTooLong(usize),
}
