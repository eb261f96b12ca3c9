//! Type-length-value encoding used inside registration message bodies.
//!
//! ```text
//! ┌──────┬────────┬─────────────────┐
//! │ type │ length │ value (length)  │
//! │  u8  │   u8   │                 │
//! └──────┴────────┴─────────────────┘
//! ```
//!
//! Unknown TLV types are skipped by readers so newer peers can append fields.

use bytes::{BufMut, BytesMut};

use crate::errors::{ProtocolError, Result};

/// TLV type codes used by DUA registration messages.
pub mod types {
    /// Target domain address (16 bytes)
    pub const TARGET: u8 = 0;
    /// Mesh-local EID interface identifier (8 bytes)
    pub const MESH_LOCAL_EID: u8 = 3;
    /// Registration status (1 byte)
    pub const STATUS: u8 = 4;
    /// Seconds since the registered device was last heard (4 bytes)
    pub const LAST_TRANSACTION_TIME: u8 = 6;
}

/// Size of the type and length fields.
pub const HEADER_SIZE: usize = 2;

/// Largest value representable by the one-byte length field.
pub const MAX_VALUE_LEN: usize = u8::MAX as usize;

/// A borrowed TLV.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tlv<'a> {
    /// Type code
    pub tlv_type: u8,
    /// Value bytes
    pub value: &'a [u8],
}

/// Append one TLV to `buf`.
pub fn append(buf: &mut BytesMut, tlv_type: u8, value: &[u8]) -> Result<()> {
    if value.len() > MAX_VALUE_LEN {
        return Err(ProtocolError::ValueTooLong(value.len()));
    }

    buf.reserve(HEADER_SIZE + value.len());
    buf.put_u8(tlv_type);
    buf.put_u8(value.len() as u8);
    buf.put_slice(value);
    Ok(())
}

/// Iterate the TLVs of a message body.
///
/// Yields an error for a truncated TLV and stops afterwards.
pub fn iter(buf: &[u8]) -> TlvIter<'_> {
    TlvIter { buf, offset: 0 }
}

/// Iterator returned by [`iter`].
#[derive(Debug, Clone)]
pub struct TlvIter<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> Iterator for TlvIter<'a> {
    type Item = Result<Tlv<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        let buf: &'a [u8] = self.buf;
        let rest = buf.get(self.offset..)?;
        if rest.is_empty() {
            return None;
        }

        let start = self.offset;
        let parsed = match rest {
            [tlv_type, len, tail @ ..] if tail.len() >= *len as usize => {
                Ok(Tlv { tlv_type: *tlv_type, value: &tail[..*len as usize] })
            },
            _ => Err(ProtocolError::Truncated { offset: start }),
        };

        self.offset = match &parsed {
            Ok(tlv) => start + HEADER_SIZE + tlv.value.len(),
            Err(_) => buf.len(),
        };

        Some(parsed)
    }
}

/// Value of the first TLV of `tlv_type`, if any.
pub fn find(buf: &[u8], tlv_type: u8) -> Result<Option<&[u8]>> {
    for tlv in iter(buf) {
        let tlv = tlv?;
        if tlv.tlv_type == tlv_type {
            return Ok(Some(tlv.value));
        }
    }
    Ok(None)
}

/// Value of the first TLV of `tlv_type`, which must be exactly `N` bytes.
pub fn find_fixed<const N: usize>(buf: &[u8], tlv_type: u8) -> Result<Option<[u8; N]>> {
    let Some(value) = find(buf, tlv_type)? else {
        return Ok(None);
    };

    <[u8; N]>::try_from(value).map(Some).map_err(|_| ProtocolError::InvalidLength {
        tlv_type,
        expected: N,
        actual: value.len(),
    })
}

/// Like [`find_fixed`], but a missing TLV is an error.
pub fn require_fixed<const N: usize>(buf: &[u8], tlv_type: u8) -> Result<[u8; N]> {
    find_fixed(buf, tlv_type)?.ok_or(ProtocolError::MissingTlv(tlv_type))
}
