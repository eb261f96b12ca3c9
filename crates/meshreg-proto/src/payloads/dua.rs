//! DUA registration payload types.
//!
//! # Protocol Flow
//!
//! 1. A device (or a router proxying for a sleepy child) sends a confirmable
//!    [`DuaRequest`] to the primary registrar
//! 2. The registrar answers with a [`DuaResponse`] carrying the verdict for
//!    the target, or an error code with no body
//! 3. A router whose proxy registration failed forwards the verdict to the
//!    child as a [`DuaNotification`]

use std::net::Ipv6Addr;

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::{
    errors::Result,
    iid::InterfaceIdentifier,
    status::DuaStatus,
    tlv::{self, types},
};

/// Registration request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuaRequest {
    /// Domain address being registered
    pub target: Ipv6Addr,

    /// Mesh-local identifier of the address owner
    pub ml_iid: InterfaceIdentifier,

    /// Seconds since the owner was last heard (proxy registrations only)
    pub last_transaction_time: Option<u32>,
}

impl DuaRequest {
    /// Encode as a TLV sequence.
    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        tlv::append(&mut buf, types::TARGET, &self.target.octets())?;
        tlv::append(&mut buf, types::MESH_LOCAL_EID, self.ml_iid.as_bytes())?;
        if let Some(seconds) = self.last_transaction_time {
            tlv::append(&mut buf, types::LAST_TRANSACTION_TIME, &seconds.to_be_bytes())?;
        }
        Ok(buf.freeze())
    }

    /// Decode from a TLV sequence.
    pub fn decode(body: &[u8]) -> Result<Self> {
        let target = Ipv6Addr::from(tlv::require_fixed::<16>(body, types::TARGET)?);
        let ml_iid =
            InterfaceIdentifier::from_bytes(tlv::require_fixed(body, types::MESH_LOCAL_EID)?);
        let last_transaction_time =
            tlv::find_fixed::<4>(body, types::LAST_TRANSACTION_TIME)?.map(u32::from_be_bytes);

        Ok(Self { target, ml_iid, last_transaction_time })
    }
}

/// Registrar verdict for one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuaResponse {
    /// Registration status
    pub status: DuaStatus,

    /// Address the status applies to
    pub target: Ipv6Addr,
}

impl DuaResponse {
    /// Encode as a TLV sequence.
    pub fn encode(&self) -> Result<Bytes> {
        encode_verdict(self.status, self.target)
    }

    /// Decode from a TLV sequence.
    pub fn decode(body: &[u8]) -> Result<Self> {
        let (status, target) = decode_verdict(body)?;
        Ok(Self { status, target })
    }
}

/// Unsolicited verdict, e.g. from a parent to a proxied child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuaNotification {
    /// Registration status
    pub status: DuaStatus,

    /// Address the status applies to
    pub target: Ipv6Addr,
}

impl DuaNotification {
    /// Encode as a TLV sequence.
    pub fn encode(&self) -> Result<Bytes> {
        encode_verdict(self.status, self.target)
    }

    /// Decode from a TLV sequence.
    pub fn decode(body: &[u8]) -> Result<Self> {
        let (status, target) = decode_verdict(body)?;
        Ok(Self { status, target })
    }
}

impl From<DuaResponse> for DuaNotification {
    fn from(response: DuaResponse) -> Self {
        Self { status: response.status, target: response.target }
    }
}

fn encode_verdict(status: DuaStatus, target: Ipv6Addr) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    tlv::append(&mut buf, types::STATUS, &[status.to_u8()])?;
    tlv::append(&mut buf, types::TARGET, &target.octets())?;
    Ok(buf.freeze())
}

fn decode_verdict(body: &[u8]) -> Result<(DuaStatus, Ipv6Addr)> {
    let [raw_status] = tlv::require_fixed::<1>(body, types::STATUS)?;
    let status = DuaStatus::try_from(raw_status)?;
    let target = Ipv6Addr::from(tlv::require_fixed::<16>(body, types::TARGET)?);
    Ok((status, target))
}
