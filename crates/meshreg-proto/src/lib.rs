//! Wire format for domain unicast address (DUA) registration.
//!
//! Registration messages are small TLV sequences carried in the body of a
//! confirmable control-protocol request. Each TLV is a one-byte type, a
//! one-byte length and `length` bytes of value. Framing, retransmission and
//! the request/response matching are left to the transport; this crate only
//! describes what goes inside the body.
//!
//! Three messages exist:
//!
//! - [`DuaRequest`]: registers a target address on behalf of a mesh-local
//!   identity (the sender's own, or a proxied child's)
//! - [`DuaResponse`]: the registrar's verdict for one target
//! - [`DuaNotification`]: the same verdict sent unsolicited, e.g. relayed by a
//!   parent to a sleepy child
//!
//! # Security
//!
//! Decoding never trusts declared lengths: every TLV is bounds-checked against
//! the remaining buffer and against the fixed size of its type before a value
//! is read.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod code;
pub mod errors;
pub mod iid;
pub mod payloads;
pub mod status;
pub mod tlv;

pub use code::ResponseCode;
pub use errors::{ProtocolError, Result};
pub use iid::InterfaceIdentifier;
pub use payloads::{DuaNotification, DuaRequest, DuaResponse};
pub use status::DuaStatus;
