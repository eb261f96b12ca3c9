//! Effects requested by the registration manager.
//!
//! Operations of [`crate::DuaManager`] never touch the stack directly. They
//! return the effects they want carried out, in order, and the driver (the
//! production runtime or the simulation harness) executes them:
//!
//! - `AddAddress` / `RemoveAddress` / `MarkPreferred`: update the interface
//!   address list
//! - `SendRequest` / `AbortTransaction`: the one registration transaction
//! - `SendNotification` / `SendEmptyAck`: best-effort messages, failures are
//!   logged by the driver and never retried
//! - `RemoveChildAddress`: drop a rejected address from a child
//! - `SubscribeTicks` / `UnsubscribeTicks`: follow the countdowns
//! - `SaveSetting`: persist a record
//! - `SendFastPolls`: sleepy devices fetch the response quickly
//!
//! Reads stay on the query traits in [`crate::host`].

use std::net::Ipv6Addr;

use meshreg_proto::{DuaNotification, DuaRequest};

use crate::{address::DomainUnicastAddress, proxy::ChildIndex, settings::SettingsKey};

/// One effect for the driver to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DuaAction {
    /// Assign the address to the interface
    AddAddress(DomainUnicastAddress),

    /// Remove the address from the interface
    RemoveAddress(Ipv6Addr),

    /// Mark an assigned address preferred
    MarkPreferred(Ipv6Addr),

    /// Send a registration request.
    ///
    /// If the transport refuses it, the driver reports the failure through
    /// [`crate::DuaManager::handle_send_error`] before running any other
    /// operation. Otherwise exactly one outcome is later reported through
    /// [`crate::DuaManager::handle_response`].
    SendRequest {
        /// The request
        request: DuaRequest,
        /// Registrar locator
        destination: Ipv6Addr,
    },

    /// Drop the outstanding request. Its outcome must never be reported.
    AbortTransaction,

    /// Send an unsolicited verdict to a child
    SendNotification {
        /// The verdict
        notification: DuaNotification,
        /// Short address of the child
        child_rloc16: u16,
    },

    /// Acknowledge the confirmable notification just handled
    SendEmptyAck,

    /// Remove `address` from the child's registered addresses
    RemoveChildAddress {
        /// Child-table slot
        index: ChildIndex,
        /// Rejected address
        address: Ipv6Addr,
    },

    /// Start delivering ticks
    SubscribeTicks,

    /// Stop delivering ticks
    UnsubscribeTicks,

    /// Persist a settings record
    SaveSetting {
        /// Record key
        key: SettingsKey,
        /// Encoded record
        value: Vec<u8>,
    },

    /// Ask the parent to deliver queued frames quickly
    SendFastPolls,
}
