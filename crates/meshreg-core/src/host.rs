//! Read-only views of the surrounding stack.
//!
//! The registration manager owns only its own bookkeeping. What it needs to
//! know about the interface address list, the mesh link layer, the leader's
//! view of backbone infrastructure, persistent settings and the child table
//! is queried through the traits below. Changes go the other way, as
//! [`crate::DuaAction`]s returned to the caller.
//!
//! Every operation of [`crate::DuaManager`] takes `&H where H: Host`, so a
//! single value implements the whole surface. Production wires these to the
//! real stack; the simulation harness backs them with in-memory models.

use std::{net::Ipv6Addr, time::Instant};

use meshreg_proto::InterfaceIdentifier;

use crate::{
    address::Ip6Prefix, env::Environment, error::StorageError, proxy::ChildIndex,
    settings::SettingsKey,
};

/// The network interface's unicast address list.
pub trait AddressTable {
    /// True if `addr` is currently assigned to the interface.
    fn has_unicast_address(&self, addr: &Ipv6Addr) -> bool;
}

/// The mesh link and attachment layer.
pub trait MeshLink {
    /// Attached to a mesh partition in any role.
    fn is_attached(&self) -> bool;

    /// Acting as router or leader.
    fn is_router_or_leader(&self) -> bool;

    /// Full-function device (may route, performs registration itself).
    fn is_full_thread_device(&self) -> bool;

    /// Parent only speaks the legacy protocol revision without proxying.
    fn parent_is_legacy(&self) -> bool;

    /// Router-eligible end device about to promote itself.
    fn will_become_router_soon(&self) -> bool;

    /// Jitter window, in ticks, before a pending router promotion.
    fn router_role_transition_timeout(&self) -> u8;

    /// The current role was restored from settings rather than freshly
    /// attached.
    fn has_restored(&self) -> bool;

    /// Receiver stays on while idle (not a sleepy device).
    fn is_rx_on_when_idle(&self) -> bool;

    /// Interface identifier of the mesh-local EID.
    fn mesh_local_iid(&self) -> InterfaceIdentifier;

    /// Routing locator address of the node with short address `rloc16`.
    fn routing_locator(&self, rloc16: u16) -> Ipv6Addr;

    /// Anycast locator of the network service with `service_id`.
    fn service_anycast_locator(&self, service_id: u8) -> Ipv6Addr;

    /// Network identity mixed into generated identifiers.
    fn network_id(&self) -> [u8; 8];
}

/// Configuration of the primary backbone registrar, as distributed by the
/// leader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimaryConfig {
    /// Short address of the primary registrar
    pub server16: u16,
    /// Upper bound (exclusive), in ticks, of randomized re-registration
    pub reregistration_delay: u16,
}

/// The leader's view of backbone infrastructure.
pub trait BackboneLeader {
    /// Current domain prefix, if one is published.
    fn domain_prefix(&self) -> Option<Ip6Prefix>;

    /// A primary registrar is present.
    fn has_primary(&self) -> bool;

    /// Primary registrar configuration, if present.
    fn primary_config(&self) -> Option<PrimaryConfig>;

    /// Network-data service id of the backbone service.
    fn backbone_service_id(&self) -> Option<u8>;

    /// Network data carries a compression context covering `addr`.
    fn has_context_for(&self, addr: &Ipv6Addr) -> bool;

    /// `addr` lies inside the current domain prefix.
    fn is_domain_unicast(&self, addr: &Ipv6Addr) -> bool {
        self.domain_prefix().is_some_and(|prefix| prefix.contains(addr))
    }
}

/// Small-record persistent storage. Writes are requested with
/// [`crate::DuaAction::SaveSetting`].
pub trait SettingsStore {
    /// Read a record. `Ok(None)` if it does not exist.
    fn read(&self, key: SettingsKey) -> Result<Option<Vec<u8>>, StorageError>;
}

/// Snapshot of one valid child-table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildInfo {
    /// Slot in the child table
    pub index: ChildIndex,
    /// Child short address
    pub rloc16: u16,
    /// Interface identifier of the child's mesh-local EID
    pub mesh_local_iid: InterfaceIdentifier,
    /// Domain address the child registered with us, if any
    pub domain_address: Option<Ipv6Addr>,
    /// Last time a frame from the child was received
    pub last_heard: Instant,
}

/// The router's table of attached children.
pub trait ChildTable {
    /// Valid children in slot order.
    fn valid_children(&self) -> Vec<ChildInfo>;

    /// Valid child in `index`, if any.
    fn child(&self, index: ChildIndex) -> Option<ChildInfo>;

    /// Valid child holding `addr` among its registered addresses.
    fn find_child_by_address(&self, addr: &Ipv6Addr) -> Option<ChildInfo>;
}

/// Everything the registration manager reads from its surroundings.
pub trait Host:
    Environment + AddressTable + MeshLink + BackboneLeader + SettingsStore + ChildTable
{
}

impl<T> Host for T where
    T: Environment + AddressTable + MeshLink + BackboneLeader + SettingsStore + ChildTable
{
}
