//! In-memory stack answering the manager's queries and executing its actions.
//!
//! [`SimHost`] models just enough of the surrounding stack to exercise the
//! registration manager: an interface address list, a link with a
//! configurable role, the leader's backbone data, a settings store, a child
//! table, and a control transport that records what was sent. It answers the
//! manager's queries through the `meshreg_core::host` traits and carries out
//! its [`DuaAction`]s in [`SimHost::execute`].
//!
//! The transport also polices the one-outstanding-request rule: a send while
//! a request is still outstanding is recorded as a violation instead of being
//! silently accepted.

use std::{
    collections::{BTreeMap, VecDeque},
    net::Ipv6Addr,
    time::{Duration, Instant},
};

use meshreg_core::{
    AddressTable, BackboneLeader, ChildIndex, ChildInfo, ChildTable, DuaAction, Environment,
    Ip6Prefix, MeshLink, PrimaryConfig, SendError, SettingsKey, SettingsStore, StorageError,
};
use meshreg_proto::{DuaNotification, DuaRequest, InterfaceIdentifier};
use rand::RngCore;
use tracing::trace;

use crate::sim_env::SimEnv;

/// Mesh-local prefix used for locators.
const MESH_LOCAL_PREFIX: [u16; 4] = [0xfd00, 0x0db8, 0, 0];

/// Device role on the mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Not attached
    Detached,
    /// Attached as an end device
    Child,
    /// Attached as a router
    Router,
    /// Attached as the partition leader
    Leader,
}

/// A registration request handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentRequest {
    /// The request
    pub request: DuaRequest,
    /// Registrar locator it was sent to
    pub destination: Ipv6Addr,
    /// Virtual time of the send
    pub at: Duration,
}

/// A notification sent to a child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentNotification {
    /// The notification
    pub notification: DuaNotification,
    /// Short address of the child
    pub child_rloc16: u16,
}

#[derive(Debug, Clone)]
struct SimChild {
    rloc16: u16,
    mesh_local_iid: InterfaceIdentifier,
    addresses: Vec<Ipv6Addr>,
    last_heard: Instant,
}

/// Simulated stack.
#[derive(Debug)]
pub struct SimHost {
    env: SimEnv,

    /// Current role
    pub role: Role,
    /// Full-function device
    pub full_thread_device: bool,
    /// Parent speaks only the legacy protocol revision
    pub parent_legacy: bool,
    /// End device about to promote itself to router
    pub will_become_router_soon: bool,
    /// Promotion jitter window, in ticks
    pub router_role_transition_timeout: u8,
    /// Role was restored from settings
    pub restored: bool,
    /// Receiver stays on while idle
    pub rx_on_when_idle: bool,
    /// Identifier of the mesh-local EID
    pub mesh_local_iid: InterfaceIdentifier,
    /// Network identity
    pub network_id: [u8; 8],

    /// Published domain prefix
    pub domain_prefix: Option<Ip6Prefix>,
    /// Primary registrar configuration
    pub primary: Option<PrimaryConfig>,
    /// Backbone service id
    pub backbone_service_id: Option<u8>,
    /// Prefixes with a compression context in network data
    pub contexts: Vec<Ip6Prefix>,

    /// Settings reads fail while set
    pub fail_settings_reads: bool,
    /// Notification sends fail while set
    pub fail_notifications: bool,

    addresses: BTreeMap<Ipv6Addr, bool>,
    settings: BTreeMap<SettingsKey, Vec<u8>>,
    children: BTreeMap<u16, SimChild>,

    send_faults: VecDeque<SendError>,
    outstanding: Option<SentRequest>,
    sent: Vec<SentRequest>,
    notifications: Vec<SentNotification>,
    aborts: usize,
    acks: usize,
    fast_polls: usize,
    subscribed: bool,
    violations: Vec<String>,
}

impl SimHost {
    /// Attached full-function router with a primary registrar and no domain
    /// prefix yet.
    pub fn router(env: SimEnv) -> Self {
        Self {
            env,
            role: Role::Router,
            full_thread_device: true,
            parent_legacy: false,
            will_become_router_soon: false,
            router_role_transition_timeout: 10,
            restored: false,
            rx_on_when_idle: true,
            mesh_local_iid: InterfaceIdentifier::from(0x1122_3344_5566_7788),
            network_id: *b"meshreg\0",
            domain_prefix: None,
            primary: Some(PrimaryConfig { server16: 0x0400, reregistration_delay: 5 }),
            backbone_service_id: Some(1),
            contexts: Vec::new(),
            fail_settings_reads: false,
            fail_notifications: false,
            addresses: BTreeMap::new(),
            settings: BTreeMap::new(),
            children: BTreeMap::new(),
            send_faults: VecDeque::new(),
            outstanding: None,
            sent: Vec::new(),
            notifications: Vec::new(),
            aborts: 0,
            acks: 0,
            fast_polls: 0,
            subscribed: false,
            violations: Vec::new(),
        }
    }

    /// Sleepy minimal end device behind a legacy parent.
    pub fn sleepy_end_device(env: SimEnv) -> Self {
        Self {
            role: Role::Child,
            full_thread_device: false,
            parent_legacy: true,
            rx_on_when_idle: false,
            ..Self::router(env)
        }
    }

    /// Shared environment handle.
    pub fn env(&self) -> &SimEnv {
        &self.env
    }

    /// Publish or withdraw the domain prefix along with its context.
    pub fn set_domain_prefix(&mut self, prefix: Option<Ip6Prefix>) {
        if let Some(old) = self.domain_prefix.take() {
            self.contexts.retain(|context| *context != old);
        }
        if let Some(new) = prefix {
            self.contexts.push(new);
        }
        self.domain_prefix = prefix;
    }

    /// Preferred flag of an assigned address.
    pub fn is_preferred(&self, addr: &Ipv6Addr) -> Option<bool> {
        self.addresses.get(addr).copied()
    }

    /// Assigned addresses.
    pub fn addresses(&self) -> impl Iterator<Item = &Ipv6Addr> {
        self.addresses.keys()
    }

    /// Make the next send fail with `error`.
    pub fn inject_send_fault(&mut self, error: SendError) {
        self.send_faults.push_back(error);
    }

    /// Drop injected send faults that have not fired yet.
    pub fn clear_send_faults(&mut self) {
        self.send_faults.clear();
    }

    /// Raw settings record.
    pub fn setting(&self, key: SettingsKey) -> Option<&[u8]> {
        self.settings.get(&key).map(Vec::as_slice)
    }

    /// Request awaiting its outcome.
    pub fn outstanding(&self) -> Option<&SentRequest> {
        self.outstanding.as_ref()
    }

    /// Hand the outstanding request to a responder.
    pub fn take_outstanding(&mut self) -> Option<SentRequest> {
        self.outstanding.take()
    }

    /// Every request sent so far.
    pub fn sent(&self) -> &[SentRequest] {
        &self.sent
    }

    /// Every notification sent to children so far.
    pub fn notifications(&self) -> &[SentNotification] {
        &self.notifications
    }

    /// Number of aborted transactions.
    pub fn aborts(&self) -> usize {
        self.aborts
    }

    /// Number of empty acknowledgements sent.
    pub fn acks(&self) -> usize {
        self.acks
    }

    /// Number of fast-poll requests.
    pub fn fast_polls(&self) -> usize {
        self.fast_polls
    }

    /// Currently subscribed to ticks.
    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    /// Transport rule violations observed.
    pub fn violations(&self) -> &[String] {
        &self.violations
    }

    /// Attach a child in `slot`, optionally holding a domain address.
    pub fn attach_child(&mut self, index: ChildIndex, domain_address: Option<Ipv6Addr>) {
        let slot = index.get();
        let child = SimChild {
            rloc16: 0x0401 + slot,
            mesh_local_iid: InterfaceIdentifier::from(0xc0de_0000_0000_0000 | u64::from(slot)),
            addresses: domain_address.into_iter().collect(),
            last_heard: self.env.now(),
        };
        self.children.insert(slot, child);
    }

    /// Replace the child's domain address.
    pub fn set_child_address(&mut self, index: ChildIndex, domain_address: Option<Ipv6Addr>) {
        if let Some(child) = self.children.get_mut(&index.get()) {
            child.addresses = domain_address.into_iter().collect();
        }
    }

    /// Record traffic from the child.
    pub fn hear_child(&mut self, index: ChildIndex) {
        let now = self.env.now();
        if let Some(child) = self.children.get_mut(&index.get()) {
            child.last_heard = now;
        }
    }

    /// Detach the child in `index`.
    pub fn detach_child(&mut self, index: ChildIndex) -> bool {
        self.children.remove(&index.get()).is_some()
    }

    /// Drop an address from the interface behind the manager's back.
    pub fn remove_address(&mut self, addr: &Ipv6Addr) {
        if self.addresses.remove(addr).is_some() {
            trace!(address = %addr, "address removed");
        }
    }

    /// Carry out one action. Only sends can fail.
    pub fn execute(&mut self, action: &DuaAction) -> Result<(), SendError> {
        match action {
            DuaAction::AddAddress(address) => {
                trace!(address = %address.address, "address added");
                self.addresses.insert(address.address, address.preferred);
            },
            DuaAction::RemoveAddress(addr) => self.remove_address(addr),
            DuaAction::MarkPreferred(addr) => {
                if let Some(flag) = self.addresses.get_mut(addr) {
                    *flag = true;
                }
            },
            DuaAction::SendRequest { request, destination } => {
                return self.send_request(request, *destination);
            },
            DuaAction::AbortTransaction => {
                if self.outstanding.take().is_some() {
                    self.aborts += 1;
                }
            },
            DuaAction::SendNotification { notification, child_rloc16 } => {
                if self.fail_notifications {
                    return Err(SendError::Failed);
                }
                self.notifications.push(SentNotification {
                    notification: *notification,
                    child_rloc16: *child_rloc16,
                });
            },
            DuaAction::SendEmptyAck => self.acks += 1,
            DuaAction::RemoveChildAddress { index, address } => {
                if let Some(child) = self.children.get_mut(&index.get()) {
                    child.addresses.retain(|held| held != address);
                }
            },
            DuaAction::SubscribeTicks => self.subscribed = true,
            DuaAction::UnsubscribeTicks => self.subscribed = false,
            DuaAction::SaveSetting { key, value } => {
                self.settings.insert(*key, value.clone());
            },
            DuaAction::SendFastPolls => self.fast_polls += 1,
        }
        Ok(())
    }

    fn send_request(
        &mut self,
        request: &DuaRequest,
        destination: Ipv6Addr,
    ) -> Result<(), SendError> {
        if let Some(error) = self.send_faults.pop_front() {
            return Err(error);
        }

        if let Some(outstanding) = &self.outstanding {
            self.violations.push(format!(
                "request for {} sent while {} outstanding",
                request.target, outstanding.request.target
            ));
        }

        let sent = SentRequest { request: request.clone(), destination, at: self.env.elapsed() };
        self.sent.push(sent.clone());
        self.outstanding = Some(sent);
        Ok(())
    }

    fn child_info(&self, slot: u16) -> Option<ChildInfo> {
        let child = self.children.get(&slot)?;
        let index = ChildIndex::new(slot)?;
        let domain_address = child
            .addresses
            .iter()
            .copied()
            .find(|addr| self.domain_prefix.is_some_and(|prefix| prefix.contains(addr)));

        Some(ChildInfo {
            index,
            rloc16: child.rloc16,
            mesh_local_iid: child.mesh_local_iid,
            domain_address,
            last_heard: child.last_heard,
        })
    }

    fn locator(iid: u16) -> Ipv6Addr {
        let [a, b, c, d] = MESH_LOCAL_PREFIX;
        Ipv6Addr::new(a, b, c, d, 0, 0x00ff, 0xfe00, iid)
    }
}

impl Environment for SimHost {
    fn now(&self) -> Instant {
        self.env.now()
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut dyn RngCore) -> T) -> T {
        self.env.with_rng(f)
    }
}

impl AddressTable for SimHost {
    fn has_unicast_address(&self, addr: &Ipv6Addr) -> bool {
        self.addresses.contains_key(addr)
    }
}

impl MeshLink for SimHost {
    fn is_attached(&self) -> bool {
        self.role != Role::Detached
    }

    fn is_router_or_leader(&self) -> bool {
        matches!(self.role, Role::Router | Role::Leader)
    }

    fn is_full_thread_device(&self) -> bool {
        self.full_thread_device
    }

    fn parent_is_legacy(&self) -> bool {
        self.parent_legacy
    }

    fn will_become_router_soon(&self) -> bool {
        self.will_become_router_soon
    }

    fn router_role_transition_timeout(&self) -> u8 {
        self.router_role_transition_timeout
    }

    fn has_restored(&self) -> bool {
        self.restored
    }

    fn is_rx_on_when_idle(&self) -> bool {
        self.rx_on_when_idle
    }

    fn mesh_local_iid(&self) -> InterfaceIdentifier {
        self.mesh_local_iid
    }

    fn routing_locator(&self, rloc16: u16) -> Ipv6Addr {
        Self::locator(rloc16)
    }

    fn service_anycast_locator(&self, service_id: u8) -> Ipv6Addr {
        Self::locator(0xfc10 | u16::from(service_id & 0x0f))
    }

    fn network_id(&self) -> [u8; 8] {
        self.network_id
    }
}

impl BackboneLeader for SimHost {
    fn domain_prefix(&self) -> Option<Ip6Prefix> {
        self.domain_prefix
    }

    fn has_primary(&self) -> bool {
        self.primary.is_some()
    }

    fn primary_config(&self) -> Option<PrimaryConfig> {
        self.primary
    }

    fn backbone_service_id(&self) -> Option<u8> {
        self.backbone_service_id
    }

    fn has_context_for(&self, addr: &Ipv6Addr) -> bool {
        self.contexts.iter().any(|context| context.contains(addr))
    }
}

impl SettingsStore for SimHost {
    fn read(&self, key: SettingsKey) -> Result<Option<Vec<u8>>, StorageError> {
        if self.fail_settings_reads {
            return Err(StorageError::Io("injected read failure".to_owned()));
        }
        Ok(self.settings.get(&key).cloned())
    }
}

impl ChildTable for SimHost {
    fn valid_children(&self) -> Vec<ChildInfo> {
        self.children.keys().filter_map(|slot| self.child_info(*slot)).collect()
    }

    fn child(&self, index: ChildIndex) -> Option<ChildInfo> {
        self.child_info(index.get())
    }

    fn find_child_by_address(&self, addr: &Ipv6Addr) -> Option<ChildInfo> {
        self.children
            .iter()
            .find(|(_, child)| child.addresses.contains(addr))
            .and_then(|(slot, _)| self.child_info(*slot))
    }
}
