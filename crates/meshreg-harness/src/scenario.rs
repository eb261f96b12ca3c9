//! Scenario driver.
//!
//! A [`World`] wires a [`DuaManager`] to a [`SimHost`] and a
//! [`ScriptedRegistrar`] and advances them together: ticks move the virtual
//! clock one second, and the outstanding request is answered only when the
//! scenario asks for delivery. Every manager operation goes through a `World`
//! method that executes the returned actions before returning, the way a
//! production runtime would. [`Operation`] is the vocabulary used by
//! randomized runs.

use std::{collections::VecDeque, net::Ipv6Addr, time::Duration};

use arbitrary::Arbitrary;
use meshreg_core::{
    AddressTable, ChildAddressEvent, ChildIndex, ChildTable, ConfigError, DelayKind,
    DomainPrefixEvent, DuaAction, DuaConfig, DuaError, DuaManager, DuaState, Ip6Prefix,
    NotificationMessage, NotifierEvents, PrimaryState, ResponseMessage, SendError,
    TransportError,
};
use meshreg_proto::{DuaNotification, InterfaceIdentifier};
use tracing::{debug, warn};

use crate::{
    registrar::{ScriptedRegistrar, Verdict},
    sim_env::SimEnv,
    sim_host::{Role, SimHost},
};

/// Length of one tick.
pub const TICK: Duration = Duration::from_secs(1);

/// Child slots used by randomized runs.
const CHILD_SLOTS: u8 = 6;

/// One randomized step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub enum Operation {
    /// Publish the primary domain prefix
    AddPrefix,
    /// Withdraw the domain prefix
    RemovePrefix,
    /// Switch to the alternate domain prefix
    RefreshPrefix,
    /// Network data changed without touching the prefix
    NetdataUnchanged,
    /// Network data lost the domain prefix context
    DropDomainContext,
    /// Lose attachment
    Detach,
    /// Attach as an end device
    AttachAsChild,
    /// Become a router
    PromoteToRouter,
    /// Primary registrar appeared
    PrimaryAdded,
    /// Primary registrar requests re-registration
    PrimaryRereg,
    /// A child attached or registered a domain address
    ChildAdded {
        /// Slot selector
        slot: u8,
    },
    /// A child replaced its domain address
    ChildChanged {
        /// Slot selector
        slot: u8,
    },
    /// A child detached
    ChildRemoved {
        /// Slot selector
        slot: u8,
    },
    /// Advance time
    Tick {
        /// Tick count selector
        count: u8,
    },
    /// Answer the outstanding request
    Deliver,
    /// Queue a registrar verdict
    Script {
        /// Verdict selector
        verdict: u8,
    },
    /// Receive a relayed verdict
    Notify {
        /// Verdict selector
        verdict: u8,
        /// Name the own address instead of a child's
        own: bool,
    },
    /// Fix the interface identifier
    SetFixedIid {
        /// Raw identifier
        iid: u64,
    },
    /// Clear the fixed interface identifier
    ClearFixedIid,
    /// Operator removal of the own address
    RemoveDua,
    /// Make the next send fail
    SendFault {
        /// Fail with no-buffers rather than a generic failure
        no_bufs: bool,
    },
}

/// Manager, simulated stack and registrar advancing together.
#[derive(Debug)]
pub struct World {
    /// Manager under test
    pub manager: DuaManager,
    /// Simulated stack
    pub host: SimHost,
    /// Registrar answering requests
    pub registrar: ScriptedRegistrar,
    env: SimEnv,
    prefixes: [Ip6Prefix; 2],
    active_prefix: usize,
    child_generation: u16,
}

impl World {
    /// Attached router with default configuration.
    pub fn router(seed: u64) -> Self {
        let env = SimEnv::with_seed(seed);
        let host = SimHost::router(env.clone());
        match Self::with_host(DuaConfig::default(), host, env) {
            Ok(world) => world,
            Err(e) => unreachable!("default configuration rejected: {e}"),
        }
    }

    /// Sleepy end device behind a legacy parent.
    pub fn sleepy_end_device(seed: u64) -> Self {
        let env = SimEnv::with_seed(seed);
        let host = SimHost::sleepy_end_device(env.clone());
        match Self::with_host(DuaConfig::end_device(), host, env) {
            Ok(world) => world,
            Err(e) => unreachable!("end device configuration rejected: {e}"),
        }
    }

    /// World around a prepared host. The manager restores from its settings.
    pub fn with_host(config: DuaConfig, host: SimHost, env: SimEnv) -> Result<Self, ConfigError> {
        let manager = DuaManager::new(config, &host)?;

        Ok(Self {
            manager,
            host,
            registrar: ScriptedRegistrar::new(),
            env,
            prefixes: [domain_prefix(0), domain_prefix(1)],
            active_prefix: 0,
            child_generation: 0,
        })
    }

    /// Shared environment.
    pub fn env(&self) -> &SimEnv {
        &self.env
    }

    /// Prefix that [`Operation::AddPrefix`] publishes.
    pub fn prefix(&self) -> Ip6Prefix {
        self.prefixes[self.active_prefix]
    }

    /// The own domain address while assigned.
    pub fn own_address(&self) -> Option<Ipv6Addr> {
        (self.manager.state() != DuaState::Absent)
            .then(|| self.manager.domain_unicast_address().address)
    }

    /// Carry out the manager's actions in order.
    ///
    /// A refused send is reported back to the manager right away and the
    /// actions it returns run after the rest of the batch. Other failures
    /// are best effort and only logged.
    pub fn execute(&mut self, actions: Vec<DuaAction>) {
        let mut queue = VecDeque::from(actions);
        while let Some(action) = queue.pop_front() {
            let Err(error) = self.host.execute(&action) else {
                continue;
            };

            if matches!(action, DuaAction::SendRequest { .. }) {
                queue.extend(self.manager.handle_send_error(error));
            } else {
                warn!(?action, error = %error, "action failed");
            }
        }
    }

    /// Report a domain prefix event.
    pub fn prefix_event(&mut self, event: DomainPrefixEvent) {
        let actions = self.manager.handle_domain_prefix_event(event, &self.host);
        self.execute(actions);
    }

    /// Report notifier events.
    pub fn notifier_events(&mut self, events: NotifierEvents) {
        let actions = self.manager.handle_notifier_events(events, &self.host);
        self.execute(actions);
    }

    /// Report a primary registrar change.
    pub fn primary_update(&mut self, state: PrimaryState) {
        let actions = self.manager.handle_primary_update(state, &self.host);
        self.execute(actions);
    }

    /// Report a child address event.
    pub fn child_event(&mut self, index: ChildIndex, event: ChildAddressEvent) {
        let actions = self.manager.handle_child_address_event(index, event, &self.host);
        self.execute(actions);
    }

    /// Deliver one tick without moving the clock, subscribed or not.
    pub fn time_tick(&mut self) {
        let actions = self.manager.handle_time_tick(&self.host);
        self.execute(actions);
    }

    /// Run target selection now.
    pub fn perform_next_registration(&mut self) {
        let actions = self.manager.perform_next_registration(&self.host);
        self.execute(actions);
    }

    /// Report the outcome of the outstanding request.
    pub fn respond(&mut self, outcome: Result<ResponseMessage, TransportError>) {
        let actions = self.manager.handle_response(outcome, &self.host);
        self.execute(actions);
    }

    /// Receive a relayed verdict.
    pub fn receive_notification(&mut self, message: &NotificationMessage) {
        let actions = self.manager.handle_notification(message, &self.host);
        self.execute(actions);
    }

    /// Fix the own interface identifier.
    pub fn set_fixed_iid(&mut self, iid: InterfaceIdentifier) -> Result<(), DuaError> {
        let actions = self.manager.set_fixed_iid(iid, &self.host)?;
        self.execute(actions);
        Ok(())
    }

    /// Go back to generated identifiers.
    pub fn clear_fixed_iid(&mut self) {
        let actions = self.manager.clear_fixed_iid(&self.host);
        self.execute(actions);
    }

    /// Operator removal of the own address.
    pub fn remove_dua(&mut self) {
        let actions = self.manager.remove_domain_unicast_address();
        self.execute(actions);
    }

    /// Publish the active prefix.
    pub fn add_prefix(&mut self) {
        let event = if self.host.domain_prefix.is_some() {
            DomainPrefixEvent::Refreshed
        } else {
            DomainPrefixEvent::Added
        };
        self.host.set_domain_prefix(Some(self.prefix()));
        self.prefix_event(event);
    }

    /// Withdraw the prefix.
    pub fn remove_prefix(&mut self) {
        self.host.set_domain_prefix(None);
        self.prefix_event(DomainPrefixEvent::Removed);
    }

    /// Advance one tick, delivering it if subscribed.
    pub fn tick(&mut self) {
        self.env.advance(TICK);
        if self.host.is_subscribed() {
            self.time_tick();
        }
    }

    /// Answer the outstanding request. Returns false if there was none.
    pub fn deliver(&mut self) -> bool {
        let Some(sent) = self.host.take_outstanding() else {
            return false;
        };
        let outcome = self.registrar.respond(&sent.request);
        self.respond(outcome);
        true
    }

    /// Tick `ticks` times, answering requests as they go out.
    pub fn run(&mut self, ticks: u32) {
        for _ in 0..ticks {
            self.tick();
            while self.deliver() {}
        }
    }

    /// Attach a child holding a fresh domain address and report it.
    pub fn add_child(&mut self, slot: u16) -> Option<Ipv6Addr> {
        let index = ChildIndex::new(slot)?;
        let address = self.next_child_address(slot)?;
        self.host.attach_child(index, Some(address));
        self.child_event(index, ChildAddressEvent::Added);
        Some(address)
    }

    /// Give a child a new domain address and report it.
    pub fn change_child(&mut self, slot: u16) -> Option<Ipv6Addr> {
        let index = ChildIndex::new(slot)?;
        self.host.child(index)?;
        let address = self.next_child_address(slot)?;
        self.host.set_child_address(index, Some(address));
        self.child_event(index, ChildAddressEvent::Changed);
        Some(address)
    }

    /// Detach a child and report it.
    pub fn remove_child(&mut self, slot: u16) {
        let Some(index) = ChildIndex::new(slot) else {
            return;
        };
        if self.host.detach_child(index) {
            self.child_event(index, ChildAddressEvent::Removed);
        }
    }

    /// Deliver a relayed verdict for `target`.
    pub fn notify(&mut self, notification: DuaNotification, confirmable: bool) {
        let Ok(payload) = notification.encode() else {
            return;
        };
        let message = NotificationMessage { confirmable, payload };
        self.receive_notification(&message);
    }

    fn next_child_address(&mut self, slot: u16) -> Option<Ipv6Addr> {
        self.child_generation = self.child_generation.wrapping_add(1);
        let iid = InterfaceIdentifier::from(
            0x0200_0000_0000_0000 | (u64::from(slot) << 16) | u64::from(self.child_generation),
        );
        self.prefix().with_iid(&iid)
    }

    /// Apply one randomized step.
    pub fn apply(&mut self, op: &Operation) {
        match *op {
            Operation::AddPrefix => self.add_prefix(),
            Operation::RemovePrefix => self.remove_prefix(),
            Operation::RefreshPrefix => {
                self.active_prefix ^= 1;
                if self.host.domain_prefix.is_some() {
                    self.add_prefix();
                }
            },
            Operation::NetdataUnchanged => {
                self.prefix_event(DomainPrefixEvent::Unchanged);
                self.notifier_events(NotifierEvents::NETDATA_CHANGED);
            },
            Operation::DropDomainContext => {
                self.host.contexts.clear();
                self.notifier_events(NotifierEvents::NETDATA_CHANGED);
            },
            Operation::Detach => self.set_role(Role::Detached),
            Operation::AttachAsChild => self.set_role(Role::Child),
            Operation::PromoteToRouter => self.set_role(Role::Router),
            Operation::PrimaryAdded => self.primary_update(PrimaryState::Added),
            Operation::PrimaryRereg => self.primary_update(PrimaryState::ToTriggerRereg),
            Operation::ChildAdded { slot } => {
                let slot = u16::from(slot % CHILD_SLOTS);
                let attached = ChildIndex::new(slot).and_then(|index| self.host.child(index));
                if attached.is_some() {
                    self.change_child(slot);
                } else {
                    self.add_child(slot);
                }
            },
            Operation::ChildChanged { slot } => {
                self.change_child(u16::from(slot % CHILD_SLOTS));
            },
            Operation::ChildRemoved { slot } => self.remove_child(u16::from(slot % CHILD_SLOTS)),
            Operation::Tick { count } => {
                for _ in 0..=(count % 8) {
                    self.tick();
                }
            },
            Operation::Deliver => {
                self.deliver();
            },
            Operation::Script { verdict } => self.registrar.push(Verdict::from_seed(verdict)),
            Operation::Notify { verdict, own } => self.apply_notify(verdict, own),
            Operation::SetFixedIid { iid } => {
                if let Err(e) = self.set_fixed_iid(InterfaceIdentifier::from(iid)) {
                    debug!(error = %e, "fixed IID rejected");
                }
            },
            Operation::ClearFixedIid => self.clear_fixed_iid(),
            Operation::RemoveDua => self.remove_dua(),
            Operation::SendFault { no_bufs } => self.host.inject_send_fault(if no_bufs {
                SendError::NoBufs
            } else {
                SendError::Failed
            }),
        }
    }

    fn set_role(&mut self, role: Role) {
        self.host.role = role;
        self.notifier_events(NotifierEvents::ROLE_CHANGED);
    }

    fn apply_notify(&mut self, verdict: u8, own: bool) {
        let Verdict::Status(status) = Verdict::from_seed(verdict) else {
            return;
        };

        let target = if own {
            self.own_address()
        } else {
            self.host.valid_children().into_iter().find_map(|child| child.domain_address)
        };

        if let Some(target) = target {
            self.notify(DuaNotification { status, target }, true);
        }
    }

    /// Check every cross-component invariant. Returns a description of the
    /// first violation.
    pub fn check_invariants(&self) -> Result<(), String> {
        let proxy = self.manager.proxy();
        if !proxy.registered_mask().is_subset_of(proxy.proxy_mask()) {
            return Err(format!(
                "registered children {:?} not a subset of proxied {:?}",
                proxy.registered_mask(),
                proxy.proxy_mask()
            ));
        }
        if !proxy.backoff_mask().is_subset_of(proxy.proxy_mask())
            || !proxy.backoff_mask().is_disjoint(proxy.registered_mask())
        {
            return Err(format!(
                "backing-off children {:?} outside unregistered proxied {:?}",
                proxy.backoff_mask(),
                proxy.proxy_mask()
            ));
        }
        if !proxy.backoff_mask().is_empty()
            && self.manager.delays().get(DelayKind::Reregistration) == 0
        {
            return Err(format!(
                "children {:?} backing off with no countdown running",
                proxy.backoff_mask()
            ));
        }

        let state = self.manager.state();
        let address = self.manager.domain_unicast_address().address;
        let live = self.host.has_unicast_address(&address);
        if live != (state != DuaState::Absent) {
            return Err(format!("address {address} live={live} in state {state}"));
        }

        if self.manager.pending().is_some() != self.host.outstanding().is_some() {
            return Err(format!(
                "manager pending {:?} but transport outstanding {:?}",
                self.manager.pending(),
                self.host.outstanding()
            ));
        }

        if let Some(violation) = self.host.violations().first() {
            return Err(violation.clone());
        }

        if self.host.is_subscribed() != self.manager.wants_ticks()
            || self.host.is_subscribed() == self.manager.delays().is_idle()
        {
            return Err(format!(
                "subscribed={} with delays {:?}",
                self.host.is_subscribed(),
                self.manager.delays()
            ));
        }

        Ok(())
    }
}

/// Domain prefixes used by scenarios: `2001:db8::/64` and
/// `2001:db8:0:1::/64`.
fn domain_prefix(n: u16) -> Ip6Prefix {
    Ip6Prefix::new(Ipv6Addr::new(0x2001, 0x0db8, 0, n, 0, 0, 0, 0), 64)
        .unwrap_or_else(|| unreachable!("64 is a valid prefix length"))
}
