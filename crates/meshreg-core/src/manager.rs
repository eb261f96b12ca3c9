//! Registration manager: owns all registration state and routes events.
//!
//! # Architecture
//!
//! [`DuaManager`] is an action-based state machine. It holds no references
//! to the stack: every operation reads its surroundings through `&H where H:
//! Host` and returns the [`DuaAction`]s the caller must execute, in order.
//! Failures are logged and absorbed into state or backoff; the only failure
//! reported back in is a refused send, through
//! [`DuaManager::handle_send_error`].
//!
//! Work is split across three files that all extend [`DuaManager`]:
//!
//! - this module: event inputs, configuration surface, shared helpers
//! - [`crate::client`]: target selection and the single send site
//! - [`crate::dispatch`]: response, timeout and notification handling
//!
//! # Concurrency
//!
//! At most one registration request is outstanding. [`DuaManager::pending`]
//! is checked before every send and cleared on every outcome or abort.
//!
//! The tick subscription is reconciled at the end of every operation, so
//! `SubscribeTicks` and `UnsubscribeTicks` alternate and the caller delivers
//! ticks exactly while a countdown runs.

use std::net::Ipv6Addr;

use bitflags::bitflags;
use meshreg_proto::InterfaceIdentifier;
use tracing::{debug, info, warn};

use crate::{
    action::DuaAction,
    address::DomainUnicastAddress,
    config::DuaConfig,
    delay::{DelayKind, DelayState},
    dua::{DomainAddress, DuaState},
    error::{ConfigError, DuaError, SendError},
    host::{Host, SettingsStore},
    proxy::{ChildAddressEvent, ChildIndex, ChildProxyRegistry},
};

/// Change to the published domain prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomainPrefixEvent {
    /// A domain prefix appeared
    Added,
    /// The domain prefix was withdrawn
    Removed,
    /// The domain prefix was replaced
    Refreshed,
    /// Network data changed but the prefix did not
    Unchanged,
}

/// Primary registrar change reported by the leader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimaryState {
    /// No primary registrar
    None,
    /// A primary registrar appeared
    Added,
    /// The primary registrar went away
    Removed,
    /// The primary registrar asks every device to re-register
    ToTriggerRereg,
    /// The primary registrar refreshed its configuration
    Refreshed,
    /// Nothing relevant changed
    Unchanged,
}

bitflags! {
    /// Stack-wide change notifications relevant to registration.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct NotifierEvents: u32 {
        /// Device role or attachment changed
        const ROLE_CHANGED = 1 << 0;
        /// A unicast address was added to the interface
        const IP6_ADDRESS_ADDED = 1 << 1;
        /// Network data changed
        const NETDATA_CHANGED = 1 << 2;
    }
}

/// Whom a registration request is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistrationTarget {
    /// The device's own domain address
    Own,
    /// A proxied child's domain address
    Child(ChildIndex),
}

/// The single outstanding registration request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTransaction {
    /// Address named in the request
    pub address: Ipv6Addr,
    /// Owner of that address
    pub target: RegistrationTarget,
}

/// Domain unicast address registration manager.
#[derive(Debug, Clone)]
pub struct DuaManager {
    pub(crate) config: DuaConfig,
    pub(crate) delays: DelayState,
    /// Countdowns as they were before the last send, restored if the
    /// transport refuses it
    pub(crate) delays_before_send: DelayState,
    pub(crate) ticking: bool,
    pub(crate) own: DomainAddress,
    pub(crate) proxy: ChildProxyRegistry,
    pub(crate) pending: Option<PendingTransaction>,
    /// Target of the most recent request, kept after it completed so an
    /// unparseable verdict can still be attributed
    pub(crate) last_requested: Option<Ipv6Addr>,
}

impl DuaManager {
    /// Create a manager and restore the persisted DAD counter.
    pub fn new<S: SettingsStore + ?Sized>(
        config: DuaConfig,
        settings: &S,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut own = DomainAddress::new();
        own.restore(settings);

        Ok(Self {
            config,
            delays: DelayState::new(),
            delays_before_send: DelayState::new(),
            ticking: false,
            own,
            proxy: ChildProxyRegistry::new(),
            pending: None,
            last_requested: None,
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &DuaConfig {
        &self.config
    }

    /// State of the own domain address.
    pub fn state(&self) -> DuaState {
        self.own.state()
    }

    /// The own domain address.
    pub fn domain_unicast_address(&self) -> &DomainUnicastAddress {
        self.own.address()
    }

    /// Own address state machine.
    pub fn own_address(&self) -> &DomainAddress {
        &self.own
    }

    /// Persisted duplicate counter.
    pub fn dad_counter(&self) -> u8 {
        self.own.dad_counter()
    }

    /// Operator-fixed interface identifier.
    pub fn fixed_iid(&self) -> Option<InterfaceIdentifier> {
        self.own.fixed_iid()
    }

    /// Running countdowns.
    pub fn delays(&self) -> &DelayState {
        &self.delays
    }

    /// Child proxy bookkeeping.
    pub fn proxy(&self) -> &ChildProxyRegistry {
        &self.proxy
    }

    /// Outstanding registration request, if any.
    pub fn pending(&self) -> Option<&PendingTransaction> {
        self.pending.as_ref()
    }

    /// Ticks were requested and not yet released.
    pub fn wants_ticks(&self) -> bool {
        self.ticking
    }

    /// Domain prefix added, removed or changed.
    pub fn handle_domain_prefix_event<H: Host>(
        &mut self,
        event: DomainPrefixEvent,
        host: &H,
    ) -> Vec<DuaAction> {
        self.with_actions(|this, actions| this.on_domain_prefix_event(event, host, actions))
    }

    fn on_domain_prefix_event<H: Host>(
        &mut self,
        event: DomainPrefixEvent,
        host: &H,
        actions: &mut Vec<DuaAction>,
    ) {
        if matches!(event, DomainPrefixEvent::Removed | DomainPrefixEvent::Refreshed) {
            self.abort_pending(actions);

            if self.own.state() != DuaState::Absent {
                self.remove_own_address(actions);
            }

            self.proxy.clear();
        }

        match event {
            DomainPrefixEvent::Removed => return,
            DomainPrefixEvent::Unchanged if self.own.is_live(host) => return,
            DomainPrefixEvent::Added
            | DomainPrefixEvent::Refreshed
            | DomainPrefixEvent::Unchanged => {},
        }

        let Some(prefix) = host.domain_prefix() else {
            debug!(?event, "domain prefix event without a prefix");
            return;
        };

        if let Err(e) = self.own.assign_prefix(&prefix) {
            warn!(error = %e, "ignoring domain prefix");
            return;
        }

        if self.own.derive_iid(host, actions).is_ok() {
            self.add_own_address(host, actions);
        }
    }

    /// Role, address and network-data notifications.
    pub fn handle_notifier_events<H: Host>(
        &mut self,
        events: NotifierEvents,
        host: &H,
    ) -> Vec<DuaAction> {
        self.with_actions(|this, actions| this.on_notifier_events(events, host, actions))
    }

    fn on_notifier_events<H: Host>(
        &mut self,
        events: NotifierEvents,
        host: &H,
        actions: &mut Vec<DuaAction>,
    ) {
        if events.contains(NotifierEvents::NETDATA_CHANGED)
            && self.own.is_live(host)
            && !host.has_context_for(&self.own.address().address)
        {
            info!(dua = %self.own.address().address, "removing stale DUA");
            self.remove_own_address(actions);
        }

        if !host.is_attached() {
            self.delays.clear();
            return;
        }

        if events.contains(NotifierEvents::ROLE_CHANGED) {
            if host.has_restored() {
                self.request_reregistration_delay(host);
            } else if host.is_router_or_leader() {
                // Give links to neighboring routers time to come up.
                self.delays.request(
                    DelayKind::Registration,
                    u16::from(self.config.new_router_registration_delay),
                );
            } else if host.will_become_router_soon() {
                // Look again in case the device stays an end device after the
                // promotion jitter.
                let ticks = self.router_promotion_delay(host);
                self.delays.request(DelayKind::Registration, ticks);
            }
        }

        if events.contains(NotifierEvents::IP6_ADDRESS_ADDED) {
            self.delays.request(
                DelayKind::Registration,
                u16::from(self.config.new_dua_registration_delay),
            );
        }
    }

    /// Primary registrar appeared or asked for re-registration.
    pub fn handle_primary_update<H: Host>(
        &mut self,
        state: PrimaryState,
        host: &H,
    ) -> Vec<DuaAction> {
        self.with_actions(|this, _| {
            if matches!(state, PrimaryState::Added | PrimaryState::ToTriggerRereg)
                && (host.is_full_thread_device() || host.parent_is_legacy())
            {
                this.request_reregistration_delay(host);
            }
        })
    }

    /// One tick of the shared tick source.
    pub fn handle_time_tick<H: Host>(&mut self, host: &H) -> Vec<DuaAction> {
        self.with_actions(|this, actions| {
            if let Some(action) = this.own.refresh_preferred(host.now(), this.config.dad_period) {
                actions.push(action);
            }

            let outcome = this.delays.on_tick();

            if outcome.reregistration_expired {
                if !this.own_in_flight() {
                    this.own.requeue();
                }
                this.proxy.reset_registered();
            }

            if outcome.attempt_due() {
                this.next_registration(host, actions);
            }
        })
    }

    /// A child's domain address changed.
    pub fn handle_child_address_event<H: Host>(
        &mut self,
        index: ChildIndex,
        event: ChildAddressEvent,
        host: &H,
    ) -> Vec<DuaAction> {
        self.with_actions(|this, actions| {
            if !this.config.proxy_enabled {
                return;
            }

            let update = this.proxy.handle_event(index, event);

            if update.dropped
                && this.pending.is_some_and(|p| p.target == RegistrationTarget::Child(index))
            {
                debug!(child = %index, "aborting proxy registration");
                this.abort_pending(actions);
            }

            if update.schedule_check {
                let ticks = host.random_u8_in_range(1, this.config.parent_aggregate_delay);
                this.delays.request(DelayKind::Check, u16::from(ticks));
            }
        })
    }

    /// The transport refused the request of the last
    /// [`DuaAction::SendRequest`].
    ///
    /// Undoes the bookkeeping of the send: the target goes back to waiting
    /// and the countdowns run as if the attempt never happened. Buffer
    /// exhaustion additionally arms a short retry.
    pub fn handle_send_error(&mut self, error: SendError) -> Vec<DuaAction> {
        self.with_actions(|this, _| {
            let Some(pending) = this.pending.take() else {
                debug!(error = %error, "send failure without an outstanding request");
                return;
            };

            this.revert_own(pending.target);
            this.delays = this.delays_before_send;

            match error {
                SendError::NoBufs => {
                    warn!(dua = %pending.address, "no buffers for DUA.req");
                    this.delays.request(DelayKind::Check, u16::from(this.config.no_buf_delay));
                },
                SendError::Failed => {
                    warn!(dua = %pending.address, error = %error, "failed to send DUA.req");
                },
            }
        })
    }

    /// Use `iid` for the own domain address instead of a generated one.
    pub fn set_fixed_iid<H: Host>(
        &mut self,
        iid: InterfaceIdentifier,
        host: &H,
    ) -> Result<Vec<DuaAction>, DuaError> {
        if iid.is_reserved() {
            return Err(DuaError::InvalidArgs(iid));
        }

        Ok(self.with_actions(|this, actions| {
            if !this.own.set_fixed_iid(iid) {
                return;
            }

            info!(%iid, "set DUA IID");

            if this.own.is_live(host) {
                this.remove_own_address(actions);
                this.own.apply_iid(&iid);
                this.add_own_address(host, actions);
            }
        }))
    }

    /// Go back to generated identifiers.
    pub fn clear_fixed_iid<H: Host>(&mut self, host: &H) -> Vec<DuaAction> {
        self.with_actions(|this, actions| {
            let Some(fixed) = this.own.fixed_iid() else {
                return;
            };

            if this.own.address().iid() == fixed && this.own.is_live(host) {
                this.remove_own_address(actions);

                if this.own.generate_iid(host, actions).is_ok() {
                    this.add_own_address(host, actions);
                }
            }

            this.own.take_fixed_iid();
            info!(iid = %fixed, "cleared DUA IID");
        })
    }

    /// Withdraw the own domain address (operator action).
    pub fn remove_domain_unicast_address(&mut self) -> Vec<DuaAction> {
        self.with_actions(|this, actions| {
            if this.own.state() != DuaState::Absent {
                this.remove_own_address(actions);
            }
        })
    }

    /// Run `f`, then reconcile backoff and the tick subscription with the
    /// countdowns.
    pub(crate) fn with_actions(
        &mut self,
        f: impl FnOnce(&mut Self, &mut Vec<DuaAction>),
    ) -> Vec<DuaAction> {
        let mut actions = Vec::new();
        f(self, &mut actions);

        // A backoff only lasts as long as its countdown.
        if self.delays.get(DelayKind::Reregistration) == 0 && self.backing_off() {
            debug!("releasing backed-off targets");
            if !self.own_in_flight() {
                self.own.revert_in_flight();
            }
            self.proxy.release_deferred();
        }

        let wanted = !self.delays.is_idle();
        if wanted != self.ticking {
            self.ticking = wanted;
            let action =
                if wanted { DuaAction::SubscribeTicks } else { DuaAction::UnsubscribeTicks };
            actions.push(action);
        }

        actions
    }

    pub(crate) fn add_own_address<H: Host>(&mut self, host: &H, actions: &mut Vec<DuaAction>) {
        actions.push(self.own.add(host.now()));
        self.delays.request(
            DelayKind::Registration,
            u16::from(self.config.new_dua_registration_delay),
        );
    }

    pub(crate) fn remove_own_address(&mut self, actions: &mut Vec<DuaAction>) {
        if self.own_in_flight() {
            self.abort_pending(actions);
        }
        actions.push(self.own.remove());
    }

    /// Own address was reported as a duplicate: regenerate it.
    pub(crate) fn handle_duplicate<H: Host>(&mut self, host: &H, actions: &mut Vec<DuaAction>) {
        self.remove_own_address(actions);
        self.own.bump_dad_counter(actions);

        if self.own.generate_iid(host, actions).is_ok() {
            self.add_own_address(host, actions);
        }
    }

    /// Drop the outstanding request, if any.
    pub(crate) fn abort_pending(&mut self, actions: &mut Vec<DuaAction>) {
        if let Some(pending) = self.pending.take() {
            actions.push(DuaAction::AbortTransaction);
            self.revert_own(pending.target);
        }
    }

    pub(crate) fn revert_own(&mut self, target: RegistrationTarget) {
        if target == RegistrationTarget::Own {
            self.own.revert_in_flight();
        }
    }

    pub(crate) fn own_in_flight(&self) -> bool {
        self.pending.is_some_and(|p| p.target == RegistrationTarget::Own)
    }

    /// Some address is waiting out a registrar backoff: the own address kept
    /// in flight without a request, or a deferred child.
    pub(crate) fn backing_off(&self) -> bool {
        (self.own.state() == DuaState::InFlight && !self.own_in_flight())
            || !self.proxy.backoff_mask().is_empty()
    }

    /// Randomized backoff bounded by the registrar's configuration.
    pub(crate) fn request_reregistration_delay<H: Host>(&mut self, host: &H) {
        let Some(config) = host.primary_config() else {
            return;
        };

        let ticks = if config.reregistration_delay > 1 {
            host.random_u16_in_range(1, config.reregistration_delay)
        } else {
            1
        };

        self.delays.request(DelayKind::Reregistration, ticks);
    }

    pub(crate) fn router_promotion_delay<H: Host>(&self, host: &H) -> u16 {
        u16::from(host.router_role_transition_timeout())
            + u16::from(self.config.new_router_registration_delay)
            + 1
    }
}
