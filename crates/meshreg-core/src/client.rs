//! Registration client: picks the next address to register and sends it.

use std::net::Ipv6Addr;

use meshreg_proto::DuaRequest;
use tracing::{debug, info, warn};

use crate::{
    action::DuaAction,
    delay::DelayKind,
    dua::DuaState,
    host::Host,
    manager::{DuaManager, PendingTransaction, RegistrationTarget},
};

/// Next request to send, with its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Candidate {
    target: RegistrationTarget,
    request: DuaRequest,
}

impl DuaManager {
    /// Send the next registration request, if one is due and allowed.
    ///
    /// Own address first, then the lowest-indexed child that is proxied, not
    /// yet registered and not backing off. Emits at most one
    /// [`DuaAction::SendRequest`].
    pub fn perform_next_registration<H: Host>(&mut self, host: &H) -> Vec<DuaAction> {
        self.with_actions(|this, actions| this.next_registration(host, actions))
    }

    pub(crate) fn next_registration<H: Host>(&mut self, host: &H, actions: &mut Vec<DuaAction>) {
        if !host.is_attached() || !host.has_primary() || self.pending.is_some() {
            return;
        }

        if !host.is_router_or_leader() && host.will_become_router_soon() {
            let ticks = self.router_promotion_delay(host);
            debug!(ticks, "deferring registration until role settles");
            self.delays.request(DelayKind::Registration, ticks);
            return;
        }

        if !(host.is_full_thread_device() || host.parent_is_legacy()) {
            return;
        }

        let Some(candidate) = self.select_candidate(host) else {
            return;
        };

        let Some(destination) = registrar_destination(host) else {
            warn!("no registrar locator");
            return;
        };

        self.on_request_sent(candidate, destination, host, actions);
    }

    fn select_candidate<H: Host>(&self, host: &H) -> Option<Candidate> {
        if self.own.state() == DuaState::PendingRegistration
            && self.delays.get(DelayKind::Registration) == 0
        {
            return Some(Candidate {
                target: RegistrationTarget::Own,
                request: DuaRequest {
                    target: self.own.address().address,
                    ml_iid: host.mesh_local_iid(),
                    last_transaction_time: None,
                },
            });
        }

        if !self.config.proxy_enabled || !self.proxy.has_work() {
            return None;
        }

        let now = host.now();
        host.valid_children()
            .into_iter()
            .filter(|child| self.proxy.needs_registration(child.index))
            .find_map(|child| {
                let Some(address) = child.domain_address else {
                    debug!(child = %child.index, "proxied child has no domain address");
                    return None;
                };

                let idle = now.saturating_duration_since(child.last_heard).as_secs();
                Some(Candidate {
                    target: RegistrationTarget::Child(child.index),
                    request: DuaRequest {
                        target: address,
                        ml_iid: child.mesh_local_iid,
                        last_transaction_time: Some(u32::try_from(idle).unwrap_or(u32::MAX)),
                    },
                })
            })
    }

    fn on_request_sent<H: Host>(
        &mut self,
        candidate: Candidate,
        destination: Ipv6Addr,
        host: &H,
        actions: &mut Vec<DuaAction>,
    ) {
        let address = candidate.request.target;

        if candidate.target == RegistrationTarget::Own {
            self.own.mark_in_flight(host.now());
        }

        self.pending = Some(PendingTransaction { address, target: candidate.target });
        self.last_requested = Some(address);
        actions.push(DuaAction::SendRequest { request: candidate.request, destination });

        // The backoff countdown is what releases deferred targets.
        self.delays_before_send = self.delays;
        if self.backing_off() {
            self.delays.retain(DelayKind::Reregistration);
        } else {
            self.delays.clear();
        }

        if !host.is_rx_on_when_idle() {
            actions.push(DuaAction::SendFastPolls);
        }

        info!(dua = %address, target = ?candidate.target, "sending DUA.req");
    }
}

/// Where registration requests go: the backbone service anycast locator for
/// a minimal device behind a legacy parent, else the primary registrar.
fn registrar_destination<H: Host>(host: &H) -> Option<Ipv6Addr> {
    if !host.is_full_thread_device() && host.parent_is_legacy() {
        host.backbone_service_id().map(|id| host.service_anycast_locator(id))
    } else {
        host.primary_config().map(|config| host.routing_locator(config.server16))
    }
}
