//! Response, timeout and relayed-notification handling.
//!
//! Both inbound paths converge on [`DuaManager::process_status`], which
//! applies one registrar verdict to whichever address it names.

use std::net::Ipv6Addr;

use bytes::Bytes;
use meshreg_proto::{DuaNotification, DuaResponse, DuaStatus, ResponseCode};
use tracing::{debug, info, warn};

use crate::{
    action::DuaAction,
    delay::DelayKind,
    error::TransportError,
    host::{ChildInfo, Host},
    manager::DuaManager,
};

/// Response to a registration request as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMessage {
    /// Response code
    pub code: ResponseCode,
    /// TLV payload
    pub payload: Bytes,
}

impl ResponseMessage {
    /// 2.04 response carrying `response`.
    pub fn changed(response: &DuaResponse) -> Result<Self, meshreg_proto::ProtocolError> {
        Ok(Self { code: ResponseCode::CHANGED, payload: response.encode()? })
    }
}

/// Registration verdict relayed to this device by a parent or registrar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationMessage {
    /// Sender expects an acknowledgement
    pub confirmable: bool,
    /// TLV payload
    pub payload: Bytes,
}

impl DuaManager {
    /// Outcome of the outstanding registration request.
    pub fn handle_response<H: Host>(
        &mut self,
        result: Result<ResponseMessage, TransportError>,
        host: &H,
    ) -> Vec<DuaAction> {
        self.with_actions(|this, actions| this.on_response(result, host, actions))
    }

    fn on_response<H: Host>(
        &mut self,
        result: Result<ResponseMessage, TransportError>,
        host: &H,
        actions: &mut Vec<DuaAction>,
    ) {
        let Some(pending) = self.pending.take() else {
            debug!("DUA.rsp without an outstanding request");
            return;
        };

        let response = match result {
            Ok(response) => response,
            Err(TransportError::ResponseTimeout) => {
                info!(dua = %pending.address, "DUA.req timed out");
                self.revert_own(pending.target);
                self.delays
                    .request(DelayKind::Check, u16::from(self.config.response_timeout_delay));
                return;
            },
            Err(e) => {
                info!(dua = %pending.address, error = %e, "DUA.req failed");
                self.revert_own(pending.target);
                self.next_registration(host, actions);
                return;
            },
        };

        let applied = match response_verdict(&response, pending.address) {
            Some((status, target)) => {
                info!(dua = %target, %status, code = %response.code, "received DUA.rsp");
                self.process_status(status, target, host, actions)
            },
            None => false,
        };

        if !applied {
            self.revert_own(pending.target);
        }

        self.next_registration(host, actions);
    }

    /// Verdict relayed by a parent (or the registrar) outside a transaction.
    pub fn handle_notification<H: Host>(
        &mut self,
        message: &NotificationMessage,
        host: &H,
    ) -> Vec<DuaAction> {
        self.with_actions(|this, actions| {
            if message.confirmable {
                actions.push(DuaAction::SendEmptyAck);
            }

            let (status, target) = match DuaNotification::decode(&message.payload) {
                Ok(notification) => (notification.status, notification.target),
                Err(e) => match this.last_requested {
                    Some(address) => {
                        warn!(error = %e, "malformed DUA.ntf");
                        (DuaStatus::GeneralFailure, address)
                    },
                    None => {
                        warn!(error = %e, "dropping malformed DUA.ntf");
                        return;
                    },
                },
            };

            info!(dua = %target, %status, "received DUA.ntf");
            this.process_status(status, target, host, actions);
        })
    }

    /// Apply a verdict for `target`. Returns false if `target` is neither the
    /// own address nor a proxied child's.
    pub(crate) fn process_status<H: Host>(
        &mut self,
        status: DuaStatus,
        target: Ipv6Addr,
        host: &H,
        actions: &mut Vec<DuaAction>,
    ) -> bool {
        if !host.is_domain_unicast(&target) {
            warn!(dua = %target, "verdict for a non-domain address");
            return false;
        }

        if host.has_unicast_address(&target) {
            self.apply_own_status(status, host, actions);
            return true;
        }

        if !self.config.proxy_enabled {
            return false;
        }

        let Some(child) = host.find_child_by_address(&target) else {
            warn!(dua = %target, "verdict for an unknown address");
            return false;
        };

        self.apply_child_status(status, target, &child, host, actions);
        true
    }

    fn apply_own_status<H: Host>(
        &mut self,
        status: DuaStatus,
        host: &H,
        actions: &mut Vec<DuaAction>,
    ) {
        match status {
            DuaStatus::Success => self.own.confirm(host.now()),
            DuaStatus::ReRegister => {
                if self.own.is_live(host) {
                    self.remove_own_address(actions);
                    self.add_own_address(host, actions);
                }
            },
            DuaStatus::Invalid => self.remove_own_address(actions),
            DuaStatus::Duplicate => self.handle_duplicate(host, actions),
            // Stays in flight until the backoff requeues it.
            transient => self.back_off(transient, host),
        }
    }

    fn apply_child_status<H: Host>(
        &mut self,
        status: DuaStatus,
        target: Ipv6Addr,
        child: &ChildInfo,
        host: &H,
        actions: &mut Vec<DuaAction>,
    ) {
        match status {
            DuaStatus::Success => self.proxy.mark_registered(child.index),
            DuaStatus::ReRegister => self.proxy.drop_child(child.index),
            rejected if rejected.invalidates_address() => {
                actions.push(DuaAction::RemoveChildAddress { index: child.index, address: target });
                self.proxy.drop_child(child.index);
            },
            transient => {
                self.proxy.defer(child.index);
                self.back_off(transient, host);
            },
        }

        if status != DuaStatus::Success {
            let notification = DuaNotification { status, target };
            actions.push(DuaAction::SendNotification { notification, child_rloc16: child.rloc16 });
            info!(dua = %target, child = %child.index, %status, "sending DUA.ntf");
        }
    }

    fn back_off<H: Host>(&mut self, status: DuaStatus, host: &H) {
        debug_assert!(status.is_transient(), "{status} is not a transient status");
        self.request_reregistration_delay(host);
    }
}

/// Status and target named by a response.
///
/// Error codes and unparseable bodies count as a general failure for the
/// requested address. Any other non-2.04 code carries no verdict.
fn response_verdict(
    response: &ResponseMessage,
    requested: Ipv6Addr,
) -> Option<(DuaStatus, Ipv6Addr)> {
    if response.code.is_error() {
        warn!(code = %response.code, "DUA.req rejected");
        return Some((DuaStatus::GeneralFailure, requested));
    }

    if response.code != ResponseCode::CHANGED {
        warn!(code = %response.code, "ignoring DUA.rsp without a verdict");
        return None;
    }

    match DuaResponse::decode(&response.payload) {
        Ok(decoded) => Some((decoded.status, decoded.target)),
        Err(e) => {
            warn!(error = %e, "malformed DUA.rsp");
            Some((DuaStatus::GeneralFailure, requested))
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUESTED: Ipv6Addr = Ipv6Addr::new(0xfd00, 0xdb8, 0, 0, 1, 2, 3, 4);
    const OTHER: Ipv6Addr = Ipv6Addr::new(0xfd00, 0xdb8, 0, 0, 9, 9, 9, 9);

    #[test]
    fn changed_response_yields_its_verdict() {
        let response =
            ResponseMessage::changed(&DuaResponse { status: DuaStatus::Duplicate, target: OTHER })
                .unwrap();
        assert_eq!(response_verdict(&response, REQUESTED), Some((DuaStatus::Duplicate, OTHER)));
    }

    #[test]
    fn error_code_is_general_failure_for_requested() {
        let response =
            ResponseMessage { code: ResponseCode::INTERNAL_ERROR, payload: Bytes::new() };
        assert_eq!(
            response_verdict(&response, REQUESTED),
            Some((DuaStatus::GeneralFailure, REQUESTED))
        );
    }

    #[test]
    fn success_code_other_than_changed_carries_no_verdict() {
        let created = ResponseMessage {
            code: ResponseCode::new(2, 1),
            payload: Bytes::from_static(&[4, 1, 0]),
        };
        assert_eq!(response_verdict(&created, REQUESTED), None);

        let content = ResponseMessage { code: ResponseCode::new(2, 5), payload: Bytes::new() };
        assert_eq!(response_verdict(&content, REQUESTED), None);
    }

    #[test]
    fn malformed_body_is_general_failure_for_requested() {
        let response =
            ResponseMessage { code: ResponseCode::CHANGED, payload: Bytes::from_static(&[4, 1]) };
        assert_eq!(
            response_verdict(&response, REQUESTED),
            Some((DuaStatus::GeneralFailure, REQUESTED))
        );
    }

    #[test]
    fn missing_target_is_general_failure_for_requested() {
        let response =
            ResponseMessage { code: ResponseCode::CHANGED, payload: Bytes::from_static(&[4, 1, 0]) };
        assert_eq!(
            response_verdict(&response, REQUESTED),
            Some((DuaStatus::GeneralFailure, REQUESTED))
        );
    }
}
