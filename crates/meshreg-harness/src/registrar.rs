//! Scripted backbone registrar.

use std::collections::VecDeque;

use bytes::Bytes;
use meshreg_core::{ResponseMessage, TransportError};
use meshreg_proto::{DuaRequest, DuaResponse, DuaStatus, ResponseCode};

/// How the registrar answers one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// 2.04 with this status for the requested target
    Status(DuaStatus),
    /// Error response code without a body
    Rejected(ResponseCode),
    /// 2.04 with an unparseable body
    Malformed,
    /// No response within the retransmission window
    Timeout,
    /// Peer reset
    Failure,
}

impl Verdict {
    /// Map an arbitrary byte onto a verdict, weighted towards statuses.
    pub fn from_seed(seed: u8) -> Self {
        match seed % 11 {
            n @ 0..=6 => Self::Status(DuaStatus::ALL[usize::from(n)]),
            7 => Self::Rejected(ResponseCode::INTERNAL_ERROR),
            8 => Self::Malformed,
            9 => Self::Timeout,
            _ => Self::Failure,
        }
    }
}

/// Registrar answering from a script, then with a default verdict.
#[derive(Debug, Clone)]
pub struct ScriptedRegistrar {
    script: VecDeque<Verdict>,
    default: Verdict,
    handled: Vec<DuaRequest>,
}

impl Default for ScriptedRegistrar {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedRegistrar {
    /// Registrar that accepts everything.
    pub fn new() -> Self {
        Self {
            script: VecDeque::new(),
            default: Verdict::Status(DuaStatus::Success),
            handled: Vec::new(),
        }
    }

    /// Answer the next request with `verdict`.
    pub fn push(&mut self, verdict: Verdict) {
        self.script.push_back(verdict);
    }

    /// Drop every scripted verdict.
    pub fn clear_script(&mut self) {
        self.script.clear();
    }

    /// Answer unscripted requests with `verdict`.
    pub fn set_default(&mut self, verdict: Verdict) {
        self.default = verdict;
    }

    /// Requests answered so far.
    pub fn handled(&self) -> &[DuaRequest] {
        &self.handled
    }

    /// Produce the transport outcome for `request`.
    pub fn respond(&mut self, request: &DuaRequest) -> Result<ResponseMessage, TransportError> {
        self.handled.push(request.clone());
        let verdict = self.script.pop_front().unwrap_or(self.default);

        match verdict {
            Verdict::Status(status) => {
                ResponseMessage::changed(&DuaResponse { status, target: request.target })
                    .map_err(|_| TransportError::Failed)
            },
            Verdict::Rejected(code) => Ok(ResponseMessage { code, payload: Bytes::new() }),
            Verdict::Malformed => Ok(ResponseMessage {
                code: ResponseCode::CHANGED,
                payload: Bytes::from_static(&[0xff]),
            }),
            Verdict::Timeout => Err(TransportError::ResponseTimeout),
            Verdict::Failure => Err(TransportError::Failed),
        }
    }
}
