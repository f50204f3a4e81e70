//! Parameter RPC service of a State.
//!
//! Runs on the bus delivery thread of the State's uplink. Every request gets
//! a status reply on the downlink; when the delegate itself fails, the failure
//! is also recorded as a [`StateFault`] so the supervisor observes it without
//! the remote caller's reply being withheld.

use std::sync::Arc;

use asm_ipc::{
    Bus, ChannelId, Message, ParamGetRequest, ParamGetResponse, ParamSetRequest, ParamSetResponse,
    ParamValue, RequestId, Status,
};
use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::delegate::ParameterDelegate;
use crate::error::DelegateError;

/// A delegate failure raised while serving a kernel request.
#[derive(Clone, Debug, PartialEq)]
pub struct StateFault {
    pub request: RequestId,
    pub parameter: String,
    /// Status the kernel was answered with
    pub status: Status,
    pub error: DelegateError,
}

/// Fault log shared between a State and its handlers.
pub(crate) type FaultLog = Arc<Mutex<Vec<StateFault>>>;

#[derive(Clone)]
pub(crate) struct ParamServer {
    pub state: String,
    pub bus: Arc<dyn Bus>,
    pub downlink: ChannelId,
    pub delegate: Arc<dyn ParameterDelegate>,
    pub faults: FaultLog,
}

impl ParamServer {
    pub fn handle(&self, msg: Message) {
        let reply = match msg {
            Message::ParamGetRequest(request) => Message::ParamGetResponse(self.serve_get(request)),
            Message::ParamSetRequest(request) => Message::ParamSetResponse(self.serve_set(request)),
            other => {
                debug!(state = %self.state, kind = %other.kind(), "not a parameter request");
                return;
            }
        };
        if let Err(e) = self.bus.publish(&self.downlink, reply) {
            warn!(state = %self.state, error = %e, "cannot answer parameter request");
        }
    }

    fn serve_get(&self, request: ParamGetRequest) -> ParamGetResponse {
        match self.delegate.get_parameter_value(&request.name) {
            Ok(value) if value.kind() != request.kind => {
                debug!(
                    state = %self.state,
                    name = %request.name,
                    requested = %request.kind,
                    actual = %value.kind(),
                    "parameter kind mismatch"
                );
                ParamGetResponse {
                    request,
                    status: Status::BadType,
                    value: None,
                }
            }
            Ok(value) => ParamGetResponse {
                value: Some(value.encode()),
                request,
                status: Status::Ok,
            },
            Err(e) => {
                let status = self.fault(request.id, &request.name, e.status(), e);
                ParamGetResponse {
                    request,
                    status,
                    value: None,
                }
            }
        }
    }

    fn serve_set(&self, request: ParamSetRequest) -> ParamSetResponse {
        let value = match ParamValue::decode(request.kind, &request.value) {
            Ok(value) => value,
            Err(e) => {
                // Undecodable as the declared kind is a type error.
                let error = DelegateError::Other(e.to_string());
                let status = self.fault(request.id, &request.name, Status::BadType, error);
                return ParamSetResponse { request, status };
            }
        };
        let status = match self.delegate.set_parameter_value(&request.name, value) {
            Ok(()) => Status::Ok,
            Err(e) => self.fault(request.id, &request.name, e.status(), e),
        };
        ParamSetResponse { request, status }
    }

    /// Record a failure; returns `status` for the reply.
    fn fault(&self, request: RequestId, name: &str, status: Status, error: DelegateError) -> Status {
        error!(
            state = %self.state,
            request_id = %request,
            name,
            status = %status,
            error = %error,
            "parameter request failed"
        );
        self.faults.lock().push(StateFault {
            request,
            parameter: name.to_string(),
            status,
            error,
        });
        status
    }
}
