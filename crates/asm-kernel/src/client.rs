//! Parameter RPC client.
//!
//! A kernel reads and writes parameters owned by its supervisor by publishing
//! `ParamGetRequest` / `ParamSetRequest` on the uplink and correlating the
//! echoed responses arriving on the downlink.
//!
//! # Flavors
//!
//! - **Blocking** ([`ParameterClient::get_parameter`], [`ParameterClient::set_parameter`]):
//!   wait for the reply up to the configured RPC deadline
//! - **Callback** ([`ParameterClient::get_parameter_async`], [`ParameterClient::set_parameter_async`]):
//!   return immediately; the callback runs on the bus delivery thread
//!
//! Independent requests never block each other: every request has its own
//! pending entry, and replies may arrive in any order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use asm_ipc::{
    handler, Bus, ChannelId, Message, MessageKind, ParamGetRequest, ParamGetResponse, ParamKind,
    ParamSetRequest, ParamSetResponse, ParamValue, Parameter, RequestId, Status,
};
use tracing::{debug, warn};

use crate::error::KernelError;
use crate::pending::PendingTable;

/// Raw reply to a get request, decoded by the caller that knows the kind.
pub(crate) struct GetReply {
    status: Status,
    value: Option<String>,
}

struct ClientInner {
    bus: Arc<dyn Bus>,
    uplink: ChannelId,
    rpc_timeout: Duration,
    next_id: AtomicU64,
    gets: PendingTable<GetReply>,
    sets: PendingTable<Status>,
}

/// Cloneable handle for parameter RPCs to the supervising State.
#[derive(Clone)]
pub struct ParameterClient {
    inner: Arc<ClientInner>,
}

impl ParameterClient {
    pub fn new(bus: Arc<dyn Bus>, uplink: ChannelId, rpc_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                bus,
                uplink,
                rpc_timeout,
                next_id: AtomicU64::new(1),
                gets: PendingTable::new(),
                sets: PendingTable::new(),
            }),
        }
    }

    /// Install the response handlers on `downlink`.
    ///
    /// Must be called once before any request is issued.
    pub fn install(&self, downlink: &ChannelId) -> Result<(), KernelError> {
        let client = self.clone();
        self.inner.bus.install_callback(
            downlink,
            MessageKind::ParamGetResponse,
            handler(move |msg| client.handle_response(msg)),
        )?;
        let client = self.clone();
        self.inner.bus.install_callback(
            downlink,
            MessageKind::ParamSetResponse,
            handler(move |msg| client.handle_response(msg)),
        )?;
        Ok(())
    }

    pub fn rpc_timeout(&self) -> Duration {
        self.inner.rpc_timeout
    }

    /// Number of requests still awaiting a reply.
    pub fn pending_count(&self) -> usize {
        self.inner.gets.len() + self.inner.sets.len()
    }

    /// Read `param` from the supervisor, blocking until the reply arrives.
    ///
    /// # Errors
    ///
    /// - `Rejected` carrying `NO_PARAM`, `BAD_TYPE` or `ERR`
    /// - `Timeout` if no reply arrives within the RPC deadline
    pub fn get_parameter(&self, param: &Parameter) -> Result<ParamValue, KernelError> {
        let inner = &self.inner;
        let request = self.get_request(param);
        let id = request.id;

        let rx = inner.gets.register_waiter(id);
        if let Err(e) = inner.bus.publish(&inner.uplink, Message::ParamGetRequest(request)) {
            inner.gets.cancel(id);
            return Err(e.into());
        }

        match rx.recv_timeout(inner.rpc_timeout) {
            Ok(reply) => decode_get_reply(&param.name, param.kind, reply),
            Err(_) => {
                inner.gets.cancel(id);
                warn!(request_id = %id, name = %param.name, "parameter get timed out");
                Err(self.timeout(format!("get `{}`", param.name)))
            }
        }
    }

    /// Write `param` (which must carry a value), blocking until acknowledged.
    pub fn set_parameter(&self, param: &Parameter) -> Result<(), KernelError> {
        let inner = &self.inner;
        let request = self.set_request(param)?;
        let id = request.id;

        let rx = inner.sets.register_waiter(id);
        if let Err(e) = inner.bus.publish(&inner.uplink, Message::ParamSetRequest(request)) {
            inner.sets.cancel(id);
            return Err(e.into());
        }

        match rx.recv_timeout(inner.rpc_timeout) {
            Ok(Status::Ok) => Ok(()),
            Ok(status) => Err(KernelError::Rejected {
                name: param.name.clone(),
                status,
            }),
            Err(_) => {
                inner.sets.cancel(id);
                warn!(request_id = %id, name = %param.name, "parameter set timed out");
                Err(self.timeout(format!("set `{}`", param.name)))
            }
        }
    }

    /// Read `param` without blocking; `callback` receives the status and,
    /// when OK, the decoded value.
    ///
    /// A reply whose value cannot be decoded as `param.kind` is reported as
    /// `BAD_TYPE` with no value.
    pub fn get_parameter_async<F>(&self, param: &Parameter, callback: F) -> Result<RequestId, KernelError>
    where
        F: FnOnce(Status, Option<ParamValue>) + Send + 'static,
    {
        let inner = &self.inner;
        let request = self.get_request(param);
        let id = request.id;
        let name = param.name.clone();
        let kind = param.kind;

        inner.gets.register_callback(
            id,
            Box::new(move |reply: GetReply| match decode_get_reply(&name, kind, reply) {
                Ok(value) => callback(Status::Ok, Some(value)),
                Err(KernelError::Rejected { status, .. }) => callback(status, None),
                Err(e) => {
                    warn!(name = %name, error = %e, "undecodable parameter reply");
                    callback(Status::BadType, None)
                }
            }),
        );
        if let Err(e) = inner.bus.publish(&inner.uplink, Message::ParamGetRequest(request)) {
            inner.gets.cancel(id);
            return Err(e.into());
        }
        Ok(id)
    }

    /// Write `param` without blocking; `callback` receives the reply status.
    pub fn set_parameter_async<F>(&self, param: &Parameter, callback: F) -> Result<RequestId, KernelError>
    where
        F: FnOnce(Status) + Send + 'static,
    {
        let inner = &self.inner;
        let request = self.set_request(param)?;
        let id = request.id;

        inner.sets.register_callback(id, Box::new(callback));
        if let Err(e) = inner.bus.publish(&inner.uplink, Message::ParamSetRequest(request)) {
            inner.sets.cancel(id);
            return Err(e.into());
        }
        Ok(id)
    }

    /// Route a response to the pending entry it correlates with.
    ///
    /// Responses matching no pending entry (late replies after a timeout,
    /// duplicates) are ignored.
    pub fn handle_response(&self, msg: Message) {
        match msg {
            Message::ParamGetResponse(ParamGetResponse {
                request,
                status,
                value,
            }) => {
                if !self.inner.gets.fulfil(request.id, GetReply { status, value }) {
                    debug!(request_id = %request.id, name = %request.name, "unmatched get response");
                }
            }
            Message::ParamSetResponse(ParamSetResponse { request, status }) => {
                if !self.inner.sets.fulfil(request.id, status) {
                    debug!(request_id = %request.id, name = %request.name, "unmatched set response");
                }
            }
            other => debug!(kind = %other.kind(), "not a parameter response"),
        }
    }

    fn next_id(&self) -> RequestId {
        RequestId(self.inner.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn get_request(&self, param: &Parameter) -> ParamGetRequest {
        ParamGetRequest {
            id: self.next_id(),
            name: param.name.clone(),
            kind: param.kind,
        }
    }

    fn set_request(&self, param: &Parameter) -> Result<ParamSetRequest, KernelError> {
        let value = param
            .encoded_value()
            .ok_or_else(|| KernelError::MissingValue(param.name.clone()))?;
        Ok(ParamSetRequest {
            id: self.next_id(),
            name: param.name.clone(),
            kind: param.kind,
            value,
        })
    }

    fn timeout(&self, what: String) -> KernelError {
        KernelError::Timeout {
            what,
            waited_ms: self.inner.rpc_timeout.as_millis() as u64,
        }
    }
}

fn decode_get_reply(name: &str, kind: ParamKind, reply: GetReply) -> Result<ParamValue, KernelError> {
    if !reply.status.is_ok() {
        return Err(KernelError::Rejected {
            name: name.to_string(),
            status: reply.status,
        });
    }
    let text = reply
        .value
        .ok_or_else(|| KernelError::Protocol(format!("OK reply for `{}` carries no value", name)))?;
    Ok(ParamValue::decode(kind, &text)?)
}
