//! Wire messages exchanged between a State and its paired Kernel.
//!
//! Every RPC request carries a [`RequestId`] generated by the requester; the
//! response echoes the whole request so the requester can correlate it with
//! the pending entry it registered. Handshake messages carry a `cycle` number
//! so duplicates produced by re-publishing can be told apart from fresh ones.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::BusError;
use crate::param::ParamKind;

/// Correlation key for parameter RPCs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// Result status carried by every response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "ERR")]
    Err,
    /// Name unknown to the delegate
    #[serde(rename = "NO_PARAM")]
    NoParam,
    /// Delegate's value type does not match the requested kind
    #[serde(rename = "BAD_TYPE")]
    BadType,
}

impl Status {
    pub fn is_ok(&self) -> bool {
        matches!(self, Status::Ok)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Err => "ERR",
            Status::NoParam => "NO_PARAM",
            Status::BadType => "BAD_TYPE",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// State → Kernel: hand execution to the Kernel for one cycle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRequest {
    pub cycle: u64,
}

/// Kernel → State: activation acknowledged.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleResponse {
    pub status: Status,
    pub request: ScheduleRequest,
}

/// Kernel → State: workload cycle finished, control handed back.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Yield {
    pub cycle: u64,
}

/// Kernel → State: read a parameter from the supervisor's delegate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamGetRequest {
    pub id: RequestId,
    pub name: String,
    pub kind: ParamKind,
}

/// State → Kernel: result of a [`ParamGetRequest`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamGetResponse {
    pub request: ParamGetRequest,
    pub status: Status,
    /// Wire-encoded value, present only when `status` is OK
    pub value: Option<String>,
}

/// Kernel → State: write a parameter through the supervisor's delegate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSetRequest {
    pub id: RequestId,
    pub name: String,
    pub kind: ParamKind,
    /// Wire-encoded value
    pub value: String,
}

/// State → Kernel: result of a [`ParamSetRequest`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSetResponse {
    pub request: ParamSetRequest,
    pub status: Status,
}

/// Discriminant used to route messages to installed handlers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MessageKind {
    ScheduleRequest,
    ScheduleResponse,
    Yield,
    ParamGetRequest,
    ParamGetResponse,
    ParamSetRequest,
    ParamSetResponse,
}

impl MessageKind {
    pub fn name(&self) -> &'static str {
        match self {
            MessageKind::ScheduleRequest => "ScheduleRequest",
            MessageKind::ScheduleResponse => "ScheduleResponse",
            MessageKind::Yield => "Yield",
            MessageKind::ParamGetRequest => "ParamGetRequest",
            MessageKind::ParamGetResponse => "ParamGetResponse",
            MessageKind::ParamSetRequest => "ParamSetRequest",
            MessageKind::ParamSetResponse => "ParamSetResponse",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Any message that can travel on a State/Kernel channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body")]
pub enum Message {
    ScheduleRequest(ScheduleRequest),
    ScheduleResponse(ScheduleResponse),
    Yield(Yield),
    ParamGetRequest(ParamGetRequest),
    ParamGetResponse(ParamGetResponse),
    ParamSetRequest(ParamSetRequest),
    ParamSetResponse(ParamSetResponse),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::ScheduleRequest(_) => MessageKind::ScheduleRequest,
            Message::ScheduleResponse(_) => MessageKind::ScheduleResponse,
            Message::Yield(_) => MessageKind::Yield,
            Message::ParamGetRequest(_) => MessageKind::ParamGetRequest,
            Message::ParamGetResponse(_) => MessageKind::ParamGetResponse,
            Message::ParamSetRequest(_) => MessageKind::ParamSetRequest,
            Message::ParamSetResponse(_) => MessageKind::ParamSetResponse,
        }
    }

    /// Serialize to JSON bytes for transports that carry raw payloads.
    pub fn to_bytes(&self) -> Result<Vec<u8>, BusError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse JSON bytes produced by [`Message::to_bytes`].
    pub fn from_bytes(data: &[u8]) -> Result<Self, BusError> {
        Ok(serde_json::from_slice(data)?)
    }
}
