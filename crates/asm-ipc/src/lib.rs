//! Wire Protocol & Parameter Model for the ASM orchestrator
//!
//! This crate defines:
//! - **Parameters** (typed, named values exchanged between processes)
//! - **Messages** (State ↔ Kernel handshake and parameter RPC)
//! - **Channels** (deterministic addressing of one State/Kernel pair)
//! - **Bus** (the publish / install-callback seam, plus an in-memory bus)
//!
//! It is the **single source of truth** for everything that crosses the
//! process boundary, so both ends of a channel encode and decode the same way.
//!
//! # Message Kinds
//!
//! | Message          | Direction      | Fields                         |
//! |------------------|----------------|--------------------------------|
//! | ScheduleRequest  | State → Kernel | cycle                          |
//! | ScheduleResponse | Kernel → State | status, request (echo)         |
//! | Yield            | Kernel → State | cycle                          |
//! | ParamGetRequest  | Kernel → State | id, name, kind                 |
//! | ParamGetResponse | State → Kernel | request (echo), status, value  |
//! | ParamSetRequest  | Kernel → State | id, name, kind, value          |
//! | ParamSetResponse | State → Kernel | request (echo), status         |
//!
//! # Usage
//!
//! ```rust
//! use asm_ipc::{ChannelId, Parameter, ParamKind};
//!
//! // Addressing for the "idle" state of layer "robot"
//! let downlink = ChannelId::downlink("robot", "idle");
//! assert_eq!(downlink.consumer, "asm://robot/idle/kernel");
//!
//! // A parameter a Kernel wants to read from its supervisor
//! let speed = Parameter::new("speed", ParamKind::Float);
//! assert!(speed.value.is_none());
//! ```

pub mod bus;
pub mod channel;
pub mod error;
pub mod local;
pub mod message;
pub mod param;

pub use bus::{handler, Bus, Handler};
pub use channel::ChannelId;
pub use error::{BusError, ParamError};
pub use local::LocalBus;
pub use message::{
    Message, MessageKind, ParamGetRequest, ParamGetResponse, ParamSetRequest, ParamSetResponse,
    RequestId, ScheduleRequest, ScheduleResponse, Status, Yield,
};
pub use param::{ParamKind, ParamValue, Parameter};
