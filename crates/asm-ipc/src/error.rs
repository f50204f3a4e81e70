//! Error types for the parameter model and the message bus.

use thiserror::Error;

use crate::param::ParamKind;

/// Errors raised while constructing, coercing or decoding parameter values.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ParamError {
    /// Wire token does not name a supported kind
    #[error("unknown parameter kind token `{0}`")]
    UnknownKind(String),

    /// Encoded text is not a valid value of the expected kind
    #[error("cannot decode `{text}` as {kind}")]
    Decode { kind: ParamKind, text: String },

    /// Value cannot be converted to the requested kind
    #[error("cannot coerce {from} value to {to}")]
    Coerce { from: ParamKind, to: ParamKind },
}

/// Errors raised by a message bus implementation.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum BusError {
    /// The bus has been shut down and accepts no more traffic
    #[error("message bus is closed")]
    Closed,

    /// A message could not be serialized or parsed
    #[error("malformed message: {0}")]
    Malformed(String),

    /// Transport-specific delivery failure
    #[error("delivery on channel {channel} failed: {reason}")]
    Delivery { channel: String, reason: String },
}

impl From<serde_json::Error> for BusError {
    fn from(e: serde_json::Error) -> Self {
        BusError::Malformed(e.to_string())
    }
}
