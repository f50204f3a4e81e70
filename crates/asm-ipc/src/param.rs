//! Parameter model
//!
//! A [`Parameter`] is the unit of cross-process configuration exchange: a name,
//! a declared [`ParamKind`], and optionally a value of that kind. Values travel
//! over the bus as strings; the receiving side decodes them using the kind
//! carried next to them in the request.
//!
//! # Wire Encoding
//!
//! | Kind   | Token      | Value text                         |
//! |--------|------------|------------------------------------|
//! | Int    | `"int"`    | decimal `i64`                      |
//! | Float  | `"float"`  | shortest round-trip `f64`          |
//! | Str    | `"string"` | verbatim                           |
//! | Bool   | `"bool"`   | `true` / `false`                   |
//!
//! [`ParamValue::encode`] and [`ParamValue::decode`] are exact inverses.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ParamError;

/// Supported parameter kinds.
///
/// The serialized form of each variant is its wire token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ParamKind {
    #[serde(rename = "int")]
    Int,
    #[serde(rename = "float")]
    Float,
    #[serde(rename = "string")]
    Str,
    #[serde(rename = "bool")]
    Bool,
}

impl ParamKind {
    /// All supported kinds, in token order.
    pub const ALL: [ParamKind; 4] = [ParamKind::Int, ParamKind::Float, ParamKind::Str, ParamKind::Bool];

    /// Wire token for this kind.
    pub fn token(&self) -> &'static str {
        match self {
            ParamKind::Int => "int",
            ParamKind::Float => "float",
            ParamKind::Str => "string",
            ParamKind::Bool => "bool",
        }
    }

    /// Parse a wire token.
    pub fn from_token(token: &str) -> Result<Self, ParamError> {
        match token {
            "int" => Ok(ParamKind::Int),
            "float" => Ok(ParamKind::Float),
            "string" => Ok(ParamKind::Str),
            "bool" => Ok(ParamKind::Bool),
            other => Err(ParamError::UnknownKind(other.to_string())),
        }
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// A native parameter value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

impl ParamValue {
    /// Runtime kind of this value.
    pub fn kind(&self) -> ParamKind {
        match self {
            ParamValue::Int(_) => ParamKind::Int,
            ParamValue::Float(_) => ParamKind::Float,
            ParamValue::Str(_) => ParamKind::Str,
            ParamValue::Bool(_) => ParamKind::Bool,
        }
    }

    /// Encode to wire text.
    pub fn encode(&self) -> String {
        match self {
            ParamValue::Int(v) => v.to_string(),
            ParamValue::Float(v) => v.to_string(),
            ParamValue::Str(v) => v.clone(),
            ParamValue::Bool(v) => v.to_string(),
        }
    }

    /// Decode wire text as a value of `kind`.
    pub fn decode(kind: ParamKind, text: &str) -> Result<Self, ParamError> {
        let decode_err = || ParamError::Decode {
            kind,
            text: text.to_string(),
        };
        match kind {
            ParamKind::Int => text.parse::<i64>().map(ParamValue::Int).map_err(|_| decode_err()),
            ParamKind::Float => text
                .parse::<f64>()
                .map(ParamValue::Float)
                .map_err(|_| decode_err()),
            ParamKind::Str => Ok(ParamValue::Str(text.to_string())),
            ParamKind::Bool => match text {
                "true" => Ok(ParamValue::Bool(true)),
                "false" => Ok(ParamValue::Bool(false)),
                _ => Err(decode_err()),
            },
        }
    }

    /// Convert this value to `kind`.
    ///
    /// Numeric and boolean kinds convert between each other where no
    /// information is lost (`Float → Int` only for integral values). Every kind
    /// converts to `Str` through its wire encoding, and `Str` converts to any
    /// kind by decoding.
    pub fn coerce(self, kind: ParamKind) -> Result<Self, ParamError> {
        let from = self.kind();
        if from == kind {
            return Ok(self);
        }
        let coerce_err = ParamError::Coerce { from, to: kind };
        match (self, kind) {
            (value, ParamKind::Str) => Ok(ParamValue::Str(value.encode())),
            (ParamValue::Str(text), kind) => ParamValue::decode(kind, &text),
            (ParamValue::Int(v), ParamKind::Float) => Ok(ParamValue::Float(v as f64)),
            (ParamValue::Int(v), ParamKind::Bool) => Ok(ParamValue::Bool(v != 0)),
            (ParamValue::Float(v), ParamKind::Int) => {
                if v.is_finite() && v.fract() == 0.0 && v >= i64::MIN as f64 && v < i64::MAX as f64 {
                    Ok(ParamValue::Int(v as i64))
                } else {
                    Err(coerce_err)
                }
            }
            (ParamValue::Float(v), ParamKind::Bool) => Ok(ParamValue::Bool(v != 0.0)),
            (ParamValue::Bool(v), ParamKind::Int) => Ok(ParamValue::Int(i64::from(v))),
            (ParamValue::Bool(v), ParamKind::Float) => Ok(ParamValue::Float(if v { 1.0 } else { 0.0 })),
            _ => Err(coerce_err),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParamValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Int(i64::from(v))
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Str(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Str(v.to_string())
    }
}

/// A named, typed value used for cross-process parameter access.
///
/// # Invariants
///
/// - If `value` is `Some`, its kind equals `kind` (enforced by the constructors)
#[derive(Clone, Debug, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub kind: ParamKind,
    pub value: Option<ParamValue>,
}

impl Parameter {
    /// Create a parameter without a value (e.g. for a remote read).
    pub fn new(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            value: None,
        }
    }

    /// Create a parameter carrying `value`, coerced to `kind`.
    pub fn with_value(
        name: impl Into<String>,
        kind: ParamKind,
        value: impl Into<ParamValue>,
    ) -> Result<Self, ParamError> {
        let value = value.into().coerce(kind)?;
        Ok(Self {
            name: name.into(),
            kind,
            value: Some(value),
        })
    }

    /// Wire text of the carried value, if any.
    pub fn encoded_value(&self) -> Option<String> {
        self.value.as_ref().map(ParamValue::encode)
    }
}
