//! Shared frame model and wire codecs for the multiplexed stream.
//!
//! A frame is a tagged union: exactly one field is populated and the field's
//! name is what routes it. The payload stays flexible (`serde_json::Value`)
//! and travels either as a single-key JSON object or as a compact protobuf
//! envelope.
//!
//! The naming convention that ties request, response and notification field
//! names together lives in [`names`].

pub mod names;

use prost::Message;
use serde::de;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

pub use names::{FieldKind, NameError};

/// Key used by oneof-style envelopes to name the active field.
pub const ONEOF_DISCRIMINATOR: &str = "payload";

/// Error returned by the decode functions.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The raw bytes could not be decoded as a protobuf `WireFrame`.
    #[error("failed to decode protobuf frame: {0}")]
    Decode(#[from] prost::DecodeError),
    /// The text could not be parsed as a JSON frame.
    #[error("failed to decode json frame: {0}")]
    Json(#[from] serde_json::Error),
    /// The frame carries no active field name.
    #[error("frame has no active field")]
    EmptyName,
    /// The JSON text is valid but not an object.
    #[error("frame must be a JSON object")]
    NotAnObject,
    /// A plain frame must have exactly one key.
    #[error("expected exactly one active field, found {0}")]
    FieldCount(usize),
    /// A oneof envelope names a field it does not carry.
    #[error("envelope names active field `{0}` but does not carry it")]
    Envelope(String),
    /// The discriminator key cannot itself be a field name.
    #[error("`payload` is reserved and cannot name a frame")]
    ReservedName,
}

/// A single message on the duplex stream.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    /// Name of the active field, e.g. `"getInfoRequest"`.
    pub name: String,
    /// Contents of the active field.
    pub payload: Value,
}

impl Frame {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self { name: name.into(), payload }
    }

    /// Classify the active field by the naming convention.
    #[must_use]
    pub fn kind(&self) -> FieldKind {
        names::classify(&self.name)
    }

    #[must_use]
    pub fn into_parts(self) -> (String, Value) {
        (self.name, self.payload)
    }

    /// Build a frame from a decoded JSON object.
    ///
    /// Accepts the plain tagged form `{"<name>": payload}` and the oneof
    /// envelope form `{"payload": "<name>", "<name>": payload, ...}`.
    fn from_object(mut map: Map<String, Value>) -> Result<Self, CodecError> {
        if map.len() == 1 {
            let Some((name, payload)) = map.into_iter().next() else {
                return Err(CodecError::EmptyName);
            };
            return Self::named(name, payload);
        }

        let Some(name) = map
            .get(ONEOF_DISCRIMINATOR)
            .and_then(Value::as_str)
            .map(ToOwned::to_owned)
        else {
            return Err(CodecError::FieldCount(map.len()));
        };
        let Some(payload) = map.remove(&name) else {
            return Err(CodecError::Envelope(name));
        };
        Self::named(name, payload)
    }

    fn named(name: String, payload: Value) -> Result<Self, CodecError> {
        if name.is_empty() {
            return Err(CodecError::EmptyName);
        }
        if name == ONEOF_DISCRIMINATOR {
            return Err(CodecError::ReservedName);
        }
        Ok(Self { name, payload })
    }
}

impl Serialize for Frame {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.name, &self.payload)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for Frame {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = Map::<String, Value>::deserialize(deserializer)?;
        Self::from_object(map).map_err(de::Error::custom)
    }
}

// =============================================================================
// JSON CODEC
// =============================================================================

/// Encode a frame as a single-key JSON object.
#[must_use]
pub fn encode_json(frame: &Frame) -> String {
    let mut map = Map::with_capacity(1);
    map.insert(frame.name.clone(), frame.payload.clone());
    Value::Object(map).to_string()
}

/// Decode a JSON frame.
///
/// # Errors
///
/// Returns [`CodecError::Json`] for malformed text, [`CodecError::NotAnObject`]
/// for other JSON values, and the field errors when no single active field
/// can be identified.
pub fn decode_json(text: &str) -> Result<Frame, CodecError> {
    let Value::Object(map) = serde_json::from_str::<Value>(text)? else {
        return Err(CodecError::NotAnObject);
    };
    Frame::from_object(map)
}

// =============================================================================
// PROTOBUF CODEC
// =============================================================================

/// Encode a frame into protobuf bytes.
#[must_use]
pub fn encode_frame(frame: &Frame) -> Vec<u8> {
    let wire = WireFrame {
        name: frame.name.clone(),
        payload: Some(json_to_proto_value(&frame.payload)),
    };

    let mut out = Vec::with_capacity(wire.encoded_len());
    // Encoding into a growable Vec cannot run out of buffer.
    wire.encode(&mut out).unwrap_or_default();
    out
}

/// Decode protobuf bytes into a frame.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] for malformed bytes, and
/// [`CodecError::EmptyName`] or [`CodecError::ReservedName`] when the name
/// cannot route.
pub fn decode_frame(bytes: &[u8]) -> Result<Frame, CodecError> {
    let wire = WireFrame::decode(bytes)?;
    let payload = wire
        .payload
        .map_or(Value::Object(Map::new()), |v| proto_to_json_value(&v));
    Frame::named(wire.name, payload)
}

fn json_to_proto_value(value: &Value) -> prost_types::Value {
    let kind = match value {
        Value::Null => {
            prost_types::value::Kind::NullValue(prost_types::NullValue::NullValue as i32)
        }
        Value::Bool(v) => prost_types::value::Kind::BoolValue(*v),
        Value::Number(v) => prost_types::value::Kind::NumberValue(v.as_f64().unwrap_or(0.0)),
        Value::String(v) => prost_types::value::Kind::StringValue(v.clone()),
        Value::Array(v) => prost_types::value::Kind::ListValue(prost_types::ListValue {
            values: v.iter().map(json_to_proto_value).collect(),
        }),
        Value::Object(v) => prost_types::value::Kind::StructValue(prost_types::Struct {
            fields: v
                .iter()
                .map(|(k, v)| (k.clone(), json_to_proto_value(v)))
                .collect(),
        }),
    };

    prost_types::Value { kind: Some(kind) }
}

fn proto_to_json_value(value: &prost_types::Value) -> Value {
    let Some(kind) = &value.kind else {
        return Value::Null;
    };

    match kind {
        prost_types::value::Kind::NullValue(_) => Value::Null,
        prost_types::value::Kind::NumberValue(v) => number_to_json(*v),
        prost_types::value::Kind::StringValue(v) => Value::String(v.clone()),
        prost_types::value::Kind::BoolValue(v) => Value::Bool(*v),
        prost_types::value::Kind::StructValue(v) => Value::Object(
            v.fields
                .iter()
                .map(|(k, v)| (k.clone(), proto_to_json_value(v)))
                .collect(),
        ),
        prost_types::value::Kind::ListValue(v) => {
            Value::Array(v.values.iter().map(proto_to_json_value).collect())
        }
    }
}

/// Protobuf numbers are doubles; integral values come back as JSON integers
/// so payloads compare equal after a round trip.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn number_to_json(v: f64) -> Value {
    if v.fract() == 0.0 && v.abs() < 9_007_199_254_740_992.0 {
        return Value::from(v as i64);
    }
    serde_json::Number::from_f64(v).map_or(Value::Null, Value::Number)
}

#[derive(Clone, PartialEq, Message)]
struct WireFrame {
    #[prost(string, tag = "1")]
    name: String,
    #[prost(message, optional, tag = "2")]
    payload: Option<prost_types::Value>,
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
