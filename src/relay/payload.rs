//! Opaque message payloads.
//!
//! The relay never looks inside a payload: anything that parses as a JSON
//! object is forwarded as-is to the other participants of the room.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::EncodingError;

/// A schema-agnostic JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Payload(Map<String, Value>);

impl Payload {
    /// Parse a text frame into a payload.
    ///
    /// Valid JSON that is not an object (`[1]`, `"x"`, `null`, ...) is
    /// rejected as well, since the wire format is a key/value mapping.
    pub fn parse(text: &str) -> Result<Self, EncodingError> {
        match serde_json::from_str::<Value>(text)? {
            Value::Object(map) => Ok(Self(map)),
            other => Err(EncodingError::NotAnObject(json_kind(&other))),
        }
    }

    /// Serialize back to the wire representation.
    pub fn to_text(&self) -> String {
        // String keys and JSON values: serialization cannot fail.
        serde_json::to_string(&self.0).unwrap_or_else(|_| String::from("{}"))
    }

    /// Serialize once, for sharing between many recipients.
    pub fn encode(&self) -> EncodedPayload {
        EncodedPayload(self.to_text().into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for Payload {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for Payload {
    type Error = EncodingError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(EncodingError::NotAnObject(json_kind(&other))),
        }
    }
}

/// Wire text of a payload. Clones share the same buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload(Arc<str>);

impl EncodedPayload {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EncodedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Payload> for EncodedPayload {
    fn from(payload: Payload) -> Self {
        payload.encode()
    }
}

impl From<&Payload> for EncodedPayload {
    fn from(payload: &Payload) -> Self {
        payload.encode()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
