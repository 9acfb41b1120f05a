//! JSON encode/decode with the two-stage schema check
//!
//! Decode runs the envelope schema first, then the schema for the declared
//! type, so a failure is attributed to exactly one [`ErrorClass`].

use crate::envelope::{Envelope, PROTOCOL_VERSION};
use crate::error::{CodecError, ErrorClass};
use crate::message::{Message, MessageType};
use crate::schema;
use serde_json::{Map, Value};

/// Decode and validate one envelope from text
pub fn decode(text: &str) -> Result<Envelope, CodecError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| CodecError::InvalidJson(e.to_string()))?;
    decode_value(value)
}

/// Decode and validate one envelope from a parsed value
pub fn decode_value(value: Value) -> Result<Envelope, CodecError> {
    let violations = schema::envelope_violations(&value);
    if !violations.is_empty() {
        return Err(CodecError::EnvelopeSchema {
            id: value.get("id").and_then(Value::as_str).map(str::to_string),
            details: violations,
        });
    }

    let Value::Object(mut map) = value else {
        return Err(CodecError::EnvelopeSchema {
            id: None,
            details: vec!["/: envelope must be an object".to_string()],
        });
    };

    let id = string_field(&map, "id")?;
    let message_type = string_field(&map, "type")?
        .parse::<MessageType>()
        .map_err(|e| CodecError::EnvelopeSchema {
            id: Some(id.clone()),
            details: vec![format!("/type: {e}")],
        })?;
    let ts = map.get("ts").and_then(Value::as_i64).unwrap_or_default();
    let version = map.get("v").and_then(Value::as_u64).unwrap_or_default();

    let v = u32::try_from(version)
        .ok()
        .filter(|v| *v <= PROTOCOL_VERSION)
        .ok_or_else(|| CodecError::UnsupportedVersion {
            id: id.clone(),
            message_type,
            version,
            supported: PROTOCOL_VERSION,
        })?;

    let payload = map.remove("payload").unwrap_or(Value::Null);
    let violations = schema::payload_violations(message_type, &payload);
    if !violations.is_empty() {
        return Err(CodecError::Payload {
            id,
            message_type,
            details: violations,
        });
    }

    let message = Message::from_parts(message_type, payload).map_err(|e| CodecError::Payload {
        id: id.clone(),
        message_type,
        details: vec![format!("/payload: {e}")],
    })?;

    Ok(Envelope {
        id,
        ts,
        v,
        message,
    })
}

/// Encode an envelope to a JSON value
pub fn to_value(envelope: &Envelope) -> Result<Value, CodecError> {
    let payload = envelope
        .message
        .payload_value()
        .map_err(|e| CodecError::Encode(e.to_string()))?;
    let mut map = Map::new();
    map.insert(
        "type".to_string(),
        Value::String(envelope.message_type().as_str().to_string()),
    );
    map.insert("id".to_string(), Value::String(envelope.id.clone()));
    map.insert("ts".to_string(), Value::from(envelope.ts));
    map.insert("v".to_string(), Value::from(envelope.v));
    map.insert("payload".to_string(), payload);
    Ok(Value::Object(map))
}

/// Encode an envelope to JSON text
pub fn encode(envelope: &Envelope) -> Result<String, CodecError> {
    let value = to_value(envelope)?;
    serde_json::to_string(&value).map_err(|e| CodecError::Encode(e.to_string()))
}

/// Error class of `text`, or `None` when it decodes cleanly
#[must_use]
pub fn classify(text: &str) -> Option<ErrorClass> {
    decode(text).err().map(|e| e.class())
}

fn string_field(map: &Map<String, Value>, key: &str) -> Result<String, CodecError> {
    map.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| CodecError::EnvelopeSchema {
            id: map.get("id").and_then(Value::as_str).map(str::to_string),
            details: vec![format!("/{key}: missing string")],
        })
}
