//! Compiled JSON Schemas for the envelope and every payload type

use crate::message::MessageType;
use jsonschema::JSONSchema;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::HashMap;

const ENVELOPE_SCHEMA_SRC: &str = include_str!("../schemas/envelope.schema.json");
const PAYLOAD_SCHEMAS_SRC: &str = include_str!("../schemas/payloads.schema.json");

static ENVELOPE_SCHEMA: Lazy<JSONSchema> = Lazy::new(|| {
    let raw: Value =
        serde_json::from_str(ENVELOPE_SCHEMA_SRC).expect("envelope schema is valid JSON");
    JSONSchema::compile(&raw).expect("envelope schema compiles")
});

static PAYLOAD_SCHEMAS: Lazy<HashMap<MessageType, JSONSchema>> = Lazy::new(|| {
    let raw: Value =
        serde_json::from_str(PAYLOAD_SCHEMAS_SRC).expect("payload schemas are valid JSON");
    MessageType::ALL
        .iter()
        .map(|kind| {
            let schema = JSONSchema::compile(&raw[kind.as_str()])
                .expect("payload schema compiles for every message type");
            (*kind, schema)
        })
        .collect()
});

/// Violations of the envelope schema, as `path: message` lines
#[must_use]
pub fn envelope_violations(value: &Value) -> Vec<String> {
    collect(&ENVELOPE_SCHEMA, value, "")
}

/// Violations of the payload schema for `kind`, paths prefixed with `/payload`
#[must_use]
pub fn payload_violations(kind: MessageType, payload: &Value) -> Vec<String> {
    match PAYLOAD_SCHEMAS.get(&kind) {
        Some(schema) => collect(schema, payload, "/payload"),
        None => vec![format!("/payload: no schema for {kind}")],
    }
}

fn collect(schema: &JSONSchema, value: &Value, prefix: &str) -> Vec<String> {
    match schema.validate(value) {
        Ok(()) => Vec::new(),
        Err(errors) => errors
            .map(|err| {
                let path = format!("{prefix}{}", err.instance_path);
                let path = if path.is_empty() { "/".to_string() } else { path };
                format!("{path}: {err}")
            })
            .collect(),
    }
}
