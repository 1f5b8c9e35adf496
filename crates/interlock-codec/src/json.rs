//! Flat JSON framing family.
//!
//! Three envelope shapes circulate on deployed meshes and all must decode:
//!
//! - short keys: `{"t": 4, "s": "brief", "d": {...}, "ts": 1717171000000}`
//! - long keys: `{"type": 4, "source": "brief", "payload": {...},
//!   "timestamp": 1717171000000}`
//! - flat: a payload object carrying a numeric `type`/`t` plus an embedded
//!   `sender` or `serverId` identity, with every remaining key forming the
//!   payload.
//!
//! Outbound traffic always uses the short-key shape. Timestamps are carried
//! in milliseconds; an envelope without one decodes as `timestamp_ms = 0`.

use serde_json::{Map, Value};

use interlock_core::{Signal, UNKNOWN_SENDER};

use crate::error::CodecError;

/// Keys that mark an envelope rather than payload data in the flat shape.
const ENVELOPE_KEYS: [&str; 8] = [
    "t",
    "type",
    "s",
    "source",
    "sender",
    "serverId",
    "ts",
    "timestamp",
];

/// Encodes a signal as a short-key JSON envelope.
pub fn encode_json(signal: &Signal) -> Result<Vec<u8>, CodecError> {
    let mut envelope = Map::new();
    envelope.insert("t".into(), Value::from(signal.kind));
    envelope.insert("s".into(), Value::from(signal.sender.clone()));
    envelope.insert("d".into(), Value::Object(signal.payload_object()));
    envelope.insert("ts".into(), Value::from(signal.timestamp_ms));
    serde_json::to_vec(&Value::Object(envelope)).map_err(|e| CodecError::InvalidJson(e.to_string()))
}

/// Decodes any of the three JSON envelope shapes.
pub fn decode_json(bytes: &[u8]) -> Result<Signal, CodecError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| CodecError::InvalidJson(e.to_string()))?;
    let Value::Object(object) = value else {
        return Err(CodecError::UnrecognizedShape);
    };

    let kind = object
        .get("t")
        .or_else(|| object.get("type"))
        .and_then(as_kind)
        .ok_or(CodecError::UnrecognizedShape)?;
    let timestamp_ms = object
        .get("ts")
        .or_else(|| object.get("timestamp"))
        .and_then(Value::as_u64)
        .unwrap_or(0);

    // Envelope shapes carry their payload behind a dedicated key.
    if let Some(payload) = object.get("d").or_else(|| object.get("payload")) {
        let payload = match payload {
            Value::Object(map) => Value::Object(map.clone()),
            _ => Value::Object(Map::new()),
        };
        return Ok(Signal {
            kind,
            sender: embedded_sender(&object).unwrap_or_else(|| UNKNOWN_SENDER.to_string()),
            payload,
            timestamp_ms,
        });
    }

    // Short/long envelope without a payload key still counts.
    if let Some(sender) = envelope_sender(&object) {
        return Ok(Signal {
            kind,
            sender,
            payload: Value::Object(Map::new()),
            timestamp_ms,
        });
    }

    // Flat shape: recognized by the embedded identity field; every
    // non-envelope key is payload data.
    if let Some(sender) = flat_sender(&object) {
        let payload: Map<String, Value> = object
            .into_iter()
            .filter(|(key, _)| !ENVELOPE_KEYS.contains(&key.as_str()))
            .collect();
        return Ok(Signal {
            kind,
            sender,
            payload: Value::Object(payload),
            timestamp_ms,
        });
    }

    // A kind with a timestamp or sender slot is an envelope with defaults;
    // a bare numeric kind alone is not a recognizable shape.
    if object.contains_key("ts") || object.contains_key("timestamp") {
        return Ok(Signal {
            kind,
            sender: UNKNOWN_SENDER.to_string(),
            payload: Value::Object(Map::new()),
            timestamp_ms,
        });
    }

    Err(CodecError::UnrecognizedShape)
}

fn as_kind(value: &Value) -> Option<u16> {
    value.as_u64().and_then(|v| u16::try_from(v).ok())
}

fn embedded_sender(object: &Map<String, Value>) -> Option<String> {
    envelope_sender(object).or_else(|| flat_sender(object))
}

fn envelope_sender(object: &Map<String, Value>) -> Option<String> {
    sender_from_keys(object, &["s", "source"])
}

fn flat_sender(object: &Map<String, Value>) -> Option<String> {
    sender_from_keys(object, &["sender", "serverId"])
}

fn sender_from_keys(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| object.get(*key))
        .and_then(Value::as_str)
        .map(str::to_string)
}
