use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Sender identity used when the wire carried none.
pub const UNKNOWN_SENDER: &str = "unknown";

/// The unit of mesh communication.
///
/// A signal is immutable once constructed: handlers receive it by shared
/// reference and produce new signals to send, never mutate a received one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Numeric signal kind. The narrow binary layout carries 0-255; the wide
    /// layout and the JSON family carry the full 16-bit range.
    pub kind: u16,
    /// Identity of the originating process, `"unknown"` when untrusted wire
    /// input carried none.
    pub sender: String,
    /// Open, schema-less JSON object interpreted by handlers.
    pub payload: Value,
    /// Creation time in milliseconds since the Unix epoch. Zero means the
    /// wire envelope carried no timestamp.
    pub timestamp_ms: u64,
}

impl Signal {
    /// Creates a signal with an empty payload, stamped with the current time.
    pub fn new(kind: u16, sender: impl Into<String>) -> Self {
        Self::with_payload(kind, sender, Value::Object(Map::new()))
    }

    /// Creates a signal carrying `payload`, stamped with the current time.
    ///
    /// A non-object payload is replaced with an empty object; the wire
    /// formats only carry JSON objects.
    pub fn with_payload(kind: u16, sender: impl Into<String>, payload: Value) -> Self {
        let payload = match payload {
            Value::Object(map) => Value::Object(map),
            _ => Value::Object(Map::new()),
        };
        Self {
            kind,
            sender: sender.into(),
            payload,
            timestamp_ms: now_ms(),
        }
    }

    /// Returns the payload as an object map (empty for the degenerate case).
    pub fn payload_object(&self) -> Map<String, Value> {
        match &self.payload {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        }
    }
}

/// Transport metadata attached to a received signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalMeta {
    /// Address the datagram was received from.
    pub remote_addr: SocketAddr,
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
