//! Fixed 12-byte binary framing.
//!
//! Header layout (big-endian), narrow `U8` type field:
//!
//! ```text
//! byte 0      signal kind (u8)
//! byte 1      version major
//! byte 2      version minor
//! byte 3      reserved (0)
//! bytes 4-7   payload length (u32)
//! bytes 8-11  Unix timestamp, seconds (u32)
//! ```
//!
//! One server generation widened the kind to a u16 occupying bytes 0-1,
//! displacing the reserved byte. Both layouts are 12 bytes with the length
//! and timestamp words at the same offsets, so they cannot be told apart by
//! inspection; which one a deployment speaks is configuration.
//!
//! The header carries no sender field. The encoder smuggles the sender
//! inside the JSON payload under the reserved `"sender"` key and the
//! decoder extracts and removes it, defaulting to `"unknown"`.

use serde_json::Value;

use interlock_core::{Signal, UNKNOWN_SENDER};

use crate::error::CodecError;

/// Fixed binary header length in bytes.
pub const HEADER_LEN: usize = 12;
/// Protocol version carried in the header.
pub const VERSION_MAJOR: u8 = 1;
pub const VERSION_MINOR: u8 = 0;

/// Payload key reserved for the smuggled sender identity.
const SENDER_KEY: &str = "sender";

/// Width of the kind field in the binary header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeWidth {
    /// Narrow layout: 1-byte kind plus a reserved byte.
    #[default]
    U8,
    /// Wide layout: 2-byte big-endian kind, no reserved byte.
    U16,
}

/// Encodes a signal with the 12-byte binary header.
///
/// Never fails for a well-formed signal under the wide layout; the narrow
/// layout rejects kinds above 255.
pub fn encode_binary(signal: &Signal, width: TypeWidth) -> Result<Vec<u8>, CodecError> {
    if width == TypeWidth::U8 && signal.kind > u8::MAX as u16 {
        return Err(CodecError::KindOutOfRange(signal.kind));
    }

    let mut payload = signal.payload_object();
    if signal.sender != UNKNOWN_SENDER {
        payload.insert(SENDER_KEY.to_string(), Value::from(signal.sender.clone()));
    }
    let payload_bytes = serde_json::to_vec(&Value::Object(payload))
        .map_err(|e| CodecError::InvalidJson(e.to_string()))?;

    let mut buf = Vec::with_capacity(HEADER_LEN + payload_bytes.len());
    match width {
        TypeWidth::U8 => {
            buf.push(signal.kind as u8);
            buf.push(VERSION_MAJOR);
            buf.push(VERSION_MINOR);
            buf.push(0);
        }
        TypeWidth::U16 => {
            buf.extend_from_slice(&signal.kind.to_be_bytes());
            buf.push(VERSION_MAJOR);
            buf.push(VERSION_MINOR);
        }
    }
    buf.extend_from_slice(&(payload_bytes.len() as u32).to_be_bytes());
    buf.extend_from_slice(&((signal.timestamp_ms / 1000) as u32).to_be_bytes());
    buf.extend_from_slice(&payload_bytes);
    Ok(buf)
}

/// Decodes a binary-framed datagram.
///
/// Validation: buffer at least 12 bytes, declared payload length equal to
/// the remaining buffer, payload parses as a JSON object. Timestamps are
/// normalized from seconds to milliseconds on ingestion.
pub fn decode_binary(bytes: &[u8], width: TypeWidth) -> Result<Signal, CodecError> {
    if bytes.len() < HEADER_LEN {
        return Err(CodecError::TruncatedHeader(bytes.len()));
    }

    let declared = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
    let actual = bytes.len() - HEADER_LEN;
    if declared != actual {
        return Err(CodecError::LengthMismatch { declared, actual });
    }

    let kind = match width {
        TypeWidth::U8 => bytes[0] as u16,
        TypeWidth::U16 => u16::from_be_bytes([bytes[0], bytes[1]]),
    };
    let timestamp_s = u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);

    let payload: Value = serde_json::from_slice(&bytes[HEADER_LEN..])
        .map_err(|e| CodecError::InvalidJson(e.to_string()))?;
    let Value::Object(mut payload) = payload else {
        return Err(CodecError::InvalidJson("payload is not an object".into()));
    };

    let sender = match payload.remove(SENDER_KEY) {
        Some(Value::String(sender)) => sender,
        _ => UNKNOWN_SENDER.to_string(),
    };

    Ok(Signal {
        kind,
        sender,
        payload: Value::Object(payload),
        timestamp_ms: timestamp_s as u64 * 1000,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use interlock_core::{Signal, UNKNOWN_SENDER};

    use super::{decode_binary, encode_binary, CodecError, TypeWidth, HEADER_LEN};

    fn sample_signal(kind: u16) -> Signal {
        Signal {
            kind,
            sender: "newsdesk".to_string(),
            payload: json!({"article": 7, "bias": "left"}),
            timestamp_ms: 1_717_171_000_000,
        }
    }

    #[test]
    fn narrow_round_trip_preserves_kind_sender_payload() {
        let signal = sample_signal(0x04);
        let bytes = encode_binary(&signal, TypeWidth::U8).expect("encode should succeed");
        let decoded = decode_binary(&bytes, TypeWidth::U8).expect("decode should succeed");

        assert_eq!(decoded.kind, signal.kind);
        assert_eq!(decoded.sender, signal.sender);
        assert_eq!(decoded.payload, signal.payload);
        // One-second wire resolution.
        assert_eq!(decoded.timestamp_ms, 1_717_171_000_000);
    }

    #[test]
    fn wide_round_trip_carries_16_bit_kinds() {
        let signal = sample_signal(0x1A2B);
        let bytes = encode_binary(&signal, TypeWidth::U16).expect("encode should succeed");
        let decoded = decode_binary(&bytes, TypeWidth::U16).expect("decode should succeed");
        assert_eq!(decoded.kind, 0x1A2B);
        assert_eq!(decoded.sender, "newsdesk");
    }

    #[test]
    fn narrow_encode_rejects_wide_kinds() {
        let err = encode_binary(&sample_signal(0x1A2B), TypeWidth::U8)
            .expect_err("kind over 255 should be rejected");
        assert!(matches!(err, CodecError::KindOutOfRange(0x1A2B)));
    }

    #[test]
    fn unknown_sender_is_not_smuggled_and_defaults_back() {
        let mut signal = sample_signal(0x01);
        signal.sender = UNKNOWN_SENDER.to_string();
        let bytes = encode_binary(&signal, TypeWidth::U8).expect("encode should succeed");
        let decoded = decode_binary(&bytes, TypeWidth::U8).expect("decode should succeed");
        assert_eq!(decoded.sender, UNKNOWN_SENDER);
        assert_eq!(decoded.payload, signal.payload);
    }

    #[test]
    fn truncated_header_fails_fast() {
        let err = decode_binary(&[0u8; HEADER_LEN - 1], TypeWidth::U8)
            .expect_err("11 bytes should fail");
        assert!(matches!(err, CodecError::TruncatedHeader(11)));
    }

    #[test]
    fn declared_length_must_match_remaining_bytes() {
        let mut bytes = encode_binary(&sample_signal(0x02), TypeWidth::U8).unwrap();
        // Claim a payload larger than what follows.
        bytes[4..8].copy_from_slice(&u32::MAX.to_be_bytes());
        let err = decode_binary(&bytes, TypeWidth::U8).expect_err("mismatch should fail");
        assert!(matches!(err, CodecError::LengthMismatch { .. }));
    }

    #[test]
    fn non_json_payload_is_rejected() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&[0x01, 1, 0, 0]);
        bytes.extend_from_slice(&4u32.to_be_bytes());
        bytes.extend_from_slice(&0u32.to_be_bytes());
        bytes.extend_from_slice(b"\xff\xfe\x00\x01");
        let err = decode_binary(&bytes, TypeWidth::U8).expect_err("binary junk should fail");
        assert!(matches!(err, CodecError::InvalidJson(_)));
    }

    #[test]
    fn non_object_json_payload_is_rejected() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&[0x01, 1, 0, 0]);
        bytes.extend_from_slice(&2u32.to_be_bytes());
        bytes.extend_from_slice(&0u32.to_be_bytes());
        bytes.extend_from_slice(b"42");
        let err = decode_binary(&bytes, TypeWidth::U8).expect_err("scalar payload should fail");
        assert!(matches!(err, CodecError::InvalidJson(_)));
    }
}
