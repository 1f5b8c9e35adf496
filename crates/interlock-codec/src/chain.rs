//! Ordered framing strategies for decode.
//!
//! Rather than one canonical format, decode runs an ordered list of framing
//! attempts until one succeeds, which keeps the node interoperable with
//! every deployed peer generation at once. Binary framing is always tried
//! before JSON.
//!
//! The two binary layouts are indistinguishable on the wire (same length
//! and timestamp offsets), so a chain holds exactly one of them: the
//! default chain speaks the narrow u8-kind layout, `wide_binary_first`
//! builds a chain for deployments on the u16-kind layout.

use interlock_core::Signal;

use crate::binary::{decode_binary, encode_binary, TypeWidth};
use crate::error::CodecError;
use crate::json::{decode_json, encode_json};

/// One wire framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    /// 12-byte binary header plus JSON payload.
    Binary(TypeWidth),
    /// Flat JSON envelope.
    Json,
}

/// Ordered list of framings tried in sequence on receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeChain {
    framings: Vec<Framing>,
}

impl Default for DecodeChain {
    fn default() -> Self {
        Self::new(vec![Framing::Binary(TypeWidth::U8), Framing::Json])
    }
}

impl DecodeChain {
    /// Builds a chain from an explicit framing order.
    pub fn new(framings: Vec<Framing>) -> Self {
        Self { framings }
    }

    /// Chain for deployments speaking the wide u16-kind binary layout.
    pub fn wide_binary_first() -> Self {
        Self::new(vec![Framing::Binary(TypeWidth::U16), Framing::Json])
    }

    /// Framings in attempt order.
    pub fn framings(&self) -> &[Framing] {
        &self.framings
    }

    /// Decodes a datagram through the chain.
    ///
    /// Returns the first successful decode; if every framing rejects the
    /// buffer the datagram is undecodable and the caller discards it.
    pub fn decode(&self, bytes: &[u8]) -> Result<Signal, CodecError> {
        for framing in &self.framings {
            if let Ok(signal) = decode_with(*framing, bytes) {
                return Ok(signal);
            }
        }
        Err(CodecError::NoFramingMatched)
    }
}

fn decode_with(framing: Framing, bytes: &[u8]) -> Result<Signal, CodecError> {
    match framing {
        Framing::Binary(width) => decode_binary(bytes, width),
        Framing::Json => decode_json(bytes),
    }
}

/// Encodes a signal with the chosen outbound framing.
pub fn encode_signal(signal: &Signal, framing: Framing) -> Result<Vec<u8>, CodecError> {
    match framing {
        Framing::Binary(width) => encode_binary(signal, width),
        Framing::Json => encode_json(signal),
    }
}

/// Decodes a datagram with the default chain (narrow binary, then JSON).
pub fn decode_signal(bytes: &[u8]) -> Result<Signal, CodecError> {
    DecodeChain::default().decode(bytes)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use interlock_core::Signal;

    use super::{decode_signal, encode_signal, CodecError, DecodeChain, Framing, TypeWidth};

    fn sample_signal() -> Signal {
        Signal {
            kind: 0x01,
            sender: "attention".to_string(),
            payload: json!({"focus": "editor"}),
            timestamp_ms: 1_700_000_000_000,
        }
    }

    #[test]
    fn both_wire_families_decode_through_one_chain() {
        let signal = sample_signal();

        let binary = encode_signal(&signal, Framing::Binary(TypeWidth::U8)).unwrap();
        let from_binary = decode_signal(&binary).expect("binary framing should decode");
        assert_eq!(from_binary.kind, signal.kind);
        assert_eq!(from_binary.sender, signal.sender);
        assert_eq!(from_binary.payload, signal.payload);

        let text = encode_signal(&signal, Framing::Json).unwrap();
        let from_json = decode_signal(&text).expect("json framing should decode");
        assert_eq!(from_json, signal);
    }

    #[test]
    fn wide_chain_decodes_wide_binary() {
        let mut signal = sample_signal();
        signal.kind = 0x0301;
        let bytes = encode_signal(&signal, Framing::Binary(TypeWidth::U16)).unwrap();
        let decoded = DecodeChain::wide_binary_first()
            .decode(&bytes)
            .expect("wide layout should decode");
        assert_eq!(decoded.kind, 0x0301);
    }

    #[test]
    fn empty_buffer_fails_every_framing() {
        assert!(matches!(
            decode_signal(&[]),
            Err(CodecError::NoFramingMatched)
        ));
    }

    #[test]
    fn eleven_bytes_fall_through_binary_and_fail_json() {
        assert!(decode_signal(&[0u8; 11]).is_err());
    }

    #[test]
    fn malformed_json_fails_entirely() {
        assert!(decode_signal(b"{not json").is_err());
    }

    #[test]
    fn foreign_protocol_datagrams_are_rejected() {
        // SSDP-style text, longer than a binary header but no framing match.
        assert!(decode_signal(b"M-SEARCH * HTTP/1.1\r\nHost: 239.255.255.250\r\n").is_err());
    }
}
