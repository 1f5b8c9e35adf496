//! InterLock wire codec.
//!
//! Two incompatible framing families exist on deployed meshes: a fixed
//! 12-byte binary header followed by a JSON payload, and a flat JSON
//! envelope with short field names. This crate encodes either family and
//! decodes both through an ordered chain of framing strategies.

pub mod binary;
pub mod chain;
pub mod error;
pub mod json;

pub use binary::{decode_binary, encode_binary, TypeWidth, HEADER_LEN};
pub use chain::{decode_signal, encode_signal, DecodeChain, Framing};
pub use error::CodecError;
pub use json::{decode_json, encode_json};
