//! Core InterLock primitives shared across crates.
//!
//! Includes the signal unit, well-known kind codes, the canonical-name
//! registry, and the base error type.

pub mod error;
pub mod kinds;
pub mod signal;

pub use error::CoreError;
pub use kinds::{
    parse_kind_literal, KindRegistry, KIND_DOCK, KIND_EVENT, KIND_HEARTBEAT, KIND_SHUTDOWN,
    KIND_STATUS, KIND_UNDOCK,
};
pub use signal::{now_ms, Signal, SignalMeta, UNKNOWN_SENDER};
