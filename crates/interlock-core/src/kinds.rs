//! Well-known signal kind codes and the canonical-name registry.
//!
//! Every server generation defines its own kind enumeration with documented
//! overlaps and legacy aliases; two names may map to the same numeric code.
//! The registry resolves a code to one canonical name: the first name
//! registered for that code wins, deterministically.

use std::collections::HashMap;

use crate::error::CoreError;

/// Discovery announcement broadcast on startup.
pub const KIND_DOCK: u16 = 0x01;
/// Best-effort departure announcement broadcast on shutdown.
pub const KIND_UNDOCK: u16 = 0x02;
/// Periodic self-announcement carrying node stats.
pub const KIND_HEARTBEAT: u16 = 0x03;
/// On-demand status report.
pub const KIND_STATUS: u16 = 0x04;
/// Generic domain event envelope.
pub const KIND_EVENT: u16 = 0x05;
/// Request that the receiving process shut down.
pub const KIND_SHUTDOWN: u16 = 0x06;

/// Legacy name still emitted by first-generation peers for `KIND_HEARTBEAT`.
pub const LEGACY_PULSE_NAME: &str = "pulse";

/// Code → canonical name lookup built at initialization.
#[derive(Debug, Clone, Default)]
pub struct KindRegistry {
    names: HashMap<u16, String>,
}

impl KindRegistry {
    /// Registry pre-populated with the well-known kinds, including the
    /// legacy `pulse` alias, which loses to `heartbeat` for 0x03.
    pub fn with_well_known() -> Self {
        let mut registry = Self::default();
        registry.register(KIND_DOCK, "dock");
        registry.register(KIND_UNDOCK, "undock");
        registry.register(KIND_HEARTBEAT, "heartbeat");
        registry.register(KIND_HEARTBEAT, LEGACY_PULSE_NAME);
        registry.register(KIND_STATUS, "status");
        registry.register(KIND_EVENT, "event");
        registry.register(KIND_SHUTDOWN, "shutdown");
        registry
    }

    /// Registers `name` for `code`; returns whether it became the canonical
    /// name. The first registration for a code wins, later names are
    /// treated as aliases and dropped.
    pub fn register(&mut self, code: u16, name: impl Into<String>) -> bool {
        if self.names.contains_key(&code) {
            return false;
        }
        self.names.insert(code, name.into());
        true
    }

    /// Canonical name for `code`, if any name was registered.
    pub fn canonical_name(&self, code: u16) -> Option<&str> {
        self.names.get(&code).map(String::as_str)
    }

    /// Number of codes with a registered name.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns `true` if no names are registered.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Parses one configured kind literal: `0x`-prefixed hex or plain decimal.
///
/// The wildcard `*` is not a kind and must be handled by the caller.
pub fn parse_kind_literal(literal: &str) -> Result<u16, CoreError> {
    let literal = literal.trim();
    let parsed = if let Some(hex) = literal.strip_prefix("0x").or_else(|| literal.strip_prefix("0X")) {
        u16::from_str_radix(hex, 16)
    } else {
        literal.parse::<u16>()
    };
    parsed.map_err(|_| CoreError::BadKindLiteral(literal.to_string()))
}

#[cfg(test)]
mod tests {
    use super::{parse_kind_literal, KindRegistry, KIND_HEARTBEAT, KIND_STATUS};

    #[test]
    fn first_registered_name_wins_for_a_code() {
        let registry = KindRegistry::with_well_known();
        assert_eq!(registry.canonical_name(KIND_HEARTBEAT), Some("heartbeat"));
        assert_eq!(registry.canonical_name(KIND_STATUS), Some("status"));
        assert_eq!(registry.canonical_name(0xFF), None);
    }

    #[test]
    fn register_reports_alias_registrations() {
        let mut registry = KindRegistry::default();
        assert!(registry.register(0x20, "merge_plan"));
        assert!(!registry.register(0x20, "consolidate"));
        assert_eq!(registry.canonical_name(0x20), Some("merge_plan"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn parses_hex_and_decimal_literals() {
        assert_eq!(parse_kind_literal("0x04").unwrap(), 4);
        assert_eq!(parse_kind_literal("0X1f").unwrap(), 31);
        assert_eq!(parse_kind_literal("260").unwrap(), 260);
        assert_eq!(parse_kind_literal(" 7 ").unwrap(), 7);
    }

    #[test]
    fn rejects_garbage_literals() {
        assert!(parse_kind_literal("0xZZ").is_err());
        assert!(parse_kind_literal("heartbeat").is_err());
        assert!(parse_kind_literal("").is_err());
        assert!(parse_kind_literal("70000").is_err());
    }
}
