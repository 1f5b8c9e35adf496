//! Tumbler: the mesh's only admission control.
//!
//! A whitelist/blacklist evaluator deciding, per received signal kind and
//! optionally per sending peer, whether a decoded signal reaches dispatch.
//! An empty allow-list (or a `*` entry) means allow all; this matches the
//! deployed legacy default and is deliberately permissive rather than an
//! accidental leak.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;

use interlock_core::{parse_kind_literal, CoreError};

/// Admission decision counters for the operator surface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TumblerSnapshot {
    /// Signals admitted to dispatch.
    pub allowed: u64,
    /// Signals rejected by policy.
    pub blocked: u64,
    /// Admitted count per signal kind.
    pub allowed_by_kind: HashMap<u16, u64>,
}

/// Whitelist/blacklist admission filter with decision counters.
#[derive(Debug, Default)]
pub struct Tumbler {
    allowed_kinds: HashSet<u16>,
    blocked_kinds: HashSet<u16>,
    allowed_peers: HashSet<IpAddr>,
    blocked_peers: HashSet<IpAddr>,
    allowed_count: u64,
    blocked_count: u64,
    allowed_by_kind: HashMap<u16, u64>,
}

impl Tumbler {
    /// Builds a tumbler from configured kind literals (hex or decimal
    /// strings). A `*` entry, like an empty list, means allow all.
    pub fn from_literals(literals: &[String]) -> Result<Self, CoreError> {
        let mut tumbler = Self::default();
        let mut allow_all = false;
        // Parse every entry before honoring a wildcard so a bad literal is
        // a config error regardless of position.
        for literal in literals {
            if literal.trim() == "*" {
                allow_all = true;
                continue;
            }
            tumbler.allowed_kinds.insert(parse_kind_literal(literal)?);
        }
        if allow_all {
            tumbler.allowed_kinds.clear();
        }
        Ok(tumbler)
    }

    /// Adds `kind` to the allow-list, removing any contradicting block.
    pub fn allow(&mut self, kind: u16) {
        self.blocked_kinds.remove(&kind);
        self.allowed_kinds.insert(kind);
    }

    /// Adds `kind` to the block-list, removing any contradicting allow.
    pub fn block(&mut self, kind: u16) {
        self.allowed_kinds.remove(&kind);
        self.blocked_kinds.insert(kind);
    }

    /// Adds a peer address to the peer allow-list.
    pub fn add_peer(&mut self, peer: IpAddr) {
        self.blocked_peers.remove(&peer);
        self.allowed_peers.insert(peer);
    }

    /// Removes a peer address from the peer allow-list.
    pub fn remove_peer(&mut self, peer: &IpAddr) {
        self.allowed_peers.remove(peer);
    }

    /// Adds a peer address to the peer block-list.
    pub fn block_peer(&mut self, peer: IpAddr) {
        self.allowed_peers.remove(&peer);
        self.blocked_peers.insert(peer);
    }

    /// Whether the kind allow-list admits everything.
    pub fn allows_all_kinds(&self) -> bool {
        self.allowed_kinds.is_empty()
    }

    /// Admission decision for one received signal.
    ///
    /// Pure over the rule set except for counter increments: block-lists
    /// reject first, an empty allow-list admits, otherwise the kind must be
    /// allowed and the peer must pass the peer allow-list when one is
    /// configured.
    pub fn is_allowed(&mut self, kind: u16, peer: Option<IpAddr>) -> bool {
        let admitted = self.evaluate(kind, peer);
        if admitted {
            self.allowed_count += 1;
            *self.allowed_by_kind.entry(kind).or_insert(0) += 1;
        } else {
            self.blocked_count += 1;
        }
        admitted
    }

    fn evaluate(&self, kind: u16, peer: Option<IpAddr>) -> bool {
        if self.blocked_kinds.contains(&kind) {
            return false;
        }
        if let Some(peer) = peer {
            if self.blocked_peers.contains(&peer) {
                return false;
            }
            if !self.allowed_peers.is_empty() && !self.allowed_peers.contains(&peer) {
                return false;
            }
        }
        self.allows_all_kinds() || self.allowed_kinds.contains(&kind)
    }

    /// Copies out the current decision counters.
    pub fn snapshot(&self) -> TumblerSnapshot {
        TumblerSnapshot {
            allowed: self.allowed_count,
            blocked: self.blocked_count,
            allowed_by_kind: self.allowed_by_kind.clone(),
        }
    }
}
