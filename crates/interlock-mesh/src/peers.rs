//! Peer table and liveness tracker.
//!
//! One entry per known mesh participant, keyed by stable identity. Entries
//! are created from static configuration with status `Unknown`, upgraded on
//! every accepted inbound signal, and downgraded to `Inactive` only by the
//! periodic liveness scan. The mesh is open-membership: a sender not in the
//! table is inserted as `Active` the first time it produces accepted
//! traffic; peers are never deleted, only re-discovered.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

/// Liveness status of a known peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerStatus {
    /// Seeded from config, never heard from.
    Unknown,
    /// Produced accepted traffic within the heartbeat timeout.
    Active,
    /// Silent past the heartbeat timeout.
    Inactive,
}

/// A known mesh participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    /// Stable identity.
    pub name: String,
    /// Last known network address; learned dynamically from inbound
    /// datagrams when it differs from static config.
    pub addr: SocketAddr,
    /// Receive time of the most recent accepted inbound signal, in
    /// milliseconds since the Unix epoch; zero if never heard from.
    pub last_seen_ms: u64,
    /// Current liveness status.
    pub status: PeerStatus,
}

/// Observable liveness/membership transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// First accepted signal from an identity not present in the table.
    Discovered { name: String, addr: SocketAddr },
    /// A previously unknown or inactive peer produced accepted traffic.
    Active { name: String },
    /// An active peer exceeded the heartbeat timeout.
    Inactive { name: String },
}

/// Identity → peer mapping, owned exclusively by the mesh socket.
#[derive(Debug, Default)]
pub struct PeerTable {
    peers: HashMap<String, Peer>,
}

impl PeerTable {
    /// Inserts a statically configured peer with status `Unknown`.
    pub fn seed(&mut self, name: impl Into<String>, addr: SocketAddr) {
        let name = name.into();
        self.peers.entry(name.clone()).or_insert(Peer {
            name,
            addr,
            last_seen_ms: 0,
            status: PeerStatus::Unknown,
        });
    }

    /// Records an accepted inbound signal from `name` at `addr`.
    ///
    /// Refreshes `last_seen_ms`, learns the address, and upgrades status to
    /// `Active`. Returns the membership/liveness transition this caused, if
    /// any; steady active→active traffic returns `None`.
    pub fn touch(&mut self, name: &str, addr: SocketAddr, now_ms: u64) -> Option<PeerEvent> {
        match self.peers.get_mut(name) {
            Some(peer) => {
                peer.addr = addr;
                peer.last_seen_ms = now_ms;
                let was = peer.status;
                peer.status = PeerStatus::Active;
                match was {
                    PeerStatus::Active => None,
                    PeerStatus::Unknown | PeerStatus::Inactive => Some(PeerEvent::Active {
                        name: name.to_string(),
                    }),
                }
            }
            None => {
                self.peers.insert(
                    name.to_string(),
                    Peer {
                        name: name.to_string(),
                        addr,
                        last_seen_ms: now_ms,
                        status: PeerStatus::Active,
                    },
                );
                Some(PeerEvent::Discovered {
                    name: name.to_string(),
                    addr,
                })
            }
        }
    }

    /// One liveness pass: flips peers from `Active` to `Inactive` when
    /// `now - last_seen > timeout`, returning one event per flip.
    ///
    /// O(number of known peers), no I/O; `Unknown` peers are untouched.
    pub fn scan(&mut self, now_ms: u64, timeout: Duration) -> Vec<PeerEvent> {
        let timeout_ms = timeout.as_millis() as u64;
        let mut events = Vec::new();
        for peer in self.peers.values_mut() {
            if peer.status == PeerStatus::Active
                && now_ms.saturating_sub(peer.last_seen_ms) > timeout_ms
            {
                peer.status = PeerStatus::Inactive;
                events.push(PeerEvent::Inactive {
                    name: peer.name.clone(),
                });
            }
        }
        events
    }

    /// Looks up one peer by identity.
    pub fn get(&self, name: &str) -> Option<&Peer> {
        self.peers.get(name)
    }

    /// Last known address of one peer.
    pub fn addr_of(&self, name: &str) -> Option<SocketAddr> {
        self.peers.get(name).map(|peer| peer.addr)
    }

    /// Addresses of every known peer, regardless of status.
    pub fn addrs(&self) -> Vec<SocketAddr> {
        self.peers.values().map(|peer| peer.addr).collect()
    }

    /// Clones out every entry for the operator surface.
    pub fn list(&self) -> Vec<Peer> {
        let mut peers: Vec<Peer> = self.peers.values().cloned().collect();
        peers.sort_by(|a, b| a.name.cmp(&b.name));
        peers
    }

    /// Number of known peers.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Returns `true` if no peers are known.
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
