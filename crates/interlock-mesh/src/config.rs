//! Mesh socket configuration.

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use interlock_codec::{Framing, TypeWidth};

use crate::error::MeshError;

/// Statically configured mesh member (identity + address).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerSeed {
    pub name: String,
    pub host: String,
    pub port: u16,
}

impl PeerSeed {
    /// Resolves the seed to one socket address (first resolution wins).
    pub fn resolve(&self) -> Result<SocketAddr, MeshError> {
        use std::net::ToSocketAddrs;
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|source| MeshError::PeerResolve {
                name: self.name.clone(),
                source,
            })?
            .next()
            .ok_or_else(|| MeshError::PeerResolve {
                name: self.name.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no address"),
            })
    }
}

/// Configuration consumed by [`crate::MeshSocket::bind`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshConfig {
    /// This process's mesh identity, carried as the sender of every emitted
    /// signal.
    pub name: String,
    /// UDP listen address, e.g. `0.0.0.0:47000`.
    pub bind: String,
    /// Static seed list; pre-populates the peer table with status unknown.
    pub peers: Vec<PeerSeed>,
    /// Period of heartbeat emission and the liveness scan.
    #[serde(with = "humantime_serde")]
    pub heartbeat_interval: Duration,
    /// Silence threshold for the active → inactive transition.
    #[serde(with = "humantime_serde")]
    pub heartbeat_timeout: Duration,
    /// Accepted-signal whitelist (hex or decimal literals); empty or `*`
    /// means allow all.
    pub accepted_signals: Vec<String>,
    /// Outbound whitelist; empty means any kind may be emitted.
    pub emit_signals: Vec<String>,
    /// Outbound wire framing. Decoding always accepts the matching binary
    /// layout and the JSON family regardless of this choice.
    pub framing: Framing,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            name: "interlock-node".to_string(),
            bind: "0.0.0.0:47000".to_string(),
            peers: Vec::new(),
            heartbeat_interval: Duration::from_secs(5),
            heartbeat_timeout: Duration::from_secs(15),
            accepted_signals: Vec::new(),
            emit_signals: Vec::new(),
            framing: Framing::Binary(TypeWidth::U8),
        }
    }
}
