//! InterLock mesh layer.
//!
//! This crate wires admission control, signal dispatch, peer liveness
//! tracking, and heartbeat emission around one UDP endpoint, on top of the
//! wire codec. Processes on the mesh discover each other from traffic,
//! exchange typed signals, and detect failure through heartbeat silence;
//! there is no central broker, no delivery guarantee, and no retry.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod peers;
pub mod socket;
pub mod stats;
pub mod tumbler;

pub use config::{MeshConfig, PeerSeed};
pub use dispatch::{Dispatcher, HandlerResult, RouteOutcome, SignalHandler};
pub use error::MeshError;
pub use peers::{Peer, PeerEvent, PeerStatus, PeerTable};
pub use socket::MeshSocket;
pub use stats::MeshStatsSnapshot;
pub use tumbler::{Tumbler, TumblerSnapshot};
