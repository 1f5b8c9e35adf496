//! Mesh socket: one UDP endpoint orchestrating codec, tumbler, peer table,
//! and dispatcher.
//!
//! Inbound: datagram → decode chain → tumbler → peer touch → dispatch
//! queue, with every failure absorbed at its layer and surfaced through
//! counters. Handlers run on a dedicated dispatch task consuming admitted
//! signals in arrival order, so a slow or blocking consumer backs up the
//! queue without ever stalling datagram intake or the timers.
//! Outbound: fire-and-forget UDP transmit, no retry; partial broadcast
//! failure does not abort the remaining sends. A periodic timer co-schedules
//! heartbeat emission with the liveness scan.
//!
//! The socket is an explicitly constructed object owned by the process's
//! composition root; the peer table and tumbler live behind it and are
//! reachable only through accessor snapshots.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use interlock_codec::{encode_signal, DecodeChain, Framing, TypeWidth};
use interlock_core::{
    now_ms, parse_kind_literal, Signal, SignalMeta, KIND_DOCK, KIND_HEARTBEAT, KIND_UNDOCK,
};

use crate::config::MeshConfig;
use crate::dispatch::{invoke_all, Dispatcher, SignalHandler};
use crate::error::MeshError;
use crate::peers::{Peer, PeerEvent, PeerTable};
use crate::stats::{MeshStatsInner, MeshStatsSnapshot};
use crate::tumbler::{Tumbler, TumblerSnapshot};

const RECV_BUFFER_LEN: usize = 64 * 1024;
const PEER_EVENT_CAPACITY: usize = 64;
const DISPATCH_QUEUE_LEN: usize = 1024;

/// Mutable shared state owned by the socket.
#[derive(Debug)]
struct MeshState {
    peers: PeerTable,
    tumbler: Tumbler,
}

/// One process's endpoint on the InterLock mesh.
pub struct MeshSocket {
    name: String,
    socket: Arc<UdpSocket>,
    framing: Framing,
    emit_whitelist: Option<HashSet<u16>>,
    heartbeat_timeout: Duration,
    state: Arc<Mutex<MeshState>>,
    dispatcher: Arc<RwLock<Dispatcher>>,
    stats: Arc<MeshStatsInner>,
    peer_events: broadcast::Sender<PeerEvent>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl MeshSocket {
    /// Binds the UDP endpoint, seeds the peer table, starts the receive
    /// loop, the dispatch task, and the heartbeat/liveness timer, and
    /// broadcasts a dock announcement to the statically configured peers.
    ///
    /// Bind failure is the only error after which the mesh cannot operate;
    /// everything later is absorbed and counted.
    pub async fn bind(config: MeshConfig) -> Result<Self, MeshError> {
        let tumbler = Tumbler::from_literals(&config.accepted_signals)?;
        let emit_whitelist = parse_emit_whitelist(&config.emit_signals)?;

        let mut peers = PeerTable::default();
        let mut seed_addrs = Vec::with_capacity(config.peers.len());
        for seed in &config.peers {
            let addr = seed.resolve()?;
            peers.seed(&seed.name, addr);
            seed_addrs.push(addr);
        }

        let socket = UdpSocket::bind(&config.bind)
            .await
            .map_err(MeshError::Bind)?;
        info!(name = %config.name, bind = %config.bind, peers = seed_addrs.len(), "mesh socket bound");

        let chain = match config.framing {
            Framing::Binary(TypeWidth::U16) => DecodeChain::wide_binary_first(),
            _ => DecodeChain::default(),
        };

        let (peer_events, _) = broadcast::channel(PEER_EVENT_CAPACITY);
        let (shutdown, _) = watch::channel(false);
        let mesh = Self {
            name: config.name,
            socket: Arc::new(socket),
            framing: config.framing,
            emit_whitelist,
            heartbeat_timeout: config.heartbeat_timeout,
            state: Arc::new(Mutex::new(MeshState { peers, tumbler })),
            dispatcher: Arc::new(RwLock::new(Dispatcher::default())),
            stats: Arc::new(MeshStatsInner::default()),
            peer_events,
            shutdown,
            tasks: Mutex::new(Vec::new()),
        };

        let (dispatch_tx, dispatch_rx) = mpsc::channel(DISPATCH_QUEUE_LEN);
        mesh.spawn_dispatch_loop(dispatch_rx);
        mesh.spawn_receive_loop(chain, dispatch_tx);
        mesh.spawn_heartbeat_timer(config.heartbeat_interval);

        // Dock/discovery announcement to the static seeds. Best-effort:
        // unreachable seeds are a counted send failure, not a bind failure.
        let dock = Signal::with_payload(
            KIND_DOCK,
            mesh.name.clone(),
            json!({ "port": mesh.local_addr().map(|a| a.port()).unwrap_or(0) }),
        );
        for addr in seed_addrs {
            transmit(&mesh.socket, &mesh.stats, mesh.framing, addr, &dock).await;
        }

        Ok(mesh)
    }

    /// Local address of the bound UDP endpoint.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// This process's mesh identity.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers a handler for one signal kind; the only way domain logic
    /// consumes mesh traffic.
    pub fn on_signal(&self, kind: u16, handler: SignalHandler) {
        self.dispatcher.write().unwrap().on(kind, handler);
    }

    /// Registers a wildcard handler invoked for every admitted signal.
    pub fn on_any_signal(&self, handler: SignalHandler) {
        self.dispatcher.write().unwrap().on_any(handler);
    }

    /// Sets the fallback handler for kinds without a specific registration.
    pub fn set_default_handler(&self, handler: SignalHandler) {
        self.dispatcher.write().unwrap().set_default(handler);
    }

    /// Removes all handlers for one kind.
    pub fn off_signal(&self, kind: u16) {
        self.dispatcher.write().unwrap().off(kind);
    }

    /// Removes every handler registration; teardown/test reset.
    pub fn clear_handlers(&self) {
        self.dispatcher.write().unwrap().clear();
    }

    /// Subscribes to liveness/membership transitions.
    pub fn peer_events(&self) -> broadcast::Receiver<PeerEvent> {
        self.peer_events.subscribe()
    }

    /// Adds a kind to the receive allow-list at runtime.
    pub fn allow_kind(&self, kind: u16) {
        self.state.lock().unwrap().tumbler.allow(kind);
    }

    /// Adds a kind to the receive block-list at runtime.
    pub fn block_kind(&self, kind: u16) {
        self.state.lock().unwrap().tumbler.block(kind);
    }

    /// Fire-and-forget transmit of one signal to one address.
    ///
    /// Transmission errors are counted and logged, never returned; UDP is
    /// lossy by contract and there is no retry.
    pub async fn send(&self, addr: SocketAddr, signal: &Signal) {
        if !self.emit_allowed(signal.kind) {
            return;
        }
        transmit(&self.socket, &self.stats, self.framing, addr, signal).await;
    }

    /// Transmits one signal to a named peer, if the peer is known.
    pub async fn send_to_peer(&self, peer: &str, signal: &Signal) {
        let addr = self.state.lock().unwrap().peers.addr_of(peer);
        match addr {
            Some(addr) => self.send(addr, signal).await,
            None => debug!(peer, kind = signal.kind, "send to unknown peer dropped"),
        }
    }

    /// Transmits one signal to every known peer.
    pub async fn broadcast(&self, signal: &Signal) {
        if !self.emit_allowed(signal.kind) {
            return;
        }
        let addrs = self.state.lock().unwrap().peers.addrs();
        for addr in addrs {
            transmit(&self.socket, &self.stats, self.framing, addr, signal).await;
        }
    }

    /// Transmits one signal to a named subset of peers; unknown names are
    /// skipped, unreachable ones counted, and neither aborts the rest.
    pub async fn broadcast_to(&self, peers: &[&str], signal: &Signal) {
        if !self.emit_allowed(signal.kind) {
            return;
        }
        let addrs: Vec<SocketAddr> = {
            let state = self.state.lock().unwrap();
            peers
                .iter()
                .filter_map(|name| state.peers.addr_of(name))
                .collect()
        };
        for addr in addrs {
            transmit(&self.socket, &self.stats, self.framing, addr, signal).await;
        }
    }

    /// Constructs a signal from this process and broadcasts it, optionally
    /// to a named subset; the only way domain logic injects signals into
    /// the mesh.
    pub async fn emit(&self, kind: u16, payload: Value, targets: Option<&[&str]>) {
        let signal = Signal::with_payload(kind, self.name.clone(), payload);
        match targets {
            Some(peers) => self.broadcast_to(peers, &signal).await,
            None => self.broadcast(&signal).await,
        }
    }

    /// Copies out the traffic counters.
    pub fn stats(&self) -> MeshStatsSnapshot {
        self.stats.snapshot()
    }

    /// Copies out the admission counters.
    pub fn tumbler_snapshot(&self) -> TumblerSnapshot {
        self.state.lock().unwrap().tumbler.snapshot()
    }

    /// Clones out the peer listing for the operator surface.
    pub fn peers(&self) -> Vec<Peer> {
        self.state.lock().unwrap().peers.list()
    }

    /// Stops the socket: cancels both timers, best-effort broadcasts an
    /// undock signal, waits for the loops to finish, and closes the UDP
    /// endpoint. Returns even with zero reachable peers; the port is free
    /// for rebinding once this resolves.
    pub async fn stop(self) {
        self.shutdown.send_replace(true);
        let undock = Signal::new(KIND_UNDOCK, self.name.clone());
        let addrs = self.state.lock().unwrap().peers.addrs();
        for addr in addrs {
            transmit(&self.socket, &self.stats, self.framing, addr, &undock).await;
        }

        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap());
        for task in tasks {
            let _ = task.await;
        }
        info!(name = %self.name, "mesh socket stopped");
        // The tasks held the only other handles; dropping self closes the
        // endpoint.
    }

    fn emit_allowed(&self, kind: u16) -> bool {
        match &self.emit_whitelist {
            Some(whitelist) if !whitelist.contains(&kind) => {
                self.stats.dropped_emit.fetch_add(1, Ordering::Relaxed);
                debug!(kind, "outbound signal gated by emit whitelist");
                false
            }
            _ => true,
        }
    }

    fn spawn_receive_loop(&self, chain: DecodeChain, dispatch_tx: mpsc::Sender<(Signal, SignalMeta)>) {
        let socket = Arc::clone(&self.socket);
        let state = Arc::clone(&self.state);
        let stats = Arc::clone(&self.stats);
        let peer_events = self.peer_events.clone();
        let mut shutdown = self.shutdown.subscribe();

        let task = tokio::spawn(async move {
            let mut buf = vec![0u8; RECV_BUFFER_LEN];
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    received = socket.recv_from(&mut buf) => match received {
                        Ok((len, remote_addr)) => {
                            let admitted = ingest_datagram(
                                &state,
                                &stats,
                                &peer_events,
                                &chain,
                                &buf[..len],
                                remote_addr,
                            );
                            if let Some(item) = admitted {
                                // try_send keeps intake non-blocking: when a
                                // slow consumer fills the queue, the signal
                                // is dropped and counted, never awaited.
                                if dispatch_tx.try_send(item).is_err() {
                                    stats.dropped_backlog.fetch_add(1, Ordering::Relaxed);
                                    warn!(%remote_addr, "dispatch queue full, admitted signal dropped");
                                }
                            }
                        }
                        Err(error) => {
                            // Transient receive errors (e.g. ICMP-induced)
                            // must not kill the listener.
                            warn!(%error, "udp receive failed");
                        }
                    },
                }
            }
            // Dropping dispatch_tx here lets the dispatch loop drain and
            // exit.
        });
        self.tasks.lock().unwrap().push(task);
    }

    /// Handlers run here, off the receive loop, consuming admitted signals
    /// in arrival order. A slow handler delays later signals, never intake.
    fn spawn_dispatch_loop(&self, mut queue: mpsc::Receiver<(Signal, SignalMeta)>) {
        let dispatcher = Arc::clone(&self.dispatcher);
        let stats = Arc::clone(&self.stats);

        let task = tokio::spawn(async move {
            while let Some((signal, meta)) = queue.recv().await {
                dispatch_one(&dispatcher, &stats, &signal, &meta);
            }
        });
        self.tasks.lock().unwrap().push(task);
    }

    fn spawn_heartbeat_timer(&self, interval: Duration) {
        let socket = Arc::clone(&self.socket);
        let state = Arc::clone(&self.state);
        let stats = Arc::clone(&self.stats);
        let peer_events = self.peer_events.clone();
        let name = self.name.clone();
        let framing = self.framing;
        let timeout = self.heartbeat_timeout;
        let mut shutdown = self.shutdown.subscribe();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it so the dock
            // announcement precedes the first heartbeat.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = ticker.tick() => {
                        let (transitions, addrs) = {
                            let mut state = state.lock().unwrap();
                            let transitions = state.peers.scan(now_ms(), timeout);
                            (transitions, state.peers.addrs())
                        };
                        for event in transitions {
                            if let PeerEvent::Inactive { name } = &event {
                                info!(peer = %name, "peer went inactive");
                            }
                            let _ = peer_events.send(event);
                        }

                        let snapshot = stats.snapshot();
                        let heartbeat = Signal::with_payload(
                            KIND_HEARTBEAT,
                            name.clone(),
                            json!({
                                "sent": snapshot.sent,
                                "received": snapshot.received,
                                "dropped": snapshot.dropped_decode + snapshot.dropped_admission,
                                "peers": addrs.len(),
                            }),
                        );
                        for addr in addrs {
                            transmit(&socket, &stats, framing, addr, &heartbeat).await;
                        }
                    }
                }
            }
        });
        self.tasks.lock().unwrap().push(task);
    }
}

impl std::fmt::Debug for MeshSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeshSocket")
            .field("name", &self.name)
            .field("framing", &self.framing)
            .finish()
    }
}

/// One inbound datagram through the admission half of the pipeline:
/// decode → admit → touch. Returns the admitted signal for the dispatch
/// queue, or `None` when the datagram was dropped and counted. Kept free of
/// the socket so tests can drive it with raw bytes.
fn ingest_datagram(
    state: &Mutex<MeshState>,
    stats: &MeshStatsInner,
    peer_events: &broadcast::Sender<PeerEvent>,
    chain: &DecodeChain,
    bytes: &[u8],
    remote_addr: SocketAddr,
) -> Option<(Signal, SignalMeta)> {
    let signal = match chain.decode(bytes) {
        Ok(signal) => signal,
        Err(error) => {
            stats.dropped_decode.fetch_add(1, Ordering::Relaxed);
            debug!(%remote_addr, %error, "discarded undecodable datagram");
            return None;
        }
    };

    let transition = {
        let mut state = state.lock().unwrap();
        if !state.tumbler.is_allowed(signal.kind, Some(remote_addr.ip())) {
            stats.dropped_admission.fetch_add(1, Ordering::Relaxed);
            debug!(kind = signal.kind, sender = %signal.sender, %remote_addr, "signal rejected by tumbler");
            return None;
        }
        state.peers.touch(&signal.sender, remote_addr, now_ms())
    };
    stats.received.fetch_add(1, Ordering::Relaxed);

    if let Some(event) = transition {
        if let PeerEvent::Discovered { name, addr } = &event {
            info!(peer = %name, %addr, "peer discovered");
        }
        let _ = peer_events.send(event);
    }

    Some((signal, SignalMeta { remote_addr }))
}

/// Routes one admitted signal; handler errors and panics are counted.
fn dispatch_one(
    dispatcher: &RwLock<Dispatcher>,
    stats: &MeshStatsInner,
    signal: &Signal,
    meta: &SignalMeta,
) {
    // Select under the registry lock, release it, then invoke: a handler
    // may itself register or remove handlers.
    let handlers = dispatcher.read().unwrap().handlers_for(signal.kind);
    let outcome = invoke_all(&handlers, signal, meta);
    if outcome.failed > 0 {
        stats
            .handler_errors
            .fetch_add(outcome.failed as u64, Ordering::Relaxed);
    }
}

/// Encodes and transmits one signal; failures are counted and logged.
async fn transmit(
    socket: &UdpSocket,
    stats: &MeshStatsInner,
    framing: Framing,
    addr: SocketAddr,
    signal: &Signal,
) {
    let bytes = match encode_signal(signal, framing) {
        Ok(bytes) => bytes,
        Err(error) => {
            stats.send_errors.fetch_add(1, Ordering::Relaxed);
            warn!(kind = signal.kind, %error, "signal failed to encode for transmit");
            return;
        }
    };
    match socket.send_to(&bytes, addr).await {
        Ok(_) => {
            stats.sent.fetch_add(1, Ordering::Relaxed);
        }
        Err(error) => {
            stats.send_errors.fetch_add(1, Ordering::Relaxed);
            warn!(%addr, kind = signal.kind, %error, "udp send failed");
        }
    }
}

fn parse_emit_whitelist(literals: &[String]) -> Result<Option<HashSet<u16>>, MeshError> {
    let mut whitelist = HashSet::new();
    let mut allow_all = literals.is_empty();
    // As with the tumbler, a wildcard never masks a bad literal.
    for literal in literals {
        if literal.trim() == "*" {
            allow_all = true;
            continue;
        }
        whitelist.insert(parse_kind_literal(literal)?);
    }
    Ok(if allow_all { None } else { Some(whitelist) })
}
