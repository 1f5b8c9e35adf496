use thiserror::Error;

/// Errors surfaced by mesh socket construction.
///
/// Only bind-time failures propagate to the caller. Everything after bind
/// (decode, admission, handler, send failures, peer silence) is absorbed at
/// its layer and surfaced through counters and logs: the mesh must keep
/// operating in a lossy, partially-available network.
#[derive(Debug, Error)]
pub enum MeshError {
    /// Binding the UDP endpoint failed; fatal at startup.
    #[error("bind failed: {0}")]
    Bind(#[source] std::io::Error),
    /// A statically configured peer address did not resolve.
    #[error("peer `{name}` did not resolve: {source}")]
    PeerResolve {
        name: String,
        #[source]
        source: std::io::Error,
    },
    /// A configured signal-kind literal did not parse.
    #[error(transparent)]
    Config(#[from] interlock_core::CoreError),
}
