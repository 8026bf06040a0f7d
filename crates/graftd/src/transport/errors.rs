//! Errors raised while binding or running the request listener.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced while binding or running the request listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The TCP host name could not be resolved.
    #[error("cannot resolve listen address {host}:{port}: {source}")]
    Resolve {
        /// Configured host.
        host: String,
        /// Configured port.
        port: u16,
        /// Resolver failure.
        #[source]
        source: io::Error,
    },
    /// Resolution succeeded but produced no address.
    #[error("listen address {host}:{port} resolved to nothing")]
    ResolveEmpty {
        /// Configured host.
        host: String,
        /// Configured port.
        port: u16,
    },
    /// Binding the TCP socket failed.
    #[error("cannot listen on {addr}: {source}")]
    BindTcp {
        /// Resolved address.
        addr: SocketAddr,
        /// Bind failure.
        #[source]
        source: io::Error,
    },
    /// Switching the socket to non-blocking accepts failed.
    #[error("cannot poll the listen socket: {source}")]
    NonBlocking {
        /// Underlying failure.
        #[source]
        source: io::Error,
    },
    /// The accept thread could not be spawned.
    #[error("cannot spawn the accept thread: {source}")]
    Spawn {
        /// Underlying failure.
        #[source]
        source: io::Error,
    },
    /// Unix endpoints were configured on a platform without them.
    #[cfg(not(unix))]
    #[error("unix sockets are unsupported for endpoint {endpoint}")]
    UnsupportedUnix {
        /// Configured endpoint.
        endpoint: String,
    },
    /// Binding the Unix socket failed.
    #[cfg(unix)]
    #[error("cannot listen on {}: {source}", path.display())]
    BindUnix {
        /// Socket path.
        path: PathBuf,
        /// Bind failure.
        #[source]
        source: io::Error,
    },
    /// Another process still serves the socket path.
    #[cfg(unix)]
    #[error("socket {} is served by another process", path.display())]
    UnixInUse {
        /// Socket path.
        path: PathBuf,
    },
    /// Something other than a socket occupies the path.
    #[cfg(unix)]
    #[error("{} exists and is not a socket", path.display())]
    UnixNotSocket {
        /// Occupied path.
        path: PathBuf,
    },
    /// A leftover socket could not be inspected or removed.
    #[cfg(unix)]
    #[error("cannot clear leftover socket {}: {source}", path.display())]
    UnixStale {
        /// Socket path.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },
    /// The accept thread panicked.
    #[error("accept thread panicked")]
    ThreadPanic,
}
