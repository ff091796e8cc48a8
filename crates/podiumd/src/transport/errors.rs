//! Error surface for the control socket listener.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Errors surfaced while binding or running the control socket.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Resolving the configured TCP endpoint failed.
    #[error("failed to resolve control endpoint {host}:{port}: {source}")]
    Resolve {
        /// Configured host.
        host: String,
        /// Configured port.
        port: u16,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The configured TCP endpoint resolved to no addresses.
    #[error("no addresses resolved for control endpoint {host}:{port}")]
    ResolveEmpty {
        /// Configured host.
        host: String,
        /// Configured port.
        port: u16,
    },
    /// Binding the TCP listener failed.
    #[error("failed to bind control listener at {addr}: {source}")]
    BindTcp {
        /// Resolved bind address.
        addr: SocketAddr,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Switching the listener to non-blocking mode failed.
    #[error("failed to enable non-blocking accept: {source}")]
    NonBlocking {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    #[cfg(unix)]
    /// Binding the unix listener failed.
    #[error("failed to bind control socket at {path}: {source}")]
    BindUnix {
        /// Configured socket path.
        path: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    #[cfg(unix)]
    /// Another daemon is already serving the unix socket.
    #[error("control socket {path} is already in use")]
    UnixInUse {
        /// Configured socket path.
        path: String,
    },
    #[cfg(unix)]
    /// The configured path exists but is not a socket.
    #[error("control socket path {path} is not a socket")]
    UnixNotSocket {
        /// Configured socket path.
        path: String,
    },
    #[cfg(unix)]
    /// Probing or removing a stale socket file failed.
    #[error("failed to reclaim stale control socket {path}: {source}")]
    UnixReclaim {
        /// Configured socket path.
        path: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    #[cfg(not(unix))]
    /// Unix sockets are unavailable on this platform.
    #[error("unix sockets are unsupported for endpoint {endpoint}")]
    UnsupportedUnix {
        /// Configured endpoint.
        endpoint: String,
    },
    /// The accept thread panicked.
    #[error("control listener thread panicked")]
    ThreadPanic,
}
