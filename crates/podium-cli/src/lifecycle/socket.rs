//! Control socket reachability probing.

use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use podium_config::SocketEndpoint;

use crate::errors::CliError;

#[cfg(unix)]
use socket2::{Domain, SockAddr, Socket, Type};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Checks whether a daemon is listening on the endpoint.
///
/// # Errors
///
/// Returns [`CliError::ControlSocket`] for probe failures that signal
/// neither presence nor absence, such as permission errors.
pub fn socket_is_reachable(endpoint: &SocketEndpoint) -> Result<bool, CliError> {
    match try_connect(endpoint) {
        Ok(()) => Ok(true),
        Err(error) if indicates_absent_listener(&error) => Ok(false),
        Err(source) => Err(CliError::ControlSocket {
            endpoint: endpoint.to_string(),
            source,
        }),
    }
}

fn try_connect(endpoint: &SocketEndpoint) -> io::Result<()> {
    match endpoint {
        SocketEndpoint::Tcp { host, port } => {
            let address = resolve_tcp(host, *port)?;
            TcpStream::connect_timeout(&address, PROBE_TIMEOUT).map(|_| ())
        }
        SocketEndpoint::Unix { path } => connect_unix(path.as_str()),
    }
}

fn resolve_tcp(host: &str, port: u16) -> io::Result<SocketAddr> {
    let mut addrs = (host, port).to_socket_addrs()?;
    addrs
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "no resolved address"))
}

#[cfg(unix)]
fn connect_unix(path: &str) -> io::Result<()> {
    let socket = Socket::new(Domain::UNIX, Type::STREAM, None)?;
    let address = SockAddr::unix(path)?;
    socket.connect_timeout(&address, PROBE_TIMEOUT)
}

#[cfg(not(unix))]
fn connect_unix(_path: &str) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "unix sockets unsupported on this platform",
    ))
}

/// `ConnectionReset` is deliberately excluded: it means a listener accepted
/// and dropped the connection, so the socket is in use.
fn indicates_absent_listener(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::NotFound
            | io::ErrorKind::AddrNotAvailable
    )
}
