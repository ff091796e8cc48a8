//! JSONL client for the daemon control socket.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::time::Duration;

use podium_config::SocketEndpoint;
use podium_daemon_types::{ControlReply, ControlRequest, LifecycleEvent};

use crate::errors::CliError;

#[cfg(unix)]
use std::os::unix::net::UnixStream;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

enum ClientStream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl ClientStream {
    fn connect(endpoint: &SocketEndpoint) -> std::io::Result<Self> {
        match endpoint {
            SocketEndpoint::Tcp { host, port } => {
                TcpStream::connect((host.as_str(), *port)).map(Self::Tcp)
            }
            SocketEndpoint::Unix { path } => {
                #[cfg(unix)]
                {
                    UnixStream::connect(path.as_std_path()).map(Self::Unix)
                }
                #[cfg(not(unix))]
                {
                    Err(std::io::Error::new(
                        std::io::ErrorKind::Unsupported,
                        "unix sockets unsupported on this platform",
                    ))
                }
            }
        }
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.set_read_timeout(timeout),
            #[cfg(unix)]
            Self::Unix(stream) => stream.set_read_timeout(timeout),
        }
    }
}

impl Write for ClientStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            Self::Unix(stream) => stream.flush(),
        }
    }
}

impl std::io::Read for ClientStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.read(buf),
        }
    }
}

/// One-shot and subscription access to the daemon control socket.
pub struct ControlClient {
    endpoint: SocketEndpoint,
}

impl ControlClient {
    /// Builds a client for the given endpoint.
    #[must_use]
    pub fn new(endpoint: SocketEndpoint) -> Self {
        Self { endpoint }
    }

    /// Control endpoint this client targets.
    #[must_use]
    pub fn endpoint(&self) -> &SocketEndpoint {
        &self.endpoint
    }

    fn socket_error(&self, source: std::io::Error) -> CliError {
        CliError::ControlSocket {
            endpoint: self.endpoint.to_string(),
            source,
        }
    }

    /// Sends one request and reads the single reply line.
    ///
    /// # Errors
    ///
    /// Returns [`CliError`] when the socket is unreachable, the exchange
    /// fails, or the daemon replies with an error.
    pub fn request(&self, request: ControlRequest) -> Result<ControlReply, CliError> {
        let mut stream =
            ClientStream::connect(&self.endpoint).map_err(|source| self.socket_error(source))?;
        stream
            .set_read_timeout(Some(REQUEST_TIMEOUT))
            .map_err(|source| self.socket_error(source))?;
        let line = serde_json::to_string(&request)
            .map_err(|error| self.socket_error(std::io::Error::other(error)))?;
        stream
            .write_all(line.as_bytes())
            .and_then(|()| stream.write_all(b"\n"))
            .and_then(|()| stream.flush())
            .map_err(|source| self.socket_error(source))?;

        let mut reply_line = String::new();
        BufReader::new(stream)
            .read_line(&mut reply_line)
            .map_err(|source| self.socket_error(source))?;
        parse_reply(&reply_line)
    }

    /// Sends a request and expects an acknowledgement, returning the running
    /// snapshot it carries.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::UnexpectedReply`] when the daemon replies with
    /// anything other than an acknowledgement.
    pub fn request_ack(&self, request: ControlRequest) -> Result<bool, CliError> {
        match self.request(request)? {
            ControlReply::Ack { running } => Ok(running),
            other => Err(CliError::UnexpectedReply {
                reply: reply_text(&other),
            }),
        }
    }

    /// Opens a subscription connection delivering lifecycle events.
    ///
    /// # Errors
    ///
    /// Returns [`CliError`] when the subscription handshake fails.
    pub fn subscribe(&self) -> Result<EventSubscription, CliError> {
        let mut stream =
            ClientStream::connect(&self.endpoint).map_err(|source| self.socket_error(source))?;
        let line = serde_json::to_string(&ControlRequest::Subscribe)
            .map_err(|error| self.socket_error(std::io::Error::other(error)))?;
        stream
            .write_all(line.as_bytes())
            .and_then(|()| stream.write_all(b"\n"))
            .and_then(|()| stream.flush())
            .map_err(|source| self.socket_error(source))?;

        stream
            .set_read_timeout(Some(REQUEST_TIMEOUT))
            .map_err(|source| self.socket_error(source))?;
        let mut reader = BufReader::new(stream);
        let mut reply_line = String::new();
        reader
            .read_line(&mut reply_line)
            .map_err(|source| self.socket_error(source))?;
        match parse_reply(&reply_line)? {
            ControlReply::Subscribed { token } => Ok(EventSubscription {
                endpoint: self.endpoint.clone(),
                reader,
                token,
            }),
            other => Err(CliError::UnexpectedReply {
                reply: reply_text(&other),
            }),
        }
    }
}

/// Open subscription yielding lifecycle events as the daemon broadcasts
/// them.
pub struct EventSubscription {
    endpoint: SocketEndpoint,
    reader: BufReader<ClientStream>,
    token: u64,
}

impl EventSubscription {
    /// Token assigned by the daemon.
    #[must_use]
    pub fn token(&self) -> u64 {
        self.token
    }

    /// Waits up to `timeout` for the next lifecycle event.
    ///
    /// Returns `Ok(None)` when the daemon closed the connection.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::LifecycleTimeout`] when no event arrives in time
    /// and [`CliError::ControlSocket`] on transport failures.
    pub fn next_event(&mut self, timeout: Duration) -> Result<Option<LifecycleEvent>, CliError> {
        self.reader
            .get_ref()
            .set_read_timeout(Some(timeout))
            .map_err(|source| CliError::ControlSocket {
                endpoint: self.endpoint.to_string(),
                source,
            })?;
        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Ok(0) => Ok(None),
            Ok(_) => serde_json::from_str(line.trim())
                .map(Some)
                .map_err(|_| CliError::UnexpectedReply {
                    reply: line.trim().to_owned(),
                }),
            Err(error)
                if error.kind() == std::io::ErrorKind::WouldBlock
                    || error.kind() == std::io::ErrorKind::TimedOut =>
            {
                Err(CliError::LifecycleTimeout {
                    expected: "lifecycle event",
                    timeout,
                })
            }
            Err(source) => Err(CliError::ControlSocket {
                endpoint: self.endpoint.to_string(),
                source,
            }),
        }
    }
}

fn parse_reply(line: &str) -> Result<ControlReply, CliError> {
    let trimmed = line.trim();
    let reply: ControlReply =
        serde_json::from_str(trimmed).map_err(|_| CliError::UnexpectedReply {
            reply: trimmed.to_owned(),
        })?;
    if let ControlReply::Error { message } = reply {
        return Err(CliError::DaemonError { message });
    }
    Ok(reply)
}

fn reply_text(reply: &ControlReply) -> String {
    serde_json::to_string(reply).unwrap_or_else(|_| format!("{reply:?}"))
}
