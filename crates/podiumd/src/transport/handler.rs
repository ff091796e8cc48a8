//! Control protocol handling for accepted connections.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;

use podium_daemon_types::{ControlReply, ControlRequest, LifecycleEvent};
use tracing::{debug, warn};

use crate::controller::{EventSubscriber, LifecycleController, SubscriberRegistry};

use super::TRANSPORT_TARGET;

#[cfg(unix)]
use std::os::unix::net::UnixStream;

const MAX_REQUEST_BYTES: usize = 8 * 1024;

/// Stream types accepted by the control listener.
pub enum ConnectionStream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl ConnectionStream {
    /// Clones the underlying socket so a subscription can own a writer while
    /// the handler keeps reading.
    pub(crate) fn try_clone(&self) -> io::Result<Self> {
        match self {
            Self::Tcp(stream) => stream.try_clone().map(Self::Tcp),
            #[cfg(unix)]
            Self::Unix(stream) => stream.try_clone().map(Self::Unix),
        }
    }
}

impl Read for ConnectionStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for ConnectionStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            Self::Unix(stream) => stream.flush(),
        }
    }
}

/// Handles accepted control connections.
pub trait ConnectionHandler: Send + Sync + 'static {
    /// Handles a single connection. Implementations should avoid panicking.
    fn handle(&self, stream: ConnectionStream);
}

/// Subscriber that writes lifecycle events to a cloned client stream.
struct StreamSubscriber {
    stream: ConnectionStream,
}

impl EventSubscriber for StreamSubscriber {
    fn deliver(&mut self, event: LifecycleEvent) -> io::Result<()> {
        let line = serde_json::to_string(&event)
            .map_err(|error| io::Error::new(io::ErrorKind::InvalidData, error))?;
        self.stream.write_all(line.as_bytes())?;
        self.stream.write_all(b"\n")?;
        self.stream.flush()
    }
}

/// Control protocol handler wired to the lifecycle controller.
///
/// `kill_switch` terminates the daemon process; it is injectable so tests can
/// observe a kill without losing the test harness.
pub struct ControlConnectionHandler {
    controller: Arc<LifecycleController>,
    registry: Arc<SubscriberRegistry>,
    kill_switch: Box<dyn Fn() + Send + Sync>,
}

impl ControlConnectionHandler {
    /// Builds a handler that exits the process on a kill request.
    #[must_use]
    pub fn new(controller: Arc<LifecycleController>, registry: Arc<SubscriberRegistry>) -> Self {
        Self::with_kill_switch(controller, registry, Box::new(|| std::process::exit(0)))
    }

    /// Builds a handler with an injected kill action.
    #[must_use]
    pub fn with_kill_switch(
        controller: Arc<LifecycleController>,
        registry: Arc<SubscriberRegistry>,
        kill_switch: Box<dyn Fn() + Send + Sync>,
    ) -> Self {
        Self {
            controller,
            registry,
            kill_switch,
        }
    }

    fn reply(&self, stream: &mut ConnectionStream, reply: &ControlReply) -> io::Result<()> {
        let line = serde_json::to_string(reply)
            .map_err(|error| io::Error::new(io::ErrorKind::InvalidData, error))?;
        stream.write_all(line.as_bytes())?;
        stream.write_all(b"\n")?;
        stream.flush()
    }

    fn ack(&self, stream: &mut ConnectionStream) -> io::Result<()> {
        self.reply(
            stream,
            &ControlReply::Ack {
                running: self.controller.is_running(),
            },
        )
    }

    fn serve_subscription(&self, mut stream: ConnectionStream) -> io::Result<()> {
        let writer = stream.try_clone()?;
        let token = self.registry.register(Box::new(StreamSubscriber {
            stream: writer,
        }));
        if let Err(error) = self.reply(&mut stream, &ControlReply::Subscribed { token }) {
            self.registry.unregister(token);
            return Err(error);
        }

        // Keep reading so an unsubscribe or disconnect tears the
        // subscription down promptly.
        loop {
            match read_request_line(&mut stream) {
                Ok(Some(line)) => match serde_json::from_slice(&line) {
                    Ok(ControlRequest::Unsubscribe) => break,
                    Ok(request) => {
                        debug!(
                            target: TRANSPORT_TARGET,
                            ?request,
                            "ignoring request on subscription connection"
                        );
                    }
                    Err(_) => {}
                },
                Ok(None) => break,
                Err(error) => {
                    self.registry.unregister(token);
                    return Err(error);
                }
            }
        }
        self.registry.unregister(token);
        Ok(())
    }

    fn dispatch(&self, mut stream: ConnectionStream) -> io::Result<()> {
        let Some(line) = read_request_line(&mut stream)? else {
            return Ok(());
        };
        let request: ControlRequest = match serde_json::from_slice(&line) {
            Ok(request) => request,
            Err(error) => {
                return self.reply(
                    &mut stream,
                    &ControlReply::Error {
                        message: format!("malformed control request: {error}"),
                    },
                );
            }
        };
        debug!(
            target: TRANSPORT_TARGET,
            ?request,
            "control request received"
        );

        match request {
            ControlRequest::Start => {
                self.controller.request_start();
                self.ack(&mut stream)
            }
            ControlRequest::Stop => {
                self.controller.request_stop();
                self.ack(&mut stream)
            }
            ControlRequest::IsRunning => self.ack(&mut stream),
            ControlRequest::Kill => {
                self.ack(&mut stream)?;
                (self.kill_switch)();
                Ok(())
            }
            ControlRequest::Subscribe => self.serve_subscription(stream),
            // An unsubscribe without a live subscription is a no-op.
            ControlRequest::Unsubscribe => self.ack(&mut stream),
        }
    }
}

impl ConnectionHandler for ControlConnectionHandler {
    fn handle(&self, stream: ConnectionStream) {
        if let Err(error) = self.dispatch(stream) {
            warn!(
                target: TRANSPORT_TARGET,
                error = %error,
                "control connection failed"
            );
        }
    }
}

/// Reads one newline-terminated request line with a size bound.
///
/// Returns `None` when the peer closed the connection before sending a line.
fn read_request_line(stream: &mut ConnectionStream) -> io::Result<Option<Vec<u8>>> {
    let mut buffer = Vec::new();
    let mut byte = [0_u8; 1];
    loop {
        let read = match stream.read(&mut byte) {
            Ok(read) => read,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(error),
        };
        if read == 0 {
            if buffer.is_empty() {
                return Ok(None);
            }
            return Ok(Some(buffer));
        }
        if byte[0] == b'\n' {
            return Ok(Some(buffer));
        }
        buffer.push(byte[0]);
        if buffer.len() > MAX_REQUEST_BYTES {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "control request exceeds maximum size",
            ));
        }
    }
}
