//! Control socket transport.
//!
//! Binds the configured endpoint, accepts connections on a background
//! thread, and decodes single-line JSON control requests. Subscription
//! connections stay open and receive lifecycle events until the client
//! disconnects.

mod errors;
mod handler;
mod listener;

pub use self::errors::ListenerError;
pub use self::handler::{ConnectionHandler, ConnectionStream, ControlConnectionHandler};
pub use self::listener::{ListenerHandle, SocketListener};

const TRANSPORT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
