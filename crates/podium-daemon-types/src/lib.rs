//! Wire types for the Podium control protocol.
//!
//! The daemon and CLI exchange single-line JSON (JSONL) over the control
//! socket. A connection carries one request and one reply, except for
//! `subscribe` connections which stay open and receive [`LifecycleEvent`]
//! lines until the client disconnects or sends `unsubscribe`.

use serde::{Deserialize, Serialize};

/// Requests accepted by the daemon control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ControlRequest {
    /// Enqueue an engine start.
    Start,
    /// Enqueue a clean engine stop.
    Stop,
    /// Terminate the daemon process immediately, without a clean stop.
    Kill,
    /// Snapshot of whether the engine is currently running.
    IsRunning,
    /// Register this connection as a lifecycle subscriber.
    Subscribe,
    /// Remove this connection from the subscriber set.
    Unsubscribe,
}

/// Replies produced for control requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ControlReply {
    /// Request accepted; carries the running snapshot at reply time.
    Ack { running: bool },
    /// Subscription established under the given token.
    Subscribed { token: u64 },
    /// Request rejected or failed.
    Error { message: String },
}

/// Lifecycle notifications fanned out to subscribers.
///
/// Start failures and mid-run engine failures are both reported as
/// `Stopped { error: true }`; subscribers cannot distinguish "never started"
/// from "crashed".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// The engine started and is accepting connections.
    Started,
    /// The engine stopped; `error` is false only for clean stops.
    Stopped { error: bool },
}

impl LifecycleEvent {
    /// Convenience constructor for stop notifications.
    #[must_use]
    pub fn stopped(error: bool) -> Self {
        Self::Stopped { error }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_use_snake_case_op_tags() {
        let line = serde_json::to_string(&ControlRequest::IsRunning).expect("serialize");
        assert_eq!(line, r#"{"op":"is_running"}"#);
        let parsed: ControlRequest =
            serde_json::from_str(r#"{"op":"subscribe"}"#).expect("deserialize");
        assert_eq!(parsed, ControlRequest::Subscribe);
    }

    #[test]
    fn stop_event_carries_the_error_flag() {
        let line = serde_json::to_string(&LifecycleEvent::stopped(true)).expect("serialize");
        assert_eq!(line, r#"{"event":"stopped","error":true}"#);
        let parsed: LifecycleEvent =
            serde_json::from_str(r#"{"event":"stopped","error":false}"#).expect("deserialize");
        assert_eq!(parsed, LifecycleEvent::Stopped { error: false });
    }

    #[test]
    fn ack_reply_round_trips() {
        let reply = ControlReply::Ack { running: true };
        let line = serde_json::to_string(&reply).expect("serialize");
        let parsed: ControlReply = serde_json::from_str(&line).expect("deserialize");
        assert_eq!(parsed, reply);
    }
}
