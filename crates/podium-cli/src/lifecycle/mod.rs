//! Daemon lifecycle plumbing: spawning, readiness, probing, and shutdown.

use std::time::Duration;

mod monitoring;
mod shutdown;
mod socket;
mod spawning;

pub use monitoring::{DaemonStatus, HealthSnapshot, read_health, read_pid, wait_for_ready};
pub use shutdown::{hard_kill_daemon, wait_for_shutdown};
pub use socket::socket_is_reachable;
pub use spawning::spawn_daemon;

pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(200);
pub(crate) const READY_TIMEOUT: Duration = Duration::from_secs(10);
pub(crate) const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);
