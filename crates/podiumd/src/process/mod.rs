//! Process supervision: singleton guard, daemonisation, and shutdown.

use std::time::Duration;

mod daemonizer;
mod errors;
mod guard;
mod launch;
mod shutdown;

pub use errors::LaunchError;
pub use launch::{LaunchMode, run_daemon};
pub use shutdown::{GateEvent, ShutdownError, ShutdownGate, StopKind};

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");
pub(crate) const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);
pub(crate) const FOREGROUND_ENV_VAR: &str = "PODIUMD_FOREGROUND";
