//! Daemonisation backend for the `podiumd` process.

use std::ffi::OsStr;

use daemonize_me::Daemon;
use thiserror::Error;
use tracing::info;

use podium_config::RuntimePaths;

use super::PROCESS_TARGET;

/// Errors surfaced by the daemonisation backend.
#[derive(Debug, Error)]
pub enum DaemonizeError {
    /// System-level daemonisation failed.
    #[error("{0}")]
    System(#[from] daemonize_me::DaemonError),
}

/// Detaches the process into the background, rooted in the runtime directory.
pub(super) fn daemonize(paths: &RuntimePaths) -> Result<(), DaemonizeError> {
    info!(
        target: PROCESS_TARGET,
        runtime = %paths.runtime_dir().display(),
        "daemonising into background"
    );
    let mut daemon = Daemon::new();
    daemon = daemon.work_dir(paths.runtime_dir());
    daemon = daemon.name(OsStr::new(env!("CARGO_PKG_NAME")));
    daemon.start()?;
    info!(
        target: PROCESS_TARGET,
        "daemon process detached; continuing in child"
    );
    Ok(())
}
