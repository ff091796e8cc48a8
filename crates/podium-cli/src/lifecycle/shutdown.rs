//! Daemon shutdown helpers.

use std::thread;
use std::time::Instant;

use podium_config::{RuntimePaths, SocketEndpoint};

use crate::errors::CliError;

use super::socket::socket_is_reachable;
use super::{POLL_INTERVAL, SHUTDOWN_TIMEOUT};

#[cfg(unix)]
use std::io;

/// Waits until the pid file is gone and the socket stops answering.
///
/// # Errors
///
/// Returns [`CliError::ShutdownTimeout`] when the daemon is still up after
/// the waiting budget.
pub fn wait_for_shutdown(
    paths: &RuntimePaths,
    endpoint: &SocketEndpoint,
) -> Result<(), CliError> {
    let deadline = Instant::now() + SHUTDOWN_TIMEOUT;
    while Instant::now() < deadline {
        let pid_exists = paths.pid_path().exists();
        let socket_busy = socket_is_reachable(endpoint)?;
        if !pid_exists && !socket_busy {
            return Ok(());
        }
        thread::sleep(POLL_INTERVAL);
    }
    Err(CliError::ShutdownTimeout {
        pid_path: paths.pid_path().to_path_buf(),
        timeout: SHUTDOWN_TIMEOUT,
    })
}

/// Forcibly terminates the daemon process with SIGKILL.
///
/// Last resort when the control protocol stops answering; a vanished process
/// counts as success.
///
/// # Errors
///
/// Returns [`CliError::SignalFailed`] when the signal cannot be delivered
/// and [`CliError::UnsupportedPlatform`] where signalling is unavailable.
pub fn hard_kill_daemon(pid: u32) -> Result<(), CliError> {
    #[cfg(unix)]
    {
        // SAFETY: kill(2) is memory-safe for arbitrary PIDs; the kernel
        // rejects invalid targets with an error return.
        let result = unsafe { libc::kill(pid as libc::pid_t, libc::SIGKILL) };
        if result == 0 {
            return Ok(());
        }
        let source = io::Error::last_os_error();
        if source.raw_os_error() == Some(libc::ESRCH) {
            return Ok(());
        }
        Err(CliError::SignalFailed { pid, source })
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        Err(CliError::UnsupportedPlatform)
    }
}
