//! Readiness monitoring via the daemon's health and pid files.

use std::fs;
use std::io;
use std::path::Path;
use std::process::Child;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use podium_config::RuntimePaths;

use crate::errors::CliError;

use super::POLL_INTERVAL;

/// Operational state the daemon publishes in its health snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DaemonStatus {
    /// Initialising; not yet accepting control connections.
    Starting,
    /// Fully operational.
    Ready,
    /// Shutting down.
    Stopping,
}

impl std::fmt::Display for DaemonStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Starting => f.write_str("starting"),
            Self::Ready => f.write_str("ready"),
            Self::Stopping => f.write_str("stopping"),
        }
    }
}

/// Health snapshot written by the daemon supervisor.
#[derive(Debug, PartialEq, Eq, serde::Deserialize)]
pub struct HealthSnapshot {
    /// Current daemon state.
    pub status: DaemonStatus,
    /// PID of the daemon process.
    pub pid: u32,
    /// Seconds since the epoch when the snapshot was written.
    pub timestamp: u64,
}

/// Reads the health snapshot; absent files yield `None`.
///
/// # Errors
///
/// Returns [`CliError`] when the file cannot be read or parsed.
pub fn read_health(path: &Path) -> Result<Option<HealthSnapshot>, CliError> {
    let Some(content) = read_optional(path)? else {
        return Ok(None);
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|_| CliError::ParseRuntimeFile {
            path: path.to_path_buf(),
        })
}

/// Reads the daemon PID; absent or empty files yield `None`.
///
/// # Errors
///
/// Returns [`CliError`] when the file cannot be read or holds a non-integer.
pub fn read_pid(path: &Path) -> Result<Option<u32>, CliError> {
    let Some(content) = read_optional(path)? else {
        return Ok(None);
    };
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<u32>()
        .map(Some)
        .map_err(|_| CliError::ParseRuntimeFile {
            path: path.to_path_buf(),
        })
}

fn read_optional(path: &Path) -> Result<Option<String>, CliError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(CliError::ReadRuntimeFile {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Waits for a freshly spawned daemon to publish a ready health snapshot.
///
/// The spawned child normally daemonises, so a clean child exit just means
/// the daemon continues under a new PID; snapshot freshness is then judged
/// by timestamp alone.
///
/// # Errors
///
/// Returns [`CliError::StartupFailed`] when the child exits with an error,
/// [`CliError::StartupTimeout`] when the budget expires, and propagation of
/// any health-file read failure.
pub fn wait_for_ready(
    paths: &RuntimePaths,
    child: &mut Child,
    started_at: SystemTime,
    timeout: Duration,
) -> Result<HealthSnapshot, CliError> {
    let deadline = Instant::now() + timeout;
    let expected_pid = child.id();
    let mut daemonized = false;
    let started_secs = started_at
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0);

    while Instant::now() < deadline {
        if let Some(status) = child
            .try_wait()
            .map_err(|source| CliError::MonitorChild { source })?
        {
            if !status.success() {
                return Err(CliError::StartupFailed {
                    exit_status: status.code(),
                });
            }
            daemonized = true;
        }

        if let Some(snapshot) = read_health(paths.health_path())? {
            let pid_ok = daemonized || snapshot.pid == expected_pid;
            // Snapshot timestamps have second precision; accept anything
            // written in or after the launch second.
            let fresh = snapshot.timestamp >= started_secs;
            if pid_ok && fresh && snapshot.status == DaemonStatus::Ready {
                return Ok(snapshot);
            }
        }
        thread::sleep(POLL_INTERVAL);
    }
    Err(CliError::StartupTimeout {
        health_path: paths.health_path().to_path_buf(),
        timeout_ms: timeout.as_millis() as u64,
    })
}
