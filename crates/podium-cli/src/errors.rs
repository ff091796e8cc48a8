//! Error surface of the control CLI.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use podium_config::{PathsError, SettingsStoreError};

/// Errors surfaced by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// Reading or writing the settings store failed.
    #[error("settings store failure: {source}")]
    Settings {
        /// Underlying store error.
        #[from]
        source: SettingsStoreError,
    },
    /// Deriving the shared path layout failed.
    #[error("failed to derive runtime layout: {source}")]
    Paths {
        /// Underlying layout error.
        #[from]
        source: PathsError,
    },
    /// The configured music directory failed validation.
    #[error("music directory '{path}' is not a readable directory")]
    InvalidMusicDirectory {
        /// Rejected directory.
        path: String,
    },
    /// The configured engine port failed validation.
    #[error("port '{port}' is not in the unprivileged range 1024-65535")]
    InvalidPort {
        /// Rejected port value.
        port: String,
    },
    /// Spawning the daemon binary failed.
    #[error("failed to launch daemon '{binary}': {source}")]
    LaunchDaemon {
        /// Binary that failed to spawn.
        binary: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The spawned daemon exited before reporting readiness.
    #[error("daemon exited during startup with status {exit_status:?}")]
    StartupFailed {
        /// Exit status when available.
        exit_status: Option<i32>,
    },
    /// The daemon did not become ready in time.
    #[error("daemon did not become ready within {timeout_ms}ms (health file: '{health_path}')")]
    StartupTimeout {
        /// Health file that was polled.
        health_path: PathBuf,
        /// Polling budget in milliseconds.
        timeout_ms: u64,
    },
    /// Monitoring the spawned daemon failed.
    #[error("failed to monitor daemon child process: {source}")]
    MonitorChild {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Reading a runtime artefact failed.
    #[error("failed to read runtime file '{path}': {source}")]
    ReadRuntimeFile {
        /// File that failed to read.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// A runtime artefact held malformed content.
    #[error("malformed runtime file '{path}'")]
    ParseRuntimeFile {
        /// File with unparseable content.
        path: PathBuf,
    },
    /// Connecting to or exchanging with the control socket failed.
    #[error("control socket '{endpoint}' failure: {source}")]
    ControlSocket {
        /// Endpoint that failed.
        endpoint: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The daemon replied with a protocol-level error.
    #[error("daemon rejected request: {message}")]
    DaemonError {
        /// Message carried by the error reply.
        message: String,
    },
    /// The daemon sent a reply that does not fit the protocol.
    #[error("unexpected reply from daemon: {reply}")]
    UnexpectedReply {
        /// Offending reply line.
        reply: String,
    },
    /// The engine did not reach the expected state in time.
    #[error("engine did not report '{expected}' within {timeout:?}")]
    LifecycleTimeout {
        /// Event that was awaited.
        expected: &'static str,
        /// Waiting budget.
        timeout: Duration,
    },
    /// The engine reported a failed start.
    #[error("engine failed to start")]
    EngineFailed,
    /// Reconciliation kept oscillating without settling.
    #[error("reconciliation did not settle after {steps} steps")]
    ReconcileDiverged {
        /// Steps taken before giving up.
        steps: usize,
    },
    /// Sending a hard-kill signal failed.
    #[error("failed to signal daemon process {pid}: {source}")]
    SignalFailed {
        /// PID that could not be signalled.
        pid: u32,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
    /// The daemon did not shut down in time.
    #[error("daemon did not shut down within {timeout:?} (pid file: '{pid_path}')")]
    ShutdownTimeout {
        /// PID file that was polled.
        pid_path: PathBuf,
        /// Waiting budget.
        timeout: Duration,
    },
    /// Writing command output failed.
    #[error("failed to write output: {source}")]
    Io {
        /// Underlying IO error.
        #[from]
        source: io::Error,
    },
    /// Signalling is unavailable on this platform.
    #[error("process signalling is unsupported on this platform")]
    UnsupportedPlatform,
}
