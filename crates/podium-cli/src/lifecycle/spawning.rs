//! Daemon process spawning.

use std::env;
use std::ffi::{OsStr, OsString};
use std::process::{Child, Command, Stdio};

use podium_config::Config;

use crate::errors::CliError;

const DAEMON_BIN_ENV_VAR: &str = "PODIUMD_BIN";

/// Spawns the daemon, forwarding the shared configuration as flags.
///
/// The binary resolves from the override, then the `PODIUMD_BIN` environment
/// variable, then the `podiumd` name on `PATH`.
///
/// # Errors
///
/// Returns [`CliError::LaunchDaemon`] when the binary cannot be spawned.
pub fn spawn_daemon(config: &Config, binary_override: Option<&OsStr>) -> Result<Child, CliError> {
    let binary = resolve_daemon_binary(binary_override);
    let mut command = Command::new(&binary);
    command
        .arg("--socket")
        .arg(config.socket().to_string())
        .arg("--data-dir")
        .arg(config.data_dir.as_str())
        .arg("--engine-binary")
        .arg(config.engine_binary.as_str())
        .arg("--log-filter")
        .arg(&config.log_filter)
        .arg("--log-format")
        .arg(config.log_format().to_string());
    command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
    command.spawn().map_err(|source| CliError::LaunchDaemon {
        binary: binary.to_string_lossy().into_owned(),
        source,
    })
}

fn resolve_daemon_binary(binary_override: Option<&OsStr>) -> OsString {
    binary_override
        .map(OsString::from)
        .or_else(|| env::var_os(DAEMON_BIN_ENV_VAR))
        .unwrap_or_else(|| OsString::from("podiumd"))
}
