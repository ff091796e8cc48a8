//! Control client for the engine supervisor daemon.
//!
//! The binary delegates to [`run`], which parses arguments, initialises
//! telemetry, and executes one command against the daemon's control socket.
//! Commands reconcile the observed engine state against the persisted
//! settings rather than fire-and-forget, so a successful exit means the
//! desired state was actually reached.

use std::ffi::OsString;
use std::io::{self, IsTerminal, Write};
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

pub mod cli;
pub mod client;
pub mod commands;
pub mod errors;
pub mod lifecycle;
pub mod reconcile;

pub use cli::{CliArgs, CliCommand};
pub use client::{ControlClient, EventSubscription};
pub use errors::CliError;
pub use reconcile::{ClientState, Reconciler};

use podium_config::Config;

/// Parses arguments and executes one command, reporting on the writers.
pub fn run<I, T, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
    W: Write,
    E: Write,
{
    let args = match CliArgs::try_parse_from(args) {
        Ok(args) => args,
        Err(error) => {
            // Help and version render on stdout and exit successfully.
            if error.use_stderr() {
                let _ = write!(stderr, "{error}");
                return ExitCode::FAILURE;
            }
            let _ = write!(stdout, "{error}");
            return ExitCode::SUCCESS;
        }
    };

    let config = args.to_config();
    init_telemetry(&config);
    let reconciler = match Reconciler::new(config, args.daemon_binary.clone()) {
        Ok(reconciler) => reconciler,
        Err(error) => {
            let _ = writeln!(stderr, "error: {error}");
            return ExitCode::FAILURE;
        }
    };

    match commands::dispatch(args.command, &reconciler, stdout, stderr) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            let _ = writeln!(stderr, "error: {error}");
            ExitCode::FAILURE
        }
    }
}

/// Best-effort subscriber installation; the CLI stays quiet unless the
/// filter opts into its targets.
fn init_telemetry(config: &Config) {
    let filter =
        EnvFilter::try_new(config.log_filter()).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .compact()
        .try_init();
}
