use std::process::ExitCode;

use clap::Parser;

use podiumd::cli::DaemonArgs;
use podiumd::{LaunchMode, StopKind, run_daemon, telemetry};

fn main() -> ExitCode {
    let args = DaemonArgs::parse();
    let mode = LaunchMode::detect(args.foreground);
    let config = args.into_config();
    if let Err(error) = telemetry::initialise(&config) {
        eprintln!("podiumd: {error}");
        return ExitCode::FAILURE;
    }
    match run_daemon(&config, mode) {
        Ok(StopKind::Clean) => ExitCode::SUCCESS,
        Ok(StopKind::Error) => ExitCode::FAILURE,
        Err(error) => {
            tracing::error!(error = %error, "daemon launch failed");
            eprintln!("podiumd: {error}");
            ExitCode::FAILURE
        }
    }
}
