//! Command-line surface of the daemon binary.

use camino::Utf8PathBuf;
use clap::Parser;

use podium_config::{Config, LogFormat, SocketEndpoint};

/// Engine supervisor daemon.
#[derive(Debug, Parser)]
#[command(name = "podiumd", version, about = "Supervises the audio engine")]
pub struct DaemonArgs {
    /// Control socket endpoint (`unix:<path>` or `tcp:<host>:<port>`).
    #[arg(long)]
    pub socket: Option<SocketEndpoint>,

    /// Directory holding settings and the engine's durable data.
    #[arg(long)]
    pub data_dir: Option<Utf8PathBuf>,

    /// Engine binary to launch.
    #[arg(long)]
    pub engine_binary: Option<Utf8PathBuf>,

    /// Log filter expression, e.g. `info` or `podiumd=debug`.
    #[arg(long)]
    pub log_filter: Option<String>,

    /// Log output format (`compact` or `json`).
    #[arg(long)]
    pub log_format: Option<LogFormat>,

    /// Stay attached to the terminal instead of daemonising.
    #[arg(long)]
    pub foreground: bool,
}

impl DaemonArgs {
    /// Resolves the process configuration, falling back to platform
    /// defaults for unset flags.
    #[must_use]
    pub fn into_config(self) -> Config {
        let mut config = Config::default();
        if let Some(socket) = self.socket {
            config.socket = socket;
        }
        if let Some(data_dir) = self.data_dir {
            config.data_dir = data_dir;
        }
        if let Some(engine_binary) = self.engine_binary {
            config.engine_binary = engine_binary;
        }
        if let Some(log_filter) = self.log_filter {
            config.log_filter = log_filter;
        }
        if let Some(log_format) = self.log_format {
            config.log_format = log_format;
        }
        config
    }
}
