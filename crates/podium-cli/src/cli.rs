//! Command-line surface of the control binary.

use std::ffi::OsString;

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand, ValueEnum};

use podium_config::{Config, LogFormat, SocketEndpoint};

/// Control client for the engine supervisor daemon.
#[derive(Debug, Parser)]
#[command(name = "podium", version, about = "Controls the audio engine daemon")]
pub struct CliArgs {
    /// Control socket endpoint (`unix:<path>` or `tcp:<host>:<port>`).
    #[arg(long, global = true)]
    pub socket: Option<SocketEndpoint>,

    /// Directory holding settings and the engine's durable data.
    #[arg(long, global = true)]
    pub data_dir: Option<Utf8PathBuf>,

    /// Engine binary the daemon should launch.
    #[arg(long, global = true)]
    pub engine_binary: Option<Utf8PathBuf>,

    /// Daemon binary to spawn when none is running.
    #[arg(long, global = true)]
    pub daemon_binary: Option<OsString>,

    /// Log filter forwarded to spawned daemons, e.g. `info`.
    #[arg(long, global = true)]
    pub log_filter: Option<String>,

    /// Log output format forwarded to spawned daemons.
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: CliCommand,
}

impl CliArgs {
    /// Resolves the shared configuration, falling back to platform defaults
    /// for unset flags.
    #[must_use]
    pub fn to_config(&self) -> Config {
        let mut config = Config::default();
        if let Some(socket) = &self.socket {
            config.socket = socket.clone();
        }
        if let Some(data_dir) = &self.data_dir {
            config.data_dir = data_dir.clone();
        }
        if let Some(engine_binary) = &self.engine_binary {
            config.engine_binary = engine_binary.clone();
        }
        if let Some(log_filter) = &self.log_filter {
            config.log_filter = log_filter.clone();
        }
        if let Some(log_format) = self.log_format {
            config.log_format = log_format;
        }
        config
    }
}

/// On/off switch argument shared by toggle commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Switch {
    /// Enable.
    On,
    /// Disable.
    Off,
}

impl Switch {
    /// Boolean view of the switch.
    #[must_use]
    pub fn is_on(self) -> bool {
        matches!(self, Self::On)
    }
}

/// Commands accepted by the control binary.
#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Start or stop the engine now.
    Run {
        /// Desired engine state.
        #[arg(value_enum)]
        switch: Switch,
    },
    /// Enable or disable starting the engine at host boot.
    Boot {
        /// Desired boot behaviour.
        #[arg(value_enum)]
        switch: Switch,
    },
    /// Change a persisted setting, restarting a running engine when needed.
    #[command(subcommand)]
    Set(SetCommand),
    /// Report the daemon and engine state.
    Status,
    /// Terminate the daemon immediately, bypassing a clean engine stop.
    Kill,
    /// Stream lifecycle events until interrupted.
    Watch,
    /// Reconcile the boot-time desired state; meant for init hooks.
    BootSync,
}

/// Persisted settings editable from the command line.
#[derive(Debug, Subcommand)]
pub enum SetCommand {
    /// Directory the engine scans for music.
    MusicDirectory {
        /// New directory.
        path: Utf8PathBuf,
    },
    /// Engine listening port (1024-65535).
    Port {
        /// New port.
        port: String,
    },
    /// Whether the daemon holds a power-retention lock while running.
    Wakelock {
        /// Desired lock behaviour.
        #[arg(value_enum)]
        switch: Switch,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_flags_override_platform_defaults() {
        let args = CliArgs::parse_from([
            "podium",
            "--socket",
            "tcp:localhost:7711",
            "--data-dir",
            "/var/lib/podium",
            "status",
        ]);
        let config = args.to_config();
        assert_eq!(config.socket, SocketEndpoint::tcp("localhost", 7711));
        assert_eq!(config.data_dir, Utf8PathBuf::from("/var/lib/podium"));
        assert!(matches!(args.command, CliCommand::Status));
    }

    #[test]
    fn toggle_commands_parse_switches() {
        let args = CliArgs::parse_from(["podium", "run", "on"]);
        assert!(matches!(
            args.command,
            CliCommand::Run { switch: Switch::On }
        ));

        let args = CliArgs::parse_from(["podium", "set", "wakelock", "off"]);
        assert!(matches!(
            args.command,
            CliCommand::Set(SetCommand::Wakelock {
                switch: Switch::Off
            })
        ));
    }

    #[test]
    fn set_port_accepts_raw_text() {
        let args = CliArgs::parse_from(["podium", "set", "port", "6600"]);
        match args.command {
            CliCommand::Set(SetCommand::Port { port }) => assert_eq!(port, "6600"),
            other => panic!("expected set port, got: {other:?}"),
        }
    }

    #[test]
    fn global_flags_may_follow_the_subcommand() {
        let args = CliArgs::parse_from(["podium", "run", "on", "--log-filter", "debug"]);
        assert_eq!(args.log_filter.as_deref(), Some("debug"));
    }
}
