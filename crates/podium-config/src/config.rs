use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::logging::LogFormat;
use crate::socket::SocketEndpoint;

/// Resolved configuration shared by the daemon and CLI binaries.
///
/// Each binary populates this from its own command-line flags, falling back
/// to the platform defaults in [`crate::defaults`]. Durable user settings
/// (music directory, port, run flags) live in the settings store instead;
/// this struct only carries process-level options.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Config {
    /// Control socket the daemon listens on and the CLI connects to.
    pub socket: SocketEndpoint,
    /// Directory holding the settings store and the engine's durable data.
    pub data_dir: Utf8PathBuf,
    /// Engine binary launched by the supervisor.
    pub engine_binary: Utf8PathBuf,
    /// Log filter expression for the daemon's tracing subscriber.
    pub log_filter: String,
    /// Log output format for the daemon.
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            socket: defaults::default_socket_endpoint(),
            data_dir: defaults::default_data_directory(),
            engine_binary: defaults::default_engine_binary(),
            log_filter: defaults::DEFAULT_LOG_FILTER.to_owned(),
            log_format: LogFormat::default(),
        }
    }
}

impl Config {
    /// Control socket endpoint.
    #[must_use]
    pub fn socket(&self) -> &SocketEndpoint {
        &self.socket
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_platform_defaults() {
        let config = Config::default();
        assert_eq!(config.log_filter(), "info");
        assert_eq!(config.log_format(), LogFormat::Compact);
        assert_eq!(config.socket, defaults::default_socket_endpoint());
    }
}
