//! Default values shared by the daemon and CLI binaries.

use std::env;

use camino::Utf8PathBuf;

use crate::socket::SocketEndpoint;

#[cfg(unix)]
use dirs::{audio_dir, data_dir, runtime_dir};
#[cfg(unix)]
use libc::geteuid;

/// Default TCP port used when Unix domain sockets are unavailable.
pub const DEFAULT_TCP_PORT: u16 = 6601;

/// Default engine listening port written into the engine configuration.
pub const DEFAULT_PORT: &str = "6600";

/// Default log filter expression used by the daemon.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Resolves the engine binary, honouring the `PODIUM_ENGINE_BIN` override.
#[must_use]
pub fn default_engine_binary() -> Utf8PathBuf {
    env::var("PODIUM_ENGINE_BIN")
        .map(Utf8PathBuf::from)
        .unwrap_or_else(|_| Utf8PathBuf::from("mpd"))
}

/// Computes the default control socket endpoint for the daemon.
#[must_use]
pub fn default_socket_endpoint() -> SocketEndpoint {
    default_socket_endpoint_inner()
}

#[cfg(unix)]
fn default_socket_endpoint_inner() -> SocketEndpoint {
    let (mut base, apply_namespace) = match runtime_base_directory() {
        Some(dir) => (dir, false),
        None => (fallback_base_directory(), true),
    };

    base.push("podium");
    if apply_namespace {
        base.push(user_namespace());
    }

    SocketEndpoint::unix(base.join("podiumd.sock"))
}

#[cfg(not(unix))]
fn default_socket_endpoint_inner() -> SocketEndpoint {
    SocketEndpoint::tcp("127.0.0.1", DEFAULT_TCP_PORT)
}

/// Directory holding the engine's durable data and the settings store.
#[must_use]
pub fn default_data_directory() -> Utf8PathBuf {
    #[cfg(unix)]
    {
        if let Some(dir) = data_dir().and_then(|path| Utf8PathBuf::from_path_buf(path).ok()) {
            return dir.join("podium");
        }
    }
    fallback_base_directory().join("podium-data")
}

/// Default music directory scanned by the engine.
#[must_use]
pub fn default_music_directory() -> Utf8PathBuf {
    #[cfg(unix)]
    {
        if let Some(dir) = audio_dir().and_then(|path| Utf8PathBuf::from_path_buf(path).ok()) {
            return dir;
        }
    }
    fallback_base_directory().join("music")
}

#[cfg(unix)]
fn runtime_base_directory() -> Option<Utf8PathBuf> {
    runtime_dir().and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
}

fn fallback_base_directory() -> Utf8PathBuf {
    let candidate = env::temp_dir();
    Utf8PathBuf::from_path_buf(candidate).unwrap_or_else(|_| Utf8PathBuf::from("/tmp"))
}

#[cfg(unix)]
fn user_namespace() -> String {
    let uid = unsafe { geteuid() };
    format!("uid-{uid}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_endpoint_is_namespaced_per_user() {
        let endpoint = default_socket_endpoint();
        #[cfg(unix)]
        {
            let path = endpoint.unix_path().expect("unix endpoint by default");
            assert!(path.as_str().contains("podium"));
            assert!(path.as_str().ends_with("podiumd.sock"));
        }
        #[cfg(not(unix))]
        assert!(matches!(endpoint, SocketEndpoint::Tcp { .. }));
    }

    #[test]
    fn data_directory_ends_with_project_name() {
        let dir = default_data_directory();
        assert!(dir.as_str().contains("podium"));
    }
}
