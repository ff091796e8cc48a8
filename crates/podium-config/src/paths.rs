//! Derives on-disk layouts shared by the daemon and the CLI.
//!
//! The runtime directory houses the daemon lock, pid, health, and status
//! files. The data directory houses the settings store, the serialized engine
//! configuration, and the engine's durable state. Both binaries must agree on
//! this layout: the CLI reads artefacts written by the daemon supervisor.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

use crate::config::Config;
use crate::socket::SocketEndpoint;

#[cfg(unix)]
use dirs::runtime_dir;
#[cfg(unix)]
use libc::geteuid;

/// Canonical paths for runtime artefacts written by the daemon.
#[derive(Debug, Clone)]
pub struct RuntimePaths {
    runtime_dir: PathBuf,
    lock_path: PathBuf,
    pid_path: PathBuf,
    health_path: PathBuf,
    status_path: PathBuf,
}

impl RuntimePaths {
    /// Derives runtime paths from the shared configuration, creating the
    /// runtime directory when absent.
    ///
    /// # Errors
    ///
    /// Returns an error when the socket path has no parent or the runtime
    /// directory cannot be created.
    pub fn from_config(config: &Config) -> Result<Self, PathsError> {
        let paths = Self::from_config_readonly(config)?;
        fs::create_dir_all(&paths.runtime_dir).map_err(|source| PathsError::RuntimeDirectory {
            path: paths.runtime_dir.clone(),
            source,
        })?;
        Ok(paths)
    }

    /// Derives runtime paths without touching the filesystem.
    ///
    /// # Errors
    ///
    /// Returns an error when the socket path has no parent directory.
    pub fn from_config_readonly(config: &Config) -> Result<Self, PathsError> {
        let dir = runtime_directory(&config.socket)?;
        Ok(Self {
            lock_path: dir.join("podiumd.lock"),
            pid_path: dir.join("podiumd.pid"),
            health_path: dir.join("podiumd.health"),
            status_path: dir.join("podiumd.status"),
            runtime_dir: dir,
        })
    }

    /// Directory holding runtime artefacts.
    #[must_use]
    pub fn runtime_dir(&self) -> &Path {
        self.runtime_dir.as_path()
    }

    /// Path to the lock file guarding singleton startup.
    #[must_use]
    pub fn lock_path(&self) -> &Path {
        self.lock_path.as_path()
    }

    /// Path to the PID file.
    #[must_use]
    pub fn pid_path(&self) -> &Path {
        self.pid_path.as_path()
    }

    /// Path to the health snapshot.
    #[must_use]
    pub fn health_path(&self) -> &Path {
        self.health_path.as_path()
    }

    /// Path to the persistent status marker raised while the engine runs.
    #[must_use]
    pub fn status_path(&self) -> &Path {
        self.status_path.as_path()
    }
}

/// Durable data layout for the engine and the settings store.
#[derive(Debug, Clone)]
pub struct DataPaths {
    data_dir: Utf8PathBuf,
}

impl DataPaths {
    /// Creates the layout rooted at the given data directory, creating the
    /// directory when absent.
    ///
    /// # Errors
    ///
    /// Returns an error when the data directory cannot be created.
    pub fn create(data_dir: impl Into<Utf8PathBuf>) -> Result<Self, PathsError> {
        let data_dir = data_dir.into();
        fs::create_dir_all(data_dir.as_std_path()).map_err(|source| {
            PathsError::DataDirectory {
                path: data_dir.clone().into_std_path_buf(),
                source,
            }
        })?;
        Ok(Self { data_dir })
    }

    /// Root data directory.
    #[must_use]
    pub fn data_dir(&self) -> &Utf8Path {
        self.data_dir.as_path()
    }

    /// Path to the durable settings store.
    #[must_use]
    pub fn settings_path(&self) -> Utf8PathBuf {
        self.data_dir.join("settings.json")
    }

    /// Path the serialized engine configuration is written to.
    #[must_use]
    pub fn conf_path(&self) -> Utf8PathBuf {
        self.data_dir.join("engine.conf")
    }

    /// Path of the engine's state snapshot.
    #[must_use]
    pub fn state_path(&self) -> Utf8PathBuf {
        self.data_dir.join("state")
    }

    /// Path of the engine's database/catalogue snapshot.
    #[must_use]
    pub fn database_path(&self) -> Utf8PathBuf {
        self.data_dir.join("database")
    }

    /// Path of the engine's sticker database.
    #[must_use]
    pub fn sticker_path(&self) -> Utf8PathBuf {
        self.data_dir.join("sticker.sql")
    }

    /// Directory holding stored playlists.
    #[must_use]
    pub fn playlist_dir(&self) -> Utf8PathBuf {
        self.data_dir.join("playlists")
    }
}

fn runtime_directory(endpoint: &SocketEndpoint) -> Result<PathBuf, PathsError> {
    match endpoint {
        SocketEndpoint::Unix { path } => {
            match path.parent().filter(|parent| !parent.as_str().is_empty()) {
                Some(parent) => Ok(parent.as_std_path().to_path_buf()),
                None => Err(PathsError::MissingSocketParent {
                    path: path.to_string(),
                }),
            }
        }
        SocketEndpoint::Tcp { .. } => Ok(default_runtime_directory()),
    }
}

fn default_runtime_directory() -> PathBuf {
    #[cfg(unix)]
    {
        if let Some(mut dir) = runtime_dir() {
            dir.push("podium");
            return dir;
        }
        let mut dir = env::temp_dir();
        dir.push("podium");
        dir.push(format!("uid-{}", unsafe { geteuid() }));
        dir
    }

    #[cfg(not(unix))]
    {
        let mut dir = env::temp_dir();
        dir.push("podium");
        dir
    }
}

/// Errors raised while deriving the shared path layout.
#[derive(Debug, Error)]
pub enum PathsError {
    /// The socket path lacked a parent directory.
    #[error("socket path '{path}' has no parent directory")]
    MissingSocketParent { path: String },
    /// Creating the runtime directory failed.
    #[error("failed to prepare runtime directory '{path}': {source}")]
    RuntimeDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Creating the data directory failed.
    #[error("failed to prepare data directory '{path}': {source}")]
    DataDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
