//! Durable user settings shared across the daemon and CLI processes.
//!
//! The store is a JSON document on disk. Reads always reload from disk and
//! writes persist atomically, so the two processes may interleave freely;
//! conflicting writers resolve as last-writer-wins per save, which the
//! control plane tolerates.

use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::defaults;
use crate::fsio::atomic_write;

const SETTINGS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::settings");

/// User settings consumed by the config serializer and the reconciler.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Settings {
    /// Directory the engine scans for music.
    #[serde(default = "defaults::default_music_directory")]
    pub music_directory: Utf8PathBuf,
    /// Engine listening port, kept as text so invalid input survives a
    /// round-trip and can be reported back to the user.
    #[serde(default = "default_port")]
    pub port: String,
    /// Whether the controller holds a power-retention lock while running.
    #[serde(default)]
    pub wakelock: bool,
    /// Desired-state flag: the engine should be running now.
    #[serde(default)]
    pub run: bool,
    /// Desired-state flag: start the engine when the host boots.
    #[serde(default)]
    pub run_on_boot: bool,
    /// Music directory used for the last successful config build. Internal
    /// drift marker; never edited by users.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_music_directory: Option<Utf8PathBuf>,
    /// Unknown keys are preserved so older and newer binaries can share the
    /// same store.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_port() -> String {
    defaults::DEFAULT_PORT.to_owned()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            music_directory: defaults::default_music_directory(),
            port: default_port(),
            wakelock: false,
            run: false,
            run_on_boot: false,
            last_music_directory: None,
            extra: Map::new(),
        }
    }
}

/// Handle to the settings document on disk.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: Utf8PathBuf,
}

impl SettingsStore {
    /// Opens a store backed by the given path. The file need not exist yet.
    #[must_use]
    pub fn open(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing document.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        self.path.as_path()
    }

    /// Loads the current settings, substituting defaults when the store does
    /// not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read or parsed.
    pub fn load(&self) -> Result<Settings, SettingsStoreError> {
        match fs::read_to_string(self.path.as_std_path()) {
            Ok(contents) => {
                serde_json::from_str(&contents).map_err(|source| SettingsStoreError::Parse {
                    path: self.path.clone(),
                    source,
                })
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(Settings::default()),
            Err(source) => Err(SettingsStoreError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Persists the settings atomically.
    ///
    /// # Errors
    ///
    /// Returns an error when serialization or the atomic write fails.
    pub fn save(&self, settings: &Settings) -> Result<(), SettingsStoreError> {
        let payload =
            serde_json::to_vec_pretty(settings).map_err(|source| SettingsStoreError::Serialize {
                path: self.path.clone(),
                source,
            })?;
        atomic_write(self.path.as_std_path(), &payload).map_err(|source| {
            SettingsStoreError::Write {
                path: self.path.clone(),
                source,
            }
        })?;
        debug!(target: SETTINGS_TARGET, path = %self.path, "settings persisted");
        Ok(())
    }

    /// Applies a mutation to the freshly loaded settings and persists the
    /// result, returning the updated document.
    ///
    /// # Errors
    ///
    /// Returns an error when loading or saving fails.
    pub fn update<F>(&self, mutate: F) -> Result<Settings, SettingsStoreError>
    where
        F: FnOnce(&mut Settings),
    {
        let mut settings = self.load()?;
        mutate(&mut settings);
        self.save(&settings)?;
        Ok(settings)
    }
}

/// Errors raised by the settings store.
#[derive(Debug, Error)]
pub enum SettingsStoreError {
    /// Reading the document failed.
    #[error("failed to read settings '{path}': {source}")]
    Read {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    /// The document contained invalid JSON.
    #[error("failed to parse settings '{path}': {source}")]
    Parse {
        path: Utf8PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// Serializing the document failed.
    #[error("failed to serialize settings '{path}': {source}")]
    Serialize {
        path: Utf8PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// Writing the document failed.
    #[error("failed to write settings '{path}': {source}")]
    Write {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> SettingsStore {
        let path = Utf8PathBuf::from_path_buf(dir.path().join("settings.json"))
            .expect("utf8 settings path");
        SettingsStore::open(path)
    }

    #[test]
    fn missing_store_yields_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let settings = store_in(&dir).load().expect("load defaults");
        assert_eq!(settings.port, "6600");
        assert!(!settings.run);
        assert!(settings.last_music_directory.is_none());
    }

    #[test]
    fn save_and_reload_round_trips() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = store_in(&dir);
        let updated = store
            .update(|settings| {
                settings.music_directory = Utf8PathBuf::from("/srv/music");
                settings.run = true;
            })
            .expect("update settings");
        assert!(updated.run);

        let reloaded = store.load().expect("reload");
        assert_eq!(reloaded, updated);
    }

    #[test]
    fn unknown_keys_survive_a_round_trip() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = store_in(&dir);
        fs::write(
            store.path().as_std_path(),
            br#"{"port":"7700","future_flag":true}"#,
        )
        .expect("seed store");

        let updated = store
            .update(|settings| settings.run = true)
            .expect("update settings");
        assert_eq!(updated.port, "7700");

        let raw = fs::read_to_string(store.path().as_std_path()).expect("read raw");
        assert!(raw.contains("future_flag"), "unknown key was dropped");
    }

    #[test]
    fn last_writer_wins_per_save() {
        let dir = tempfile::tempdir().expect("temp dir");
        let writer_a = store_in(&dir);
        let writer_b = store_in(&dir);
        writer_a
            .update(|settings| settings.port = "7000".to_owned())
            .expect("writer a");
        writer_b
            .update(|settings| settings.port = "8000".to_owned())
            .expect("writer b");
        assert_eq!(writer_a.load().expect("reload").port, "8000");
    }

    #[test]
    fn corrupt_store_reports_parse_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = store_in(&dir);
        fs::write(store.path().as_std_path(), b"{not json").expect("seed store");
        assert!(matches!(
            store.load(),
            Err(SettingsStoreError::Parse { .. })
        ));
    }
}
