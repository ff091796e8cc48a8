//! Serializes the engine configuration document.
//!
//! The engine reads a flat text file of `key "value"` lines with optional
//! `key { ... }` blocks. The document is rebuilt from the settings store
//! before every engine start and written atomically; the engine only ever
//! sees a complete file. Building also performs drift detection: when the
//! music directory changed since the last successful build, the persisted
//! engine state and database snapshots are deleted so stale indices are
//! never applied to a different directory.

use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::fsio::atomic_write;
use crate::paths::DataPaths;
use crate::settings::{Settings, SettingsStore, SettingsStoreError};

const CONF_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::conf");

const LOG_FILE_DEFAULT: &str = "syslog";
const LOG_LEVEL_DEFAULT: &str = "default";
const RESTORE_PAUSED_DEFAULT: &str = "yes";
const AUTO_UPDATE_DEFAULT: &str = "no";

#[cfg(unix)]
const AUDIO_OUTPUT: (&str, &str) = ("alsa", "Default audio output");
#[cfg(not(unix))]
const AUDIO_OUTPUT: (&str, &str) = ("winmm", "Default audio output");

const STREAMING_PLUGIN_NAME: &str = "soundcloud";
const STREAMING_PLUGIN_APIKEY: &str = "c4c979fd6f241b5b30431d722af212e8";

/// One entry of the configuration document.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ConfEntry {
    Scalar {
        key: String,
        value: String,
    },
    Block {
        key: String,
        entries: Vec<(String, String)>,
    },
}

/// Ordered engine configuration document.
///
/// Built fresh per engine start and never mutated after serialization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfDocument {
    entries: Vec<ConfEntry>,
}

impl ConfDocument {
    fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push(ConfEntry::Scalar {
            key: key.into(),
            value: value.into(),
        });
    }

    fn push_block<K, V, I>(&mut self, key: impl Into<String>, entries: I)
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.entries.push(ConfEntry::Block {
            key: key.into(),
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        });
    }

    /// Looks up a top-level scalar value, primarily for assertions.
    #[must_use]
    pub fn scalar(&self, key: &str) -> Option<&str> {
        self.entries.iter().find_map(|entry| match entry {
            ConfEntry::Scalar { key: k, value } if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    /// Renders the document in the engine's text layout.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            match entry {
                ConfEntry::Scalar { key, value } => {
                    out.push_str(key);
                    out.push_str(" \"");
                    out.push_str(value);
                    out.push_str("\"\n");
                }
                ConfEntry::Block { key, entries } => {
                    out.push_str(key);
                    out.push_str(" {\n");
                    for (k, v) in entries {
                        out.push(' ');
                        out.push_str(k);
                        out.push_str(" \"");
                        out.push_str(v);
                        out.push_str("\"\n");
                    }
                    out.push_str("}\n");
                }
            }
        }
        out
    }
}

/// Builds the configuration document from the current settings.
///
/// The function is deterministic: the same settings and layout always produce
/// the same document. Missing settings fall back to the fixed defaults. The
/// playlist directory entry is emitted only when the directory exists or can
/// be created.
#[must_use]
pub fn build(settings: &Settings, paths: &DataPaths) -> ConfDocument {
    let mut document = ConfDocument::default();

    let playlist_dir = paths.playlist_dir();
    if fs::create_dir_all(playlist_dir.as_std_path()).is_ok()
        || playlist_dir.as_std_path().is_dir()
    {
        document.push("playlist_directory", playlist_dir.as_str());
    }
    document.push("db_file", paths.database_path().as_str());
    document.push("sticker_file", paths.sticker_path().as_str());
    document.push("state_file", paths.state_path().as_str());
    document.push("log_file", LOG_FILE_DEFAULT);

    document.push("log_level", LOG_LEVEL_DEFAULT);
    document.push("restore_paused", RESTORE_PAUSED_DEFAULT);
    document.push("auto_update", AUTO_UPDATE_DEFAULT);

    document.push("music_directory", settings.music_directory.as_str());
    document.push("port", settings.port.as_str());

    let (output_type, output_name) = AUDIO_OUTPUT;
    document.push_block("audio_output", [("type", output_type), ("name", output_name)]);
    document.push_block("input", [("plugin", "curl")]);
    document.push_block(
        "playlist_plugin",
        [
            ("name", STREAMING_PLUGIN_NAME),
            ("enabled", "true"),
            ("apikey", STREAMING_PLUGIN_APIKEY),
        ],
    );

    document
}

/// Deletes stale engine state when the music directory changed since the
/// last build and records the new directory as "last used".
///
/// The state and database snapshots are invalidated together as a unit; a
/// rebuild with an unchanged directory performs no deletion.
///
/// # Errors
///
/// Returns an error when the settings store cannot be updated or a stale
/// snapshot cannot be removed.
pub fn invalidate_drift(
    store: &SettingsStore,
    settings: &Settings,
    paths: &DataPaths,
) -> Result<(), ConfError> {
    let current = &settings.music_directory;
    if settings.last_music_directory.as_deref() == Some(current.as_path()) {
        return Ok(());
    }

    info!(
        target: CONF_TARGET,
        directory = %current,
        "music directory changed; invalidating engine state and database"
    );
    remove_snapshot(&paths.state_path())?;
    remove_snapshot(&paths.database_path())?;
    store.update(|settings| {
        settings.last_music_directory = Some(current.clone());
    })?;
    Ok(())
}

fn remove_snapshot(path: &Utf8Path) -> Result<(), ConfError> {
    match fs::remove_file(path.as_std_path()) {
        Ok(()) => {
            debug!(target: CONF_TARGET, path = %path, "stale snapshot removed");
            Ok(())
        }
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(ConfError::Invalidate {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Serializes the document and persists it atomically.
///
/// # Errors
///
/// Returns an error on any I/O failure; callers treat that as a failed
/// engine start rather than a fatal fault.
pub fn write(document: &ConfDocument, path: &Utf8Path) -> Result<(), ConfError> {
    atomic_write(path.as_std_path(), document.render().as_bytes()).map_err(|source| {
        ConfError::Write {
            path: path.to_path_buf(),
            source,
        }
    })
}

/// Rebuilds and persists the engine configuration from the settings store.
///
/// Runs before every engine start: loads the settings fresh, applies drift
/// invalidation, builds the document, and writes it to the fixed path the
/// engine reads. Returns that path on success.
///
/// # Errors
///
/// Returns an error when the settings cannot be loaded, drift invalidation
/// fails, or the document cannot be written.
pub fn reload(store: &SettingsStore, paths: &DataPaths) -> Result<Utf8PathBuf, ConfError> {
    let settings = store.load()?;
    invalidate_drift(store, &settings, paths)?;
    let document = build(&settings, paths);
    let conf_path = paths.conf_path();
    write(&document, &conf_path)?;
    debug!(target: CONF_TARGET, path = %conf_path, "engine configuration serialized");
    Ok(conf_path)
}

/// Errors raised while serializing the engine configuration.
#[derive(Debug, Error)]
pub enum ConfError {
    /// The settings store failed.
    #[error(transparent)]
    Settings(#[from] SettingsStoreError),
    /// Removing a stale engine snapshot failed.
    #[error("failed to remove stale engine snapshot '{path}': {source}")]
    Invalidate {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    /// Writing the configuration document failed.
    #[error("failed to write engine configuration '{path}': {source}")]
    Write {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
}
