//! Shared configuration for the Podium daemon and CLI.
//!
//! Both binaries need to agree on where the control socket lives, where the
//! engine keeps its durable data, and how user settings are persisted. This
//! crate owns those concerns:
//!
//! - [`SocketEndpoint`] describes the daemon control socket (Unix or TCP).
//! - [`DataPaths`] and [`RuntimePaths`] derive the on-disk layout shared by
//!   the daemon supervisor and the CLI lifecycle commands.
//! - [`SettingsStore`] is the durable key-value store read and written from
//!   both processes.
//! - [`conf`] serializes the engine configuration document and invalidates
//!   persisted engine state when the music directory drifts.

pub mod conf;
mod config;
mod defaults;
mod fsio;
mod logging;
mod paths;
mod settings;
mod socket;

pub use config::Config;
pub use defaults::{
    DEFAULT_LOG_FILTER, DEFAULT_PORT, DEFAULT_TCP_PORT, default_data_directory,
    default_engine_binary, default_music_directory, default_socket_endpoint,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use paths::{DataPaths, PathsError, RuntimePaths};
pub use settings::{Settings, SettingsStore, SettingsStoreError};
pub use socket::{SocketEndpoint, SocketParseError, SocketPreparationError};
