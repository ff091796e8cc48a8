//! Backends that produce a runnable engine instance.

use std::io;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use camino::{Utf8Path, Utf8PathBuf};
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use thiserror::Error;
use tracing::{info, warn};

use super::ENGINE_TARGET;

/// A launched engine ready to execute.
///
/// `run` blocks the calling thread until the engine exits and yields its exit
/// status; `quit` requests a graceful shutdown from another thread.
pub struct LaunchedEngine {
    pub run: Box<dyn FnOnce() -> i32 + Send>,
    pub quit: Arc<dyn Fn() + Send + Sync>,
}

/// Errors surfaced while launching an engine instance.
#[derive(Debug, Error)]
pub enum EngineLaunchError {
    /// Spawning the engine binary failed.
    #[error("failed to spawn engine binary '{binary}': {source}")]
    Spawn {
        /// Configured engine binary.
        binary: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Produces engine instances bound to a rendered configuration document.
pub trait EngineBackend: Send + Sync {
    /// Launches the engine against the given configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`EngineLaunchError`] when the engine cannot be brought up.
    fn launch(&self, conf_path: &Utf8Path) -> Result<LaunchedEngine, EngineLaunchError>;
}

/// Backend that runs the engine as a child process.
///
/// The child receives the configuration path as its sole argument and runs
/// with `--no-daemon` so its lifetime stays coupled to the supervisor thread.
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    binary: Utf8PathBuf,
}

impl ProcessEngine {
    /// Builds a backend around the configured engine binary.
    #[must_use]
    pub fn new(binary: Utf8PathBuf) -> Self {
        Self { binary }
    }
}

impl EngineBackend for ProcessEngine {
    fn launch(&self, conf_path: &Utf8Path) -> Result<LaunchedEngine, EngineLaunchError> {
        let mut child = Command::new(self.binary.as_std_path())
            .arg("--no-daemon")
            .arg(conf_path.as_std_path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| EngineLaunchError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;
        let child_pid = child.id();
        info!(
            target: ENGINE_TARGET,
            binary = %self.binary,
            pid = child_pid,
            conf = %conf_path,
            "engine process spawned"
        );

        let quit_requested = Arc::new(AtomicBool::new(false));
        let quit_flag = Arc::clone(&quit_requested);
        let quit: Arc<dyn Fn() + Send + Sync> = Arc::new(move || {
            quit_flag.store(true, Ordering::SeqCst);
            match kill(Pid::from_raw(child_pid as i32), Signal::SIGTERM) {
                Ok(()) => {}
                Err(nix::errno::Errno::ESRCH) => {}
                Err(errno) => {
                    warn!(
                        target: ENGINE_TARGET,
                        pid = child_pid,
                        error = %errno,
                        "failed to signal engine process"
                    );
                }
            }
        });

        let run = Box::new(move || {
            let status = match child.wait() {
                Ok(status) => status,
                Err(error) => {
                    warn!(
                        target: ENGINE_TARGET,
                        pid = child_pid,
                        error = %error,
                        "failed to await engine process"
                    );
                    return 1;
                }
            };
            match status.code() {
                Some(code) => code,
                // Signal-death after a quit request is an orderly exit.
                None if quit_requested.load(Ordering::SeqCst) => 0,
                None => 1,
            }
        });

        Ok(LaunchedEngine { run, quit })
    }
}
