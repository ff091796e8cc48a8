//! Launch sequencing for the daemon process.

use std::env;
use std::sync::Arc;

use tracing::info;

use podium_config::{Config, DataPaths, RuntimePaths, SettingsStore};

use crate::controller::{
    ControllerDeps, FileStatusIndicator, LifecycleController, NoopRetentionLock,
    SubscriberRegistry,
};
use crate::engine::{EngineSupervisor, ProcessEngine};
use crate::transport::{ControlConnectionHandler, SocketListener};

use super::errors::LaunchError;
use super::guard::{HealthState, ProcessGuard};
use super::shutdown::{GateEvent, ShutdownGate, StopKind, install_signal_listener};
use super::{FOREGROUND_ENV_VAR, PROCESS_TARGET, SHUTDOWN_TIMEOUT, daemonizer};

/// Launch mode for the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
    /// Fork into the background and detach from the controlling terminal.
    Background,
    /// Remain attached to the terminal; used for debugging and tests.
    Foreground,
}

impl LaunchMode {
    /// Picks the mode from the environment unless forced to the foreground.
    #[must_use]
    pub fn detect(foreground_flag: bool) -> Self {
        if foreground_flag || env::var_os(FOREGROUND_ENV_VAR).is_some() {
            Self::Foreground
        } else {
            Self::Background
        }
    }
}

/// Runs the daemon until its lifecycle concludes.
///
/// The returned [`StopKind`] reports whether the engine run ended cleanly;
/// callers map it to the process exit code.
///
/// # Errors
///
/// Returns [`LaunchError`] when the runtime environment cannot be prepared,
/// another daemon already holds the lock, or the control socket cannot be
/// served.
pub fn run_daemon(config: &Config, mode: LaunchMode) -> Result<StopKind, LaunchError> {
    info!(
        target: PROCESS_TARGET,
        ?mode,
        socket = %config.socket(),
        "starting daemon runtime"
    );
    config.socket().prepare_filesystem()?;
    let runtime_paths = RuntimePaths::from_config(config)?;
    let mut guard = ProcessGuard::acquire(runtime_paths.clone())?;
    if matches!(mode, LaunchMode::Background) {
        daemonizer::daemonize(guard.paths())?;
    }
    guard.write_pid(std::process::id())?;
    guard.write_health(HealthState::Starting)?;

    let data_paths = DataPaths::create(config.data_dir.clone())?;
    let store = SettingsStore::open(data_paths.settings_path());
    let registry = Arc::new(SubscriberRegistry::new());
    let gate = Arc::new(ShutdownGate::new());
    let (controller, controller_handle) = LifecycleController::spawn(ControllerDeps {
        supervisor: EngineSupervisor::global(),
        backend: Arc::new(ProcessEngine::new(config.engine_binary.clone())),
        store,
        data_paths,
        registry: Arc::clone(&registry),
        retention: Arc::new(NoopRetentionLock),
        indicator: Arc::new(FileStatusIndicator::new(
            runtime_paths.status_path().to_path_buf(),
        )),
        gate: Arc::clone(&gate),
    });

    let listener = SocketListener::bind(config.socket())?;
    let handler = Arc::new(ControlConnectionHandler::new(
        Arc::clone(&controller),
        Arc::clone(&registry),
    ));
    let listener_handle = listener.start(handler)?;
    guard.write_health(HealthState::Ready)?;
    install_signal_listener(Arc::clone(&gate))?;

    let stop_kind = match gate.wait() {
        GateEvent::Stopped(kind) => kind,
        GateEvent::Signal => {
            // Give the lifecycle worker a budget to stop the engine cleanly.
            controller.request_stop();
            gate.wait_stopped(SHUTDOWN_TIMEOUT).unwrap_or(StopKind::Error)
        }
    };

    guard.write_health(HealthState::Stopping)?;
    listener_handle.shutdown();
    listener_handle.join()?;
    controller_handle.join();
    info!(
        target: PROCESS_TARGET,
        ?stop_kind,
        "shutdown sequence completed"
    );
    Ok(stop_kind)
}
