//! Drives the reconciliation machine against a live daemon.
//!
//! The machine decides; the driver observes and executes. Each loop
//! iteration feeds one observation (connection outcome, lifecycle event, or
//! timer expiry) into [`machine::step`] and performs the returned actions
//! until the state settles against the desired state.

use std::ffi::OsString;
use std::time::{Duration, SystemTime};

use podium_config::{Config, DataPaths, RuntimePaths, SettingsStore};
use podium_daemon_types::{ControlRequest, LifecycleEvent};
use tracing::debug;

use crate::client::{ControlClient, EventSubscription};
use crate::errors::CliError;
use crate::lifecycle::{
    READY_TIMEOUT, hard_kill_daemon, read_pid, socket_is_reachable, spawn_daemon, wait_for_ready,
    wait_for_shutdown,
};

use super::machine::{self, Action, ClientState, DesiredState, Input};
use super::validity;

const RECONCILE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::reconcile");

/// Grace period between a stop request and a forced kill.
pub const KILL_GRACE: Duration = Duration::from_millis(2000);

/// How long to wait for a single lifecycle event outside the kill window.
const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Transition budget; a healthy reconciliation settles well within this.
const MAX_STEPS: usize = 32;

/// Executes reconciliation flows for the CLI commands.
pub struct Reconciler {
    config: Config,
    store: SettingsStore,
    paths: RuntimePaths,
    binary_override: Option<OsString>,
}

impl Reconciler {
    /// Builds a reconciler rooted at the shared configuration.
    ///
    /// # Errors
    ///
    /// Returns an error when the data directory cannot be created or the
    /// runtime layout cannot be derived.
    pub fn new(config: Config, binary_override: Option<OsString>) -> Result<Self, CliError> {
        let data = DataPaths::create(config.data_dir.clone())?;
        let store = SettingsStore::open(data.settings_path());
        let paths = RuntimePaths::from_config_readonly(&config)?;
        Ok(Self {
            config,
            store,
            paths,
            binary_override,
        })
    }

    /// Settings store backing the reconciliation target.
    #[must_use]
    pub fn store(&self) -> &SettingsStore {
        &self.store
    }

    /// Shared configuration in use.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runtime artefact layout of the daemon this reconciler targets.
    #[must_use]
    pub fn runtime_paths(&self) -> &RuntimePaths {
        &self.paths
    }

    /// Fresh control client for the configured endpoint.
    #[must_use]
    pub fn client(&self) -> ControlClient {
        ControlClient::new(self.config.socket.clone())
    }

    /// Brings the observed state in line with the persisted settings.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::EngineFailed`] when the engine crashes during the
    /// reconciliation, plus transport and lifecycle errors.
    pub fn reconcile(&self) -> Result<ClientState, CliError> {
        self.run_machine(None)
    }

    /// Reconciles after a settings change, restarting a running engine when
    /// the change requires it.
    ///
    /// # Errors
    ///
    /// Same surface as [`Reconciler::reconcile`].
    pub fn reconcile_after_change(&self, restart_required: bool) -> Result<ClientState, CliError> {
        self.run_machine(Some(Input::SettingsChanged { restart_required }))
    }

    fn run_machine(&self, mut seed: Option<Input>) -> Result<ClientState, CliError> {
        let settings = self.store.load()?;
        let mut desired = validity::desired_state(&settings);
        // Invalid settings force both run flags off; the engine stays down
        // until the user repairs the document.
        if !desired.settings_valid() && (settings.run || settings.run_on_boot) {
            self.store.update(|settings| {
                settings.run = false;
                settings.run_on_boot = false;
            })?;
            desired.run_now = false;
        }
        let mut state = ClientState::Disconnected;
        let mut session: Option<EventSubscription> = None;
        let mut kill_armed = false;
        let mut engine_failed = false;

        for _ in 0..MAX_STEPS {
            if seed.is_none() && settled(state, &desired) {
                drop(session);
                if engine_failed {
                    return Err(CliError::EngineFailed);
                }
                return Ok(state);
            }

            let input = match seed.take_if(|_| !matches!(state, ClientState::Disconnected)) {
                Some(input) => input,
                None => self.observe(&mut session, state, kill_armed)?,
            };
            let (next, actions) = machine::step(state, &desired, input);
            debug!(
                target: RECONCILE_TARGET,
                ?input,
                from = ?state,
                to = ?next,
                ?actions,
                "reconciliation step"
            );
            state = next;
            for action in actions {
                self.execute(
                    action,
                    &mut session,
                    &mut desired,
                    &mut kill_armed,
                    &mut engine_failed,
                )?;
            }
        }
        Err(CliError::ReconcileDiverged { steps: MAX_STEPS })
    }

    fn observe(
        &self,
        session: &mut Option<EventSubscription>,
        state: ClientState,
        kill_armed: bool,
    ) -> Result<Input, CliError> {
        let Some(subscription) = session.as_mut() else {
            if !socket_is_reachable(self.config.socket())? {
                return Ok(Input::Disconnected);
            }
            // The daemon can vanish between the probe and the handshake;
            // treat that as a disconnect observation, not a failure.
            let client = self.client();
            let subscription = match client.subscribe() {
                Ok(subscription) => subscription,
                Err(CliError::ControlSocket { .. }) => return Ok(Input::Disconnected),
                Err(error) => return Err(error),
            };
            let running = match client.request_ack(ControlRequest::IsRunning) {
                Ok(running) => running,
                Err(CliError::ControlSocket { .. }) => return Ok(Input::Disconnected),
                Err(error) => return Err(error),
            };
            *session = Some(subscription);
            return Ok(Input::Connected { running });
        };

        let stopping = matches!(state, ClientState::TransitioningStop { .. });
        let timeout = if stopping && kill_armed {
            KILL_GRACE
        } else {
            EVENT_TIMEOUT
        };
        match subscription.next_event(timeout) {
            Ok(Some(LifecycleEvent::Started)) => Ok(Input::Started),
            Ok(Some(LifecycleEvent::Stopped { error })) => Ok(Input::Stopped { error }),
            Ok(None) => {
                *session = None;
                Ok(Input::Disconnected)
            }
            Err(CliError::LifecycleTimeout { .. }) if stopping => Ok(Input::KillDeadlineElapsed),
            Err(error) => Err(error),
        }
    }

    fn execute(
        &self,
        action: Action,
        session: &mut Option<EventSubscription>,
        desired: &mut DesiredState,
        kill_armed: &mut bool,
        engine_failed: &mut bool,
    ) -> Result<(), CliError> {
        match action {
            Action::SpawnDaemon => self.launch_daemon(session),
            // The next observation reconnects on its own.
            Action::Reconnect => Ok(()),
            Action::IssueStart => self
                .client()
                .request_ack(ControlRequest::Start)
                .map(|_running| ()),
            Action::IssueStop => self
                .client()
                .request_ack(ControlRequest::Stop)
                .map(|_running| ()),
            Action::StartKillTimer => {
                *kill_armed = true;
                Ok(())
            }
            Action::CancelKillTimer => {
                *kill_armed = false;
                Ok(())
            }
            Action::Kill => self.kill_daemon(session),
            Action::PersistRunOff => {
                self.store.update(|settings| settings.run = false)?;
                desired.run_now = false;
                *engine_failed = true;
                Ok(())
            }
            Action::PersistRunOnBootOff => {
                self.store
                    .update(|settings| settings.run_on_boot = false)?;
                Ok(())
            }
        }
    }

    /// Spawns a daemon once the previous one has fully vacated the socket
    /// and runtime artefacts.
    fn launch_daemon(&self, session: &mut Option<EventSubscription>) -> Result<(), CliError> {
        *session = None;
        // A listener already answering means a daemon exists (or is still
        // tearing down); reconnect instead of racing it for the lock.
        if socket_is_reachable(self.config.socket())? {
            return Ok(());
        }
        wait_for_shutdown(&self.paths, self.config.socket())?;
        let started_at = SystemTime::now();
        let mut child = spawn_daemon(&self.config, self.binary_override.as_deref())?;
        wait_for_ready(&self.paths, &mut child, started_at, READY_TIMEOUT)?;
        Ok(())
    }

    /// Escalates a stuck stop: IPC kill first, SIGKILL as the last resort.
    fn kill_daemon(&self, session: &mut Option<EventSubscription>) -> Result<(), CliError> {
        *session = None;
        if self.client().request_ack(ControlRequest::Kill).is_err() {
            if let Some(pid) = read_pid(self.paths.pid_path())? {
                hard_kill_daemon(pid)?;
            }
        }
        wait_for_shutdown(&self.paths, self.config.socket())
    }
}

fn settled(state: ClientState, desired: &DesiredState) -> bool {
    match state {
        ClientState::ValidRunning => desired.run_now && desired.settings_valid(),
        ClientState::ValidStopped => !desired.run_now || !desired.settings_valid(),
        ClientState::Invalid => true,
        ClientState::Disconnected => !(desired.run_now && desired.settings_valid()),
        ClientState::TransitioningStart | ClientState::TransitioningStop { .. } => false,
    }
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;
    use podium_config::SocketEndpoint;

    use super::*;

    fn reconciler_in(dir: &tempfile::TempDir) -> Reconciler {
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 temp dir");
        let mut config = Config::default();
        config.socket = SocketEndpoint::unix(root.join("podiumd.sock"));
        config.data_dir = root.join("data");
        Reconciler::new(config, None).expect("build reconciler")
    }

    #[test]
    fn stopped_target_with_no_daemon_settles_immediately() {
        let dir = tempfile::tempdir().expect("temp dir");
        let reconciler = reconciler_in(&dir);
        let state = reconciler.reconcile().expect("reconcile");
        assert_eq!(state, ClientState::Disconnected);
    }

    #[test]
    fn invalid_settings_never_spawn_a_daemon() {
        let dir = tempfile::tempdir().expect("temp dir");
        let reconciler = reconciler_in(&dir);
        reconciler
            .store()
            .update(|settings| {
                settings.run = true;
                settings.music_directory = Utf8PathBuf::from("/nonexistent/music");
            })
            .expect("seed settings");
        let state = reconciler.reconcile().expect("reconcile");
        assert_eq!(state, ClientState::Disconnected);
        assert!(!dir.path().join("podiumd.sock").exists());

        let settings = reconciler.store().load().expect("reload settings");
        assert!(!settings.run, "invalid settings should clear the run flag");
    }

    #[test]
    fn settled_is_aligned_with_the_desired_state() {
        let wants_run = DesiredState {
            run_now: true,
            directory_valid: true,
            port_valid: true,
        };
        assert!(settled(ClientState::ValidRunning, &wants_run));
        assert!(!settled(ClientState::ValidStopped, &wants_run));
        assert!(!settled(ClientState::Disconnected, &wants_run));
        assert!(!settled(
            ClientState::TransitioningStart,
            &wants_run
        ));

        let wants_stop = DesiredState {
            run_now: false,
            ..wants_run
        };
        assert!(settled(ClientState::ValidStopped, &wants_stop));
        assert!(settled(ClientState::Disconnected, &wants_stop));
        assert!(!settled(ClientState::ValidRunning, &wants_stop));
    }
}
