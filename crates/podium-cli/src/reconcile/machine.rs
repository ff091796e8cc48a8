//! Pure reconciliation state machine.
//!
//! The CLI tracks the engine through a single tagged state instead of a set
//! of independent flags, so every observation maps to exactly one transition.
//! The machine is pure: it consumes an observation plus the desired state
//! derived from settings and yields the next state with the side effects the
//! driver must perform.

/// Client-side view of the engine lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// No control connection; the daemon may not be running.
    Disconnected,
    /// Connected, but the settings do not permit an engine run.
    Invalid,
    /// Connected with valid settings and a stopped engine.
    ValidStopped,
    /// Connected with valid settings and a running engine.
    ValidRunning,
    /// A start has been issued; awaiting the started event.
    TransitioningStart,
    /// A stop has been issued; awaiting the stopped event.
    TransitioningStop {
        /// Whether the engine should be brought back up once stopped.
        pending_restart: bool,
    },
}

/// Target condition derived from the durable settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DesiredState {
    /// Whether the engine should be running.
    pub run_now: bool,
    /// Whether the music directory passes validation.
    pub directory_valid: bool,
    /// Whether the engine port passes validation.
    pub port_valid: bool,
}

impl DesiredState {
    /// Settings permit an engine run only when every check passes.
    #[must_use]
    pub fn settings_valid(&self) -> bool {
        self.directory_valid && self.port_valid
    }
}

/// Observations fed into the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    /// A control connection was established; carries the running snapshot.
    Connected { running: bool },
    /// The control connection dropped or could not be established.
    Disconnected,
    /// A persisted setting changed.
    SettingsChanged { restart_required: bool },
    /// The daemon broadcast an engine start.
    Started,
    /// The daemon broadcast an engine stop.
    Stopped { error: bool },
    /// The stop grace period expired without a stopped event.
    KillDeadlineElapsed,
}

/// Side effects the driver must perform after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Launch a fresh daemon process.
    SpawnDaemon,
    /// Re-establish the control connection.
    Reconnect,
    /// Send a start command.
    IssueStart,
    /// Send a stop command and arm the kill timer.
    IssueStop,
    /// Arm the stop grace timer.
    StartKillTimer,
    /// Disarm the stop grace timer.
    CancelKillTimer,
    /// Hard-kill the daemon process.
    Kill,
    /// Persist `run = false`.
    PersistRunOff,
    /// Persist `run_on_boot = false`.
    PersistRunOnBootOff,
}

/// Applies one observation and returns the next state with its side effects.
#[must_use]
pub fn step(state: ClientState, desired: &DesiredState, input: Input) -> (ClientState, Vec<Action>) {
    match input {
        Input::Connected { running } => on_connected(desired, running),
        Input::Disconnected => on_disconnected(desired),
        Input::SettingsChanged { restart_required } => {
            on_settings_changed(state, desired, restart_required)
        }
        Input::Started => (ClientState::ValidRunning, vec![Action::CancelKillTimer]),
        Input::Stopped { error } => on_stopped(state, error),
        Input::KillDeadlineElapsed => on_kill_deadline(state),
    }
}

fn on_connected(desired: &DesiredState, running: bool) -> (ClientState, Vec<Action>) {
    if !desired.settings_valid() {
        if running {
            // An engine must not keep running against invalid settings.
            return (
                ClientState::TransitioningStop {
                    pending_restart: false,
                },
                vec![Action::IssueStop, Action::StartKillTimer],
            );
        }
        return (ClientState::Invalid, Vec::new());
    }
    match (desired.run_now, running) {
        (true, false) => (ClientState::TransitioningStart, vec![Action::IssueStart]),
        (false, true) => (
            ClientState::TransitioningStop {
                pending_restart: false,
            },
            vec![Action::IssueStop, Action::StartKillTimer],
        ),
        (_, true) => (ClientState::ValidRunning, Vec::new()),
        (_, false) => (ClientState::ValidStopped, Vec::new()),
    }
}

fn on_disconnected(desired: &DesiredState) -> (ClientState, Vec<Action>) {
    if desired.run_now && desired.settings_valid() {
        return (
            ClientState::Disconnected,
            vec![Action::CancelKillTimer, Action::SpawnDaemon, Action::Reconnect],
        );
    }
    (ClientState::Disconnected, vec![Action::CancelKillTimer])
}

fn on_settings_changed(
    state: ClientState,
    desired: &DesiredState,
    restart_required: bool,
) -> (ClientState, Vec<Action>) {
    if matches!(state, ClientState::Disconnected) {
        // Nothing to do until the next connection reconciles.
        return (state, Vec::new());
    }
    if !desired.settings_valid() {
        return match state {
            ClientState::ValidRunning | ClientState::TransitioningStart => (
                ClientState::TransitioningStop {
                    pending_restart: false,
                },
                vec![Action::IssueStop, Action::StartKillTimer],
            ),
            ClientState::TransitioningStop { .. } => (state, Vec::new()),
            _ => (ClientState::Invalid, Vec::new()),
        };
    }
    match state {
        ClientState::Invalid => {
            if desired.run_now {
                (ClientState::TransitioningStart, vec![Action::IssueStart])
            } else {
                (ClientState::ValidStopped, Vec::new())
            }
        }
        ClientState::ValidRunning if restart_required => (
            ClientState::TransitioningStop {
                pending_restart: true,
            },
            vec![Action::IssueStop, Action::StartKillTimer],
        ),
        _ => (state, Vec::new()),
    }
}

fn on_stopped(state: ClientState, error: bool) -> (ClientState, Vec<Action>) {
    match state {
        ClientState::TransitioningStop {
            pending_restart: true,
        } => (
            // The daemon exits after a stop; the restart needs a fresh one.
            ClientState::Disconnected,
            vec![Action::CancelKillTimer, Action::SpawnDaemon, Action::Reconnect],
        ),
        ClientState::TransitioningStop {
            pending_restart: false,
        } => {
            if error {
                // Even during a requested stop an error report means the
                // engine went down badly; do not chase it at the next boot.
                (
                    ClientState::ValidStopped,
                    vec![Action::CancelKillTimer, Action::PersistRunOnBootOff],
                )
            } else {
                (ClientState::ValidStopped, vec![Action::CancelKillTimer])
            }
        }
        _ if error => (
            // An unsolicited error stop means the engine crashed; stop
            // chasing it until the user intervenes.
            ClientState::ValidStopped,
            vec![
                Action::CancelKillTimer,
                Action::PersistRunOff,
                Action::PersistRunOnBootOff,
            ],
        ),
        _ => (ClientState::ValidStopped, vec![Action::CancelKillTimer]),
    }
}

fn on_kill_deadline(state: ClientState) -> (ClientState, Vec<Action>) {
    match state {
        ClientState::TransitioningStop { .. } => (state, vec![Action::Kill]),
        _ => (state, Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn desired(run_now: bool) -> DesiredState {
        DesiredState {
            run_now,
            directory_valid: true,
            port_valid: true,
        }
    }

    fn invalid_desired(run_now: bool) -> DesiredState {
        DesiredState {
            run_now,
            directory_valid: false,
            port_valid: true,
        }
    }

    #[test]
    fn connecting_with_a_stopped_engine_issues_start_when_wanted() {
        let (state, actions) = step(
            ClientState::Disconnected,
            &desired(true),
            Input::Connected { running: false },
        );
        assert_eq!(state, ClientState::TransitioningStart);
        assert_eq!(actions, vec![Action::IssueStart]);
    }

    #[test]
    fn connecting_with_a_running_engine_issues_stop_when_unwanted() {
        let (state, actions) = step(
            ClientState::Disconnected,
            &desired(false),
            Input::Connected { running: true },
        );
        assert_eq!(
            state,
            ClientState::TransitioningStop {
                pending_restart: false
            }
        );
        assert_eq!(actions, vec![Action::IssueStop, Action::StartKillTimer]);
    }

    #[rstest]
    #[case::wants_running(true, true, ClientState::ValidRunning)]
    #[case::wants_stopped(false, false, ClientState::ValidStopped)]
    fn matching_observation_settles_without_actions(
        #[case] run_now: bool,
        #[case] running: bool,
        #[case] expected: ClientState,
    ) {
        let (state, actions) = step(
            ClientState::Disconnected,
            &desired(run_now),
            Input::Connected { running },
        );
        assert_eq!(state, expected);
        assert!(actions.is_empty());
    }

    #[test]
    fn invalid_settings_stop_a_running_engine() {
        let (state, actions) = step(
            ClientState::Disconnected,
            &invalid_desired(true),
            Input::Connected { running: true },
        );
        assert_eq!(
            state,
            ClientState::TransitioningStop {
                pending_restart: false
            }
        );
        assert_eq!(actions, vec![Action::IssueStop, Action::StartKillTimer]);
    }

    #[test]
    fn invalid_settings_with_a_stopped_engine_park_the_client() {
        let (state, actions) = step(
            ClientState::Disconnected,
            &invalid_desired(true),
            Input::Connected { running: false },
        );
        assert_eq!(state, ClientState::Invalid);
        assert!(actions.is_empty());
    }

    #[test]
    fn disconnect_spawns_a_daemon_only_when_a_run_is_wanted() {
        let (_, actions) = step(
            ClientState::ValidRunning,
            &desired(true),
            Input::Disconnected,
        );
        assert!(actions.contains(&Action::SpawnDaemon));
        assert!(actions.contains(&Action::Reconnect));

        let (_, actions) = step(
            ClientState::ValidStopped,
            &desired(false),
            Input::Disconnected,
        );
        assert_eq!(actions, vec![Action::CancelKillTimer]);
    }

    #[test]
    fn restart_worthy_setting_change_stops_with_pending_restart() {
        let (state, actions) = step(
            ClientState::ValidRunning,
            &desired(true),
            Input::SettingsChanged {
                restart_required: true,
            },
        );
        assert_eq!(
            state,
            ClientState::TransitioningStop {
                pending_restart: true
            }
        );
        assert_eq!(actions, vec![Action::IssueStop, Action::StartKillTimer]);
    }

    #[test]
    fn cosmetic_setting_change_leaves_a_running_engine_alone() {
        let (state, actions) = step(
            ClientState::ValidRunning,
            &desired(true),
            Input::SettingsChanged {
                restart_required: false,
            },
        );
        assert_eq!(state, ClientState::ValidRunning);
        assert!(actions.is_empty());
    }

    #[test]
    fn settings_becoming_valid_releases_the_invalid_park() {
        let (state, actions) = step(
            ClientState::Invalid,
            &desired(true),
            Input::SettingsChanged {
                restart_required: true,
            },
        );
        assert_eq!(state, ClientState::TransitioningStart);
        assert_eq!(actions, vec![Action::IssueStart]);
    }

    #[test]
    fn stop_with_pending_restart_respawns_the_daemon() {
        let (state, actions) = step(
            ClientState::TransitioningStop {
                pending_restart: true,
            },
            &desired(true),
            Input::Stopped { error: false },
        );
        assert_eq!(state, ClientState::Disconnected);
        assert_eq!(
            actions,
            vec![Action::CancelKillTimer, Action::SpawnDaemon, Action::Reconnect]
        );
    }

    #[test]
    fn requested_stop_with_an_engine_error_clears_the_boot_flag() {
        let (state, actions) = step(
            ClientState::TransitioningStop {
                pending_restart: false,
            },
            &desired(false),
            Input::Stopped { error: true },
        );
        assert_eq!(state, ClientState::ValidStopped);
        assert_eq!(
            actions,
            vec![Action::CancelKillTimer, Action::PersistRunOnBootOff]
        );
    }

    #[test]
    fn requested_clean_stop_keeps_the_boot_flag() {
        let (state, actions) = step(
            ClientState::TransitioningStop {
                pending_restart: false,
            },
            &desired(false),
            Input::Stopped { error: false },
        );
        assert_eq!(state, ClientState::ValidStopped);
        assert_eq!(actions, vec![Action::CancelKillTimer]);
    }

    #[test]
    fn unsolicited_crash_clears_both_run_flags() {
        let (state, actions) = step(
            ClientState::ValidRunning,
            &desired(true),
            Input::Stopped { error: true },
        );
        assert_eq!(state, ClientState::ValidStopped);
        assert_eq!(
            actions,
            vec![
                Action::CancelKillTimer,
                Action::PersistRunOff,
                Action::PersistRunOnBootOff,
            ]
        );
    }

    #[test]
    fn started_event_settles_a_pending_start() {
        let (state, actions) = step(
            ClientState::TransitioningStart,
            &desired(true),
            Input::Started,
        );
        assert_eq!(state, ClientState::ValidRunning);
        assert_eq!(actions, vec![Action::CancelKillTimer]);
    }

    #[test]
    fn kill_deadline_only_fires_during_a_stop() {
        let (state, actions) = step(
            ClientState::TransitioningStop {
                pending_restart: true,
            },
            &desired(true),
            Input::KillDeadlineElapsed,
        );
        assert_eq!(
            state,
            ClientState::TransitioningStop {
                pending_restart: true
            }
        );
        assert_eq!(actions, vec![Action::Kill]);

        let (_, actions) = step(
            ClientState::ValidRunning,
            &desired(true),
            Input::KillDeadlineElapsed,
        );
        assert!(actions.is_empty());
    }
}
