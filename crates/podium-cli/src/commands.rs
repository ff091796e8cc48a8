//! Implementations of the individual CLI commands.

use std::io::Write;
use std::thread;
use std::time::Duration;

use podium_config::Settings;
use podium_daemon_types::{ControlRequest, LifecycleEvent};

use crate::cli::{CliCommand, SetCommand, Switch};
use crate::errors::CliError;
use crate::lifecycle::{
    hard_kill_daemon, read_health, read_pid, socket_is_reachable, wait_for_shutdown,
};
use crate::reconcile::{ClientState, Reconciler, validity};

const WATCH_POLL: Duration = Duration::from_secs(60);
const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);

/// Executes one parsed command against the daemon.
///
/// # Errors
///
/// Returns [`CliError`] when the command cannot reach its goal; partial
/// progress is reported on the writers before the error surfaces.
pub fn dispatch<W: Write, E: Write>(
    command: CliCommand,
    reconciler: &Reconciler,
    stdout: &mut W,
    stderr: &mut E,
) -> Result<(), CliError> {
    match command {
        CliCommand::Run { switch } => run(reconciler, switch, stdout),
        CliCommand::Boot { switch } => boot(reconciler, switch, stdout),
        CliCommand::Set(setting) => set(reconciler, setting, stdout, stderr),
        CliCommand::Status => status(reconciler, stdout),
        CliCommand::Kill => kill(reconciler, stdout),
        CliCommand::Watch => watch(reconciler, stdout),
        CliCommand::BootSync => boot_sync(reconciler, stdout),
    }
}

fn run<W: Write>(
    reconciler: &Reconciler,
    switch: Switch,
    stdout: &mut W,
) -> Result<(), CliError> {
    if switch.is_on() {
        // Validate before persisting so a rejected command leaves the
        // desired state untouched.
        validity::validate(&reconciler.store().load()?)?;
        reconciler.store().update(|settings| settings.run = true)?;
        reconciler.reconcile()?;
        writeln!(stdout, "engine running")?;
        return Ok(());
    }
    reconciler.store().update(|settings| settings.run = false)?;
    let state = reconciler.reconcile()?;
    if state != ClientState::Disconnected {
        // The daemon exits once its engine stops; wait for the socket and
        // runtime artefacts to vacate before reporting success.
        wait_for_shutdown(reconciler.runtime_paths(), reconciler.config().socket())?;
    }
    writeln!(stdout, "engine stopped")?;
    Ok(())
}

fn boot<W: Write>(
    reconciler: &Reconciler,
    switch: Switch,
    stdout: &mut W,
) -> Result<(), CliError> {
    if switch.is_on() {
        validity::validate(&reconciler.store().load()?)?;
        // Boot-time running implies running now.
        reconciler.store().update(|settings| {
            settings.run_on_boot = true;
            settings.run = true;
        })?;
        reconciler.reconcile()?;
        writeln!(stdout, "engine will start at boot")?;
    } else {
        reconciler
            .store()
            .update(|settings| settings.run_on_boot = false)?;
        writeln!(stdout, "engine will not start at boot")?;
    }
    Ok(())
}

fn set<W: Write, E: Write>(
    reconciler: &Reconciler,
    setting: SetCommand,
    stdout: &mut W,
    stderr: &mut E,
) -> Result<(), CliError> {
    let before = reconciler.store().load()?;
    let after = match &setting {
        SetCommand::MusicDirectory { path } => reconciler
            .store()
            .update(|settings| settings.music_directory = path.clone())?,
        SetCommand::Port { port } => reconciler
            .store()
            .update(|settings| settings.port = port.trim().to_owned())?,
        SetCommand::Wakelock { switch } => reconciler
            .store()
            .update(|settings| settings.wakelock = switch.is_on())?,
    };
    warn_when_invalid(&after, stderr)?;
    if before == after {
        writeln!(stdout, "setting unchanged")?;
        return Ok(());
    }
    // Directory, port, and wakelock all feed the engine configuration, so
    // any change restarts a running engine.
    reconciler.reconcile_after_change(true)?;
    writeln!(stdout, "setting applied")?;
    Ok(())
}

/// Invalid values are persisted rather than rejected so the user can fix
/// them incrementally; the engine just refuses to run until they pass.
fn warn_when_invalid<E: Write>(settings: &Settings, stderr: &mut E) -> Result<(), CliError> {
    if let Err(error) = validity::validate(settings) {
        writeln!(
            stderr,
            "warning: {error}; the engine will not run until this is fixed"
        )?;
    }
    Ok(())
}

fn status<W: Write>(reconciler: &Reconciler, stdout: &mut W) -> Result<(), CliError> {
    let paths = reconciler.runtime_paths();
    let health = read_health(paths.health_path())?;
    let pid = read_pid(paths.pid_path())?;
    let reachable = socket_is_reachable(reconciler.config().socket())?;

    match (&health, reachable) {
        (Some(snapshot), true) => {
            writeln!(stdout, "daemon: {} (pid {})", snapshot.status, snapshot.pid)?;
        }
        (_, true) => writeln!(stdout, "daemon: listening")?,
        (_, false) => match pid {
            Some(pid) => writeln!(stdout, "daemon: unresponsive (pid {pid})")?,
            None => writeln!(stdout, "daemon: not running")?,
        },
    }

    let engine_running = if reachable {
        reconciler.client().request_ack(ControlRequest::IsRunning)?
    } else {
        false
    };
    writeln!(
        stdout,
        "engine: {}",
        if engine_running { "running" } else { "stopped" }
    )?;

    let settings = reconciler.store().load()?;
    writeln!(stdout, "music directory: {}", settings.music_directory)?;
    writeln!(stdout, "port: {}", settings.port)?;
    writeln!(stdout, "run: {}", on_off(settings.run))?;
    writeln!(stdout, "run on boot: {}", on_off(settings.run_on_boot))?;
    writeln!(stdout, "wakelock: {}", on_off(settings.wakelock))?;
    if let Err(error) = validity::validate(&settings) {
        writeln!(stdout, "settings problem: {error}")?;
    }
    Ok(())
}

fn on_off(value: bool) -> &'static str {
    if value { "on" } else { "off" }
}

fn kill<W: Write>(reconciler: &Reconciler, stdout: &mut W) -> Result<(), CliError> {
    let paths = reconciler.runtime_paths();
    let acknowledged = reconciler
        .client()
        .request_ack(ControlRequest::Kill)
        .is_ok();
    if !acknowledged {
        match read_pid(paths.pid_path())? {
            Some(pid) => hard_kill_daemon(pid)?,
            None => {
                writeln!(stdout, "daemon not running")?;
                return Ok(());
            }
        }
    }
    wait_for_shutdown(paths, reconciler.config().socket())?;
    writeln!(stdout, "daemon terminated")?;
    Ok(())
}

/// Streams lifecycle events indefinitely, resubscribing when the daemon
/// exits and a fresh one takes over the socket.
fn watch<W: Write>(reconciler: &Reconciler, stdout: &mut W) -> Result<(), CliError> {
    loop {
        let mut subscription = match reconciler.client().subscribe() {
            Ok(subscription) => subscription,
            Err(CliError::ControlSocket { .. }) => {
                thread::sleep(RESUBSCRIBE_DELAY);
                continue;
            }
            Err(error) => return Err(error),
        };
        writeln!(stdout, "subscribed (token {})", subscription.token())?;
        loop {
            match subscription.next_event(WATCH_POLL) {
                Ok(Some(LifecycleEvent::Started)) => writeln!(stdout, "engine started")?,
                Ok(Some(LifecycleEvent::Stopped { error: true })) => {
                    writeln!(stdout, "engine stopped (error)")?;
                }
                Ok(Some(LifecycleEvent::Stopped { error: false })) => {
                    writeln!(stdout, "engine stopped")?;
                }
                Ok(None) => {
                    writeln!(stdout, "daemon closed the stream; waiting for the next one")?;
                    break;
                }
                Err(CliError::LifecycleTimeout { .. }) => {}
                Err(error) => return Err(error),
            }
        }
    }
}

fn boot_sync<W: Write>(reconciler: &Reconciler, stdout: &mut W) -> Result<(), CliError> {
    let settings = reconciler.store().load()?;
    if !settings.run_on_boot {
        writeln!(stdout, "boot start disabled; nothing to do")?;
        return Ok(());
    }
    validity::validate(&settings)?;
    reconciler.store().update(|settings| settings.run = true)?;
    reconciler.reconcile()?;
    writeln!(stdout, "engine running")?;
    Ok(())
}
