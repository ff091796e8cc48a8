//! Single-instance supervision of the engine execution thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use camino::Utf8Path;
use once_cell::sync::OnceCell;
use tracing::{info, warn};

use super::ENGINE_TARGET;
use super::backend::{EngineBackend, LaunchedEngine};

static GLOBAL: OnceCell<Arc<EngineSupervisor>> = OnceCell::new();

/// Supervises at most one engine run per process lifetime.
///
/// Once an engine has been started, the slot stays occupied even after the
/// engine exits: a second `start` in the same process is refused, so callers
/// must relaunch the daemon to run the engine again.
pub struct EngineSupervisor {
    slot: Mutex<Option<EngineHandle>>,
}

struct EngineHandle {
    running: Arc<AtomicBool>,
    quit: Arc<dyn Fn() + Send + Sync>,
    thread: Option<JoinHandle<()>>,
}

impl EngineSupervisor {
    /// Builds an empty supervisor.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Returns the process-wide supervisor instance.
    pub fn global() -> Arc<Self> {
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(Self::new())))
    }

    /// Starts the engine on a dedicated execution thread.
    ///
    /// `error_sink` is invoked exactly once, off the caller's thread, when the
    /// engine exits with a nonzero status. Clean exits do not notify the sink.
    /// Returns `false` when an engine has already been started in this process
    /// or when the backend fails to launch.
    pub fn start(
        &self,
        backend: &dyn EngineBackend,
        conf_path: &Utf8Path,
        error_sink: impl FnOnce(i32) + Send + 'static,
    ) -> bool {
        let mut slot = match self.slot.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if slot.is_some() {
            warn!(
                target: ENGINE_TARGET,
                "refusing engine start: already started in this process"
            );
            return false;
        }

        let LaunchedEngine { run, quit } = match backend.launch(conf_path) {
            Ok(launched) => launched,
            Err(error) => {
                warn!(
                    target: ENGINE_TARGET,
                    error = %error,
                    "engine launch failed"
                );
                return false;
            }
        };

        let running = Arc::new(AtomicBool::new(true));
        let running_flag = Arc::clone(&running);
        let thread = thread::Builder::new()
            .name("engine".to_owned())
            .spawn(move || {
                let status = run();
                running_flag.store(false, Ordering::SeqCst);
                info!(
                    target: ENGINE_TARGET,
                    status,
                    "engine execution thread finished"
                );
                if status != 0 {
                    error_sink(status);
                }
            });
        let thread = match thread {
            Ok(handle) => handle,
            Err(error) => {
                warn!(
                    target: ENGINE_TARGET,
                    error = %error,
                    "failed to spawn engine execution thread"
                );
                return false;
            }
        };

        *slot = Some(EngineHandle {
            running,
            quit,
            thread: Some(thread),
        });
        true
    }

    /// Requests a graceful engine shutdown and waits for the thread to finish.
    ///
    /// Returns `false` when no engine is running. The slot stays occupied so
    /// restarts within the same process remain refused.
    pub fn stop(&self) -> bool {
        let mut slot = match self.slot.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        let Some(handle) = slot.as_mut() else {
            return false;
        };
        if !handle.running.load(Ordering::SeqCst) {
            return false;
        }
        (handle.quit)();
        if let Some(thread) = handle.thread.take()
            && thread.join().is_err()
        {
            warn!(
                target: ENGINE_TARGET,
                "engine execution thread panicked"
            );
        }
        true
    }

    /// Reports whether the engine execution thread is currently alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        let slot = match self.slot.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        slot.as_ref()
            .is_some_and(|handle| handle.running.load(Ordering::SeqCst))
    }
}

impl Default for EngineSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::time::Duration;

    use camino::Utf8Path;

    use super::*;
    use crate::engine::EngineLaunchError;

    /// Backend whose engine blocks until `quit` fires, then exits with the
    /// scripted status.
    struct ScriptedBackend {
        exit_status: i32,
    }

    impl EngineBackend for ScriptedBackend {
        fn launch(&self, _conf_path: &Utf8Path) -> Result<LaunchedEngine, EngineLaunchError> {
            let (quit_tx, quit_rx) = mpsc::channel::<()>();
            let status = self.exit_status;
            let quit: Arc<dyn Fn() + Send + Sync> = Arc::new(move || {
                let _ = quit_tx.send(());
            });
            let run = Box::new(move || {
                let _ = quit_rx.recv();
                status
            });
            Ok(LaunchedEngine { run, quit })
        }
    }

    /// Backend whose engine exits immediately with the scripted status.
    struct InstantBackend {
        exit_status: i32,
    }

    impl EngineBackend for InstantBackend {
        fn launch(&self, _conf_path: &Utf8Path) -> Result<LaunchedEngine, EngineLaunchError> {
            let status = self.exit_status;
            Ok(LaunchedEngine {
                run: Box::new(move || status),
                quit: Arc::new(|| {}),
            })
        }
    }

    struct FailingBackend;

    impl EngineBackend for FailingBackend {
        fn launch(&self, conf_path: &Utf8Path) -> Result<LaunchedEngine, EngineLaunchError> {
            Err(EngineLaunchError::Spawn {
                binary: conf_path.to_owned(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
            })
        }
    }

    fn conf() -> &'static Utf8Path {
        Utf8Path::new("/tmp/engine.conf")
    }

    #[test]
    fn start_runs_the_engine_until_stopped() {
        let supervisor = EngineSupervisor::new();
        let backend = ScriptedBackend { exit_status: 0 };
        assert!(supervisor.start(&backend, conf(), |_status| {}));
        assert!(supervisor.is_running());
        assert!(supervisor.stop());
        assert!(!supervisor.is_running());
    }

    #[test]
    fn second_start_is_refused_even_after_stop() {
        let supervisor = EngineSupervisor::new();
        let backend = ScriptedBackend { exit_status: 0 };
        assert!(supervisor.start(&backend, conf(), |_status| {}));
        assert!(supervisor.stop());
        assert!(!supervisor.start(&backend, conf(), |_status| {}));
    }

    #[test]
    fn nonzero_exit_notifies_the_error_sink_once() {
        let supervisor = EngineSupervisor::new();
        let backend = InstantBackend { exit_status: 3 };
        let (tx, rx) = mpsc::channel();
        assert!(supervisor.start(&backend, conf(), move |status| {
            tx.send(status).expect("report status");
        }));
        let status = rx
            .recv_timeout(Duration::from_secs(2))
            .expect("error sink should fire");
        assert_eq!(status, 3);
        assert!(
            rx.recv_timeout(Duration::from_millis(50)).is_err(),
            "error sink must fire at most once"
        );
        assert!(!supervisor.is_running());
    }

    #[test]
    fn clean_exit_does_not_notify_the_error_sink() {
        let supervisor = EngineSupervisor::new();
        let backend = InstantBackend { exit_status: 0 };
        let (tx, rx) = mpsc::channel();
        assert!(supervisor.start(&backend, conf(), move |status| {
            tx.send(status).expect("report status");
        }));
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn launch_failure_leaves_the_slot_free() {
        let supervisor = EngineSupervisor::new();
        assert!(!supervisor.start(&FailingBackend, conf(), |_status| {}));
        assert!(!supervisor.is_running());
        // The slot is only occupied by a successful launch.
        let backend = ScriptedBackend { exit_status: 0 };
        assert!(supervisor.start(&backend, conf(), |_status| {}));
        supervisor.stop();
    }

    #[test]
    fn stop_without_a_running_engine_reports_false() {
        let supervisor = EngineSupervisor::new();
        assert!(!supervisor.stop());
    }
}
