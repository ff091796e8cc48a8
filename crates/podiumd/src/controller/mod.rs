//! Lifecycle controller serialising engine transitions.
//!
//! All start and stop work happens on a single worker thread fed by a
//! coalescing [`EventQueue`]. Control connections post events and return
//! immediately; the worker regenerates the engine configuration, drives the
//! [`EngineSupervisor`](crate::engine::EngineSupervisor), holds run-scoped
//! resources, and fans lifecycle events out to subscribers. The worker ends
//! after the first stop or engine error, which releases the process shutdown
//! gate.

mod queue;
mod registry;
mod resources;

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use podium_config::{DataPaths, SettingsStore, conf};
use podium_daemon_types::LifecycleEvent;
use tracing::{info, warn};

use crate::engine::{EngineBackend, EngineSupervisor};
use crate::process::{ShutdownGate, StopKind};

pub(crate) use self::queue::{ControlEvent, EventQueue};
pub use self::registry::{EventSubscriber, SubscriberRegistry};
pub use self::resources::{FileStatusIndicator, NoopRetentionLock, RetentionLock, StatusIndicator};

const CONTROLLER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::controller");

/// Collaborators required to run the lifecycle worker.
pub struct ControllerDeps {
    /// Engine supervisor enforcing the single-start constraint.
    pub supervisor: Arc<EngineSupervisor>,
    /// Backend used to launch the engine.
    pub backend: Arc<dyn EngineBackend>,
    /// Persistent settings store.
    pub store: SettingsStore,
    /// Data directory layout for configuration artefacts.
    pub data_paths: DataPaths,
    /// Lifecycle event subscribers.
    pub registry: Arc<SubscriberRegistry>,
    /// Retention lock held while the engine runs.
    pub retention: Arc<dyn RetentionLock>,
    /// Operator-visible running indicator.
    pub indicator: Arc<dyn StatusIndicator>,
    /// Gate released when the worker concludes.
    pub gate: Arc<ShutdownGate>,
}

/// Front door for posting lifecycle commands.
pub struct LifecycleController {
    queue: Arc<EventQueue>,
    supervisor: Arc<EngineSupervisor>,
}

/// Join handle for the worker thread.
pub struct ControllerHandle {
    queue: Arc<EventQueue>,
    thread: Option<JoinHandle<()>>,
}

impl LifecycleController {
    /// Spawns the worker thread and returns the command front door.
    pub fn spawn(deps: ControllerDeps) -> (Arc<Self>, ControllerHandle) {
        let queue = Arc::new(EventQueue::new());
        let controller = Arc::new(Self {
            queue: Arc::clone(&queue),
            supervisor: Arc::clone(&deps.supervisor),
        });
        let worker_queue = Arc::clone(&queue);
        let thread = thread::Builder::new()
            .name("lifecycle".to_owned())
            .spawn(move || run_worker(&worker_queue, &deps))
            .ok();
        if thread.is_none() {
            warn!(
                target: CONTROLLER_TARGET,
                "failed to spawn lifecycle worker thread"
            );
            queue.close();
        }
        (controller, ControllerHandle { queue, thread })
    }

    /// Posts a start command; ignored while an engine error is pending.
    pub fn request_start(&self) {
        self.queue.post_start();
    }

    /// Posts a stop command; ignored while an engine error is pending.
    pub fn request_stop(&self) {
        self.queue.post_stop();
    }

    /// Snapshot of the engine running state.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.supervisor.is_running()
    }
}

impl ControllerHandle {
    /// Closes the queue and waits for the worker thread to finish.
    pub fn join(mut self) {
        self.queue.close();
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            warn!(
                target: CONTROLLER_TARGET,
                "lifecycle worker thread panicked"
            );
        }
    }
}

fn run_worker(queue: &Arc<EventQueue>, deps: &ControllerDeps) {
    while let Some(event) = queue.pop() {
        match event {
            ControlEvent::Start => {
                if !process_start(queue, deps) {
                    break;
                }
            }
            ControlEvent::Stop => {
                process_stop(deps);
                break;
            }
            ControlEvent::EngineError { status } => {
                process_engine_error(deps, status);
                break;
            }
        }
    }
    queue.close();
    info!(
        target: CONTROLLER_TARGET,
        "lifecycle worker finished"
    );
}

/// Handles a start command; returns `false` when the worker must conclude.
fn process_start(queue: &Arc<EventQueue>, deps: &ControllerDeps) -> bool {
    if deps.supervisor.is_running() {
        return true;
    }

    let conf_path = match conf::reload(&deps.store, &deps.data_paths) {
        Ok(path) => path,
        Err(error) => {
            warn!(
                target: CONTROLLER_TARGET,
                error = %error,
                "engine configuration rebuild failed"
            );
            deps.registry.broadcast(LifecycleEvent::stopped(true));
            deps.gate.stopped(StopKind::Error);
            return false;
        }
    };

    let error_queue = Arc::clone(queue);
    let started = deps
        .supervisor
        .start(deps.backend.as_ref(), &conf_path, move |status| {
            error_queue.post_error(status);
        });
    if !started {
        deps.registry.broadcast(LifecycleEvent::stopped(true));
        deps.gate.stopped(StopKind::Error);
        return false;
    }

    let wakelock = deps
        .store
        .load()
        .map(|settings| settings.wakelock)
        .unwrap_or(false);
    if wakelock {
        deps.retention.acquire();
    }
    deps.indicator.raise();
    deps.registry.broadcast(LifecycleEvent::Started);
    info!(
        target: CONTROLLER_TARGET,
        wakelock,
        "engine started"
    );
    true
}

fn process_stop(deps: &ControllerDeps) {
    deps.supervisor.stop();
    deps.retention.release();
    deps.indicator.lower();
    deps.registry.broadcast(LifecycleEvent::stopped(false));
    deps.gate.stopped(StopKind::Clean);
    info!(
        target: CONTROLLER_TARGET,
        "engine stopped cleanly"
    );
}

fn process_engine_error(deps: &ControllerDeps, status: i32) {
    warn!(
        target: CONTROLLER_TARGET,
        status,
        "engine exited with an error"
    );
    deps.retention.release();
    deps.indicator.lower();
    deps.registry.broadcast(LifecycleEvent::stopped(true));
    deps.gate.stopped(StopKind::Error);
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    use camino::{Utf8Path, Utf8PathBuf};

    use super::*;
    use crate::engine::{EngineLaunchError, LaunchedEngine};
    use crate::process::GateEvent;

    struct ScriptedBackend {
        exit_status: i32,
    }

    impl EngineBackend for ScriptedBackend {
        fn launch(&self, _conf_path: &Utf8Path) -> Result<LaunchedEngine, EngineLaunchError> {
            let (quit_tx, quit_rx) = mpsc::channel::<()>();
            let status = self.exit_status;
            Ok(LaunchedEngine {
                run: Box::new(move || {
                    let _ = quit_rx.recv();
                    status
                }),
                quit: Arc::new(move || {
                    let _ = quit_tx.send(());
                }),
            })
        }
    }

    struct CrashingBackend {
        exit_status: i32,
    }

    impl EngineBackend for CrashingBackend {
        fn launch(&self, _conf_path: &Utf8Path) -> Result<LaunchedEngine, EngineLaunchError> {
            let status = self.exit_status;
            Ok(LaunchedEngine {
                run: Box::new(move || status),
                quit: Arc::new(|| {}),
            })
        }
    }

    #[derive(Default)]
    struct CountingLock {
        acquired: AtomicUsize,
        released: AtomicUsize,
    }

    impl RetentionLock for CountingLock {
        fn acquire(&self) {
            self.acquired.fetch_add(1, Ordering::SeqCst);
        }

        fn release(&self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct RecordingIndicator {
        raised: AtomicUsize,
        lowered: AtomicUsize,
    }

    impl StatusIndicator for RecordingIndicator {
        fn raise(&self) {
            self.raised.fetch_add(1, Ordering::SeqCst);
        }

        fn lower(&self) {
            self.lowered.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct ChannelSubscriber {
        events: mpsc::Sender<LifecycleEvent>,
    }

    impl EventSubscriber for ChannelSubscriber {
        fn deliver(&mut self, event: LifecycleEvent) -> io::Result<()> {
            self.events
                .send(event)
                .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "receiver gone"))
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        registry: Arc<SubscriberRegistry>,
        retention: Arc<CountingLock>,
        indicator: Arc<RecordingIndicator>,
        gate: Arc<ShutdownGate>,
        events: Mutex<mpsc::Receiver<LifecycleEvent>>,
        controller: Arc<LifecycleController>,
        handle: Option<ControllerHandle>,
    }

    impl Fixture {
        fn next_event(&self) -> LifecycleEvent {
            self.events
                .lock()
                .expect("event receiver")
                .recv_timeout(Duration::from_secs(2))
                .expect("lifecycle event")
        }

        fn finish(mut self) {
            if let Some(handle) = self.handle.take() {
                handle.join();
            }
        }
    }

    fn fixture(backend: Arc<dyn EngineBackend>, wakelock: bool) -> Fixture {
        let dir = tempfile::tempdir().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 temp dir");
        let data_paths = DataPaths::create(root).expect("data layout");
        let store = SettingsStore::open(data_paths.settings_path());
        store
            .update(|settings| {
                settings.music_directory = Utf8PathBuf::from("/music");
                settings.wakelock = wakelock;
            })
            .expect("seed settings");

        let registry = Arc::new(SubscriberRegistry::new());
        let (events_tx, events_rx) = mpsc::channel();
        registry.register(Box::new(ChannelSubscriber { events: events_tx }));

        let retention = Arc::new(CountingLock::default());
        let indicator = Arc::new(RecordingIndicator::default());
        let gate = Arc::new(ShutdownGate::new());
        let (controller, handle) = LifecycleController::spawn(ControllerDeps {
            supervisor: Arc::new(EngineSupervisor::new()),
            backend,
            store,
            data_paths,
            registry: Arc::clone(&registry),
            retention: Arc::clone(&retention) as Arc<dyn RetentionLock>,
            indicator: Arc::clone(&indicator) as Arc<dyn StatusIndicator>,
            gate: Arc::clone(&gate),
        });
        Fixture {
            _dir: dir,
            registry,
            retention,
            indicator,
            gate,
            events: Mutex::new(events_rx),
            controller,
            handle: Some(handle),
        }
    }

    #[test]
    fn start_then_stop_broadcasts_clean_lifecycle() {
        let fx = fixture(Arc::new(ScriptedBackend { exit_status: 0 }), false);
        fx.controller.request_start();
        assert_eq!(fx.next_event(), LifecycleEvent::Started);
        assert!(fx.controller.is_running());
        assert_eq!(fx.indicator.raised.load(Ordering::SeqCst), 1);
        assert_eq!(fx.retention.acquired.load(Ordering::SeqCst), 0);

        fx.controller.request_stop();
        assert_eq!(fx.next_event(), LifecycleEvent::Stopped { error: false });
        assert_eq!(fx.gate.wait(), GateEvent::Stopped(StopKind::Clean));
        assert_eq!(fx.indicator.lowered.load(Ordering::SeqCst), 1);
        fx.finish();
    }

    #[test]
    fn wakelock_setting_drives_retention_lock() {
        let fx = fixture(Arc::new(ScriptedBackend { exit_status: 0 }), true);
        fx.controller.request_start();
        assert_eq!(fx.next_event(), LifecycleEvent::Started);
        assert_eq!(fx.retention.acquired.load(Ordering::SeqCst), 1);
        fx.controller.request_stop();
        assert_eq!(fx.next_event(), LifecycleEvent::Stopped { error: false });
        assert_eq!(fx.retention.released.load(Ordering::SeqCst), 1);
        fx.finish();
    }

    #[test]
    fn engine_error_broadcasts_stop_with_error_flag() {
        let fx = fixture(Arc::new(CrashingBackend { exit_status: 7 }), false);
        fx.controller.request_start();
        assert_eq!(fx.next_event(), LifecycleEvent::Started);
        // The engine exits on its own with status 7.
        assert_eq!(fx.next_event(), LifecycleEvent::Stopped { error: true });
        assert_eq!(fx.gate.wait(), GateEvent::Stopped(StopKind::Error));
        assert_eq!(fx.retention.released.load(Ordering::SeqCst), 1);
        assert_eq!(fx.indicator.lowered.load(Ordering::SeqCst), 1);
        fx.finish();
    }

    #[test]
    fn duplicate_start_is_a_no_op_while_running() {
        let fx = fixture(Arc::new(ScriptedBackend { exit_status: 0 }), false);
        fx.controller.request_start();
        assert_eq!(fx.next_event(), LifecycleEvent::Started);
        fx.controller.request_start();
        fx.controller.request_stop();
        assert_eq!(fx.next_event(), LifecycleEvent::Stopped { error: false });
        assert_eq!(fx.indicator.raised.load(Ordering::SeqCst), 1);
        fx.finish();
    }

    #[test]
    fn broken_subscriber_does_not_block_the_rest() {
        let fx = fixture(Arc::new(ScriptedBackend { exit_status: 0 }), false);
        struct BrokenSubscriber;
        impl EventSubscriber for BrokenSubscriber {
            fn deliver(&mut self, _event: LifecycleEvent) -> io::Result<()> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
            }
        }
        fx.registry.register(Box::new(BrokenSubscriber));

        fx.controller.request_start();
        assert_eq!(fx.next_event(), LifecycleEvent::Started);
        assert_eq!(fx.registry.len(), 1);
        fx.controller.request_stop();
        assert_eq!(fx.next_event(), LifecycleEvent::Stopped { error: false });
        fx.finish();
    }
}
