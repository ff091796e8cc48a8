//! Shutdown gate coordinating process exit.
//!
//! The daemon process exits when either the lifecycle worker finishes (clean
//! stop or engine error) or a termination signal arrives. The gate records
//! whichever happens first; the launch sequence blocks on it and maps the
//! outcome to the process exit code.

use std::sync::{Condvar, Mutex};
use std::thread;
use std::time::Duration;

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use thiserror::Error;
use tracing::info;

use super::PROCESS_TARGET;

/// How the lifecycle worker concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopKind {
    /// The engine stopped on request.
    Clean,
    /// The engine failed to start or exited with an error.
    Error,
}

/// Events observable through the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateEvent {
    /// A termination signal arrived before the worker finished.
    Signal,
    /// The lifecycle worker finished.
    Stopped(StopKind),
}

#[derive(Debug, Default)]
struct GateState {
    event: Option<GateEvent>,
}

/// One-shot rendezvous between the lifecycle worker and the launch sequence.
///
/// The first recorded event wins; later notifications are ignored, except
/// that a worker conclusion arriving after a signal is still remembered so
/// [`ShutdownGate::wait_stopped`] can observe it.
#[derive(Debug, Default)]
pub struct ShutdownGate {
    state: Mutex<GateState>,
    wakeup: Condvar,
}

impl ShutdownGate {
    /// Builds an idle gate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a termination signal.
    pub fn signal(&self) {
        let mut state = self.lock_state();
        if state.event.is_none() {
            state.event = Some(GateEvent::Signal);
            self.wakeup.notify_all();
        }
    }

    /// Records the lifecycle worker's conclusion.
    pub fn stopped(&self, kind: StopKind) {
        let mut state = self.lock_state();
        match state.event {
            None | Some(GateEvent::Signal) => {
                state.event = Some(GateEvent::Stopped(kind));
                self.wakeup.notify_all();
            }
            Some(GateEvent::Stopped(_)) => {}
        }
    }

    /// Blocks until any event has been recorded.
    pub fn wait(&self) -> GateEvent {
        let mut state = self.lock_state();
        loop {
            if let Some(event) = state.event {
                return event;
            }
            state = match self.wakeup.wait(state) {
                Ok(state) => state,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }

    /// Waits up to `timeout` for a worker conclusion.
    ///
    /// Used after a signal-triggered stop request to give the worker a budget
    /// for finishing cleanly.
    pub fn wait_stopped(&self, timeout: Duration) -> Option<StopKind> {
        let deadline = std::time::Instant::now() + timeout;
        let mut state = self.lock_state();
        loop {
            if let Some(GateEvent::Stopped(kind)) = state.event {
                return Some(kind);
            }
            let now = std::time::Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, result) = match self.wakeup.wait_timeout(state, deadline - now) {
                Ok(pair) => pair,
                Err(poisoned) => poisoned.into_inner(),
            };
            state = guard;
            if result.timed_out() {
                if let Some(GateEvent::Stopped(kind)) = state.event {
                    return Some(kind);
                }
                return None;
            }
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, GateState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Errors reported while installing signal handling.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Installing signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Forwards termination signals to a shutdown gate from a background thread.
pub(crate) fn install_signal_listener(
    gate: std::sync::Arc<ShutdownGate>,
) -> Result<(), ShutdownError> {
    let mut signals = Signals::new([SIGTERM, SIGINT, SIGQUIT, SIGHUP])
        .map_err(|source| ShutdownError::Install { source })?;
    thread::Builder::new()
        .name("signals".to_owned())
        .spawn(move || {
            if let Some(signal) = signals.forever().next() {
                info!(
                    target: PROCESS_TARGET,
                    signal,
                    "termination signal received"
                );
                gate.signal();
            }
        })
        .map_err(|source| ShutdownError::Install { source })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn first_event_wins_for_wait() {
        let gate = ShutdownGate::new();
        gate.signal();
        gate.stopped(StopKind::Clean);
        assert_eq!(gate.wait(), GateEvent::Signal);
    }

    #[test]
    fn worker_conclusion_after_signal_is_observable() {
        let gate = ShutdownGate::new();
        gate.signal();
        gate.stopped(StopKind::Clean);
        assert_eq!(
            gate.wait_stopped(Duration::from_millis(10)),
            Some(StopKind::Clean)
        );
    }

    #[test]
    fn wait_stopped_times_out_without_a_conclusion() {
        let gate = ShutdownGate::new();
        gate.signal();
        assert_eq!(gate.wait_stopped(Duration::from_millis(20)), None);
    }

    #[test]
    fn wait_blocks_until_an_event_arrives() {
        let gate = Arc::new(ShutdownGate::new());
        let waiter = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || gate.wait())
        };
        thread::sleep(Duration::from_millis(20));
        gate.stopped(StopKind::Error);
        assert_eq!(
            waiter.join().expect("join waiter"),
            GateEvent::Stopped(StopKind::Error)
        );
    }
}
