//! Serialised event queue feeding the lifecycle worker.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use tracing::debug;

use super::CONTROLLER_TARGET;

/// Events consumed by the lifecycle worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ControlEvent {
    Start,
    Stop,
    EngineError { status: i32 },
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<ControlEvent>,
    error_pending: bool,
    closed: bool,
}

/// Coalescing queue with engine-error priority.
///
/// A posted start or stop replaces whatever command is still pending, so the
/// worker only ever sees the most recent intent. Once an engine error is
/// posted it pre-empts everything: pending commands are dropped and later
/// posts are ignored until the error has been consumed.
#[derive(Debug, Default)]
pub(crate) struct EventQueue {
    state: Mutex<QueueState>,
    wakeup: Condvar,
}

impl EventQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn post_start(&self) {
        self.post_command(ControlEvent::Start);
    }

    pub(crate) fn post_stop(&self) {
        self.post_command(ControlEvent::Stop);
    }

    fn post_command(&self, event: ControlEvent) {
        let mut state = self.lock_state();
        if state.closed {
            return;
        }
        if state.error_pending {
            debug!(
                target: CONTROLLER_TARGET,
                ?event,
                "dropping command: engine error pending"
            );
            return;
        }
        state.pending.clear();
        state.pending.push_back(event);
        self.wakeup.notify_one();
    }

    pub(crate) fn post_error(&self, status: i32) {
        let mut state = self.lock_state();
        if state.closed || state.error_pending {
            return;
        }
        state.pending.clear();
        state.pending.push_back(ControlEvent::EngineError { status });
        state.error_pending = true;
        self.wakeup.notify_one();
    }

    /// Blocks until an event is available or the queue is closed.
    pub(crate) fn pop(&self) -> Option<ControlEvent> {
        let mut state = self.lock_state();
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some(event);
            }
            if state.closed {
                return None;
            }
            state = match self.wakeup.wait(state) {
                Ok(state) => state,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }

    /// Closes the queue; `pop` drains what remains and then yields `None`.
    pub(crate) fn close(&self) {
        let mut state = self.lock_state();
        state.closed = true;
        self.wakeup.notify_all();
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, QueueState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_command_replaces_the_pending_one() {
        let queue = EventQueue::new();
        queue.post_start();
        queue.post_stop();
        queue.post_start();
        assert_eq!(queue.pop(), Some(ControlEvent::Start));
        queue.close();
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn engine_error_pre_empts_pending_commands() {
        let queue = EventQueue::new();
        queue.post_start();
        queue.post_error(9);
        assert_eq!(queue.pop(), Some(ControlEvent::EngineError { status: 9 }));
    }

    #[test]
    fn commands_after_an_error_are_ignored() {
        let queue = EventQueue::new();
        queue.post_error(1);
        queue.post_start();
        queue.post_stop();
        assert_eq!(queue.pop(), Some(ControlEvent::EngineError { status: 1 }));
        queue.close();
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn only_the_first_error_is_kept() {
        let queue = EventQueue::new();
        queue.post_error(1);
        queue.post_error(2);
        assert_eq!(queue.pop(), Some(ControlEvent::EngineError { status: 1 }));
        queue.close();
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn close_unblocks_pop() {
        let queue = std::sync::Arc::new(EventQueue::new());
        let popper = {
            let queue = std::sync::Arc::clone(&queue);
            std::thread::spawn(move || queue.pop())
        };
        std::thread::sleep(std::time::Duration::from_millis(20));
        queue.close();
        assert_eq!(popper.join().expect("join popper"), None);
    }
}
