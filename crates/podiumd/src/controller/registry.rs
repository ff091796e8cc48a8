//! Subscriber registry for lifecycle event fan-out.

use std::io;
use std::sync::Mutex;

use podium_daemon_types::LifecycleEvent;
use tracing::{debug, warn};

use super::CONTROLLER_TARGET;

/// Receives lifecycle events, typically by writing them to a client stream.
pub trait EventSubscriber: Send {
    /// Delivers one event to the subscriber.
    ///
    /// # Errors
    ///
    /// Returns an IO error when delivery fails; the registry drops the
    /// subscriber in response.
    fn deliver(&mut self, event: LifecycleEvent) -> io::Result<()>;
}

struct Entry {
    token: u64,
    subscriber: Box<dyn EventSubscriber>,
}

/// Token-addressed set of lifecycle subscribers.
///
/// Broadcast never fails: a subscriber whose delivery errors is dropped from
/// the set and the remaining subscribers still receive the event.
#[derive(Default)]
pub struct SubscriberRegistry {
    inner: Mutex<RegistryState>,
}

#[derive(Default)]
struct RegistryState {
    entries: Vec<Entry>,
    next_token: u64,
}

impl SubscriberRegistry {
    /// Builds an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber and returns its token.
    pub fn register(&self, subscriber: Box<dyn EventSubscriber>) -> u64 {
        let mut state = self.lock_state();
        let token = state.next_token;
        state.next_token += 1;
        state.entries.push(Entry { token, subscriber });
        debug!(
            target: CONTROLLER_TARGET,
            token,
            subscribers = state.entries.len(),
            "lifecycle subscriber registered"
        );
        token
    }

    /// Removes a subscriber; unknown tokens are a no-op.
    pub fn unregister(&self, token: u64) {
        let mut state = self.lock_state();
        let before = state.entries.len();
        state.entries.retain(|entry| entry.token != token);
        if state.entries.len() != before {
            debug!(
                target: CONTROLLER_TARGET,
                token,
                subscribers = state.entries.len(),
                "lifecycle subscriber removed"
            );
        }
    }

    /// Delivers `event` to every subscriber, dropping those that fail.
    pub fn broadcast(&self, event: LifecycleEvent) {
        let mut state = self.lock_state();
        state.entries.retain_mut(|entry| {
            match entry.subscriber.deliver(event) {
                Ok(()) => true,
                Err(error) => {
                    warn!(
                        target: CONTROLLER_TARGET,
                        token = entry.token,
                        error = %error,
                        "dropping lifecycle subscriber after failed delivery"
                    );
                    false
                }
            }
        });
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock_state().entries.len()
    }

    /// Reports whether no subscribers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, RegistryState> {
        match self.inner.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct RecordingSubscriber {
        delivered: Arc<AtomicUsize>,
        fail: bool,
    }

    impl EventSubscriber for RecordingSubscriber {
        fn deliver(&mut self, _event: LifecycleEvent) -> io::Result<()> {
            if self.fail {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone"));
            }
            self.delivered.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn broadcast_reaches_every_subscriber() {
        let registry = SubscriberRegistry::new();
        let delivered = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            registry.register(Box::new(RecordingSubscriber {
                delivered: Arc::clone(&delivered),
                fail: false,
            }));
        }
        registry.broadcast(LifecycleEvent::Started);
        assert_eq!(delivered.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn failed_delivery_drops_only_the_broken_subscriber() {
        let registry = SubscriberRegistry::new();
        let delivered = Arc::new(AtomicUsize::new(0));
        registry.register(Box::new(RecordingSubscriber {
            delivered: Arc::clone(&delivered),
            fail: false,
        }));
        registry.register(Box::new(RecordingSubscriber {
            delivered: Arc::clone(&delivered),
            fail: true,
        }));
        registry.register(Box::new(RecordingSubscriber {
            delivered: Arc::clone(&delivered),
            fail: false,
        }));

        registry.broadcast(LifecycleEvent::stopped(true));
        assert_eq!(delivered.load(Ordering::SeqCst), 2);
        assert_eq!(registry.len(), 2);

        registry.broadcast(LifecycleEvent::stopped(false));
        assert_eq!(delivered.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn unregister_is_idempotent() {
        let registry = SubscriberRegistry::new();
        let delivered = Arc::new(AtomicUsize::new(0));
        let token = registry.register(Box::new(RecordingSubscriber {
            delivered,
            fail: false,
        }));
        registry.unregister(token);
        registry.unregister(token);
        assert!(registry.is_empty());
    }
}
