/*!
Readiness/timeout coordination.

Bridges edge-triggered transport notifications into a wait primitive so a
session can emulate blocking (optionally bounded) semantics on top of a
non-blocking transport. One [`Readiness`] exists per session; the transport
holds a notifier closure capturing it.
*/

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

use crate::core::socket::{Sigio, Timeout};

/// Binary event signal plus a relay for the caller's own `sigio` callback
#[derive(Clone, Default)]
pub struct Readiness {
    inner: Arc<ReadinessInner>,
}

#[derive(Default)]
struct ReadinessInner {
    /// Set by the notifier, consumed by `wait_for_activity`
    flag: Mutex<bool>,
    cond: Condvar,
    /// Caller-registered activity callback
    relay: Mutex<Option<Sigio>>,
    /// Number of notifications received
    events: AtomicU64,
}

impl ReadinessInner {
    fn signal(&self) {
        {
            let mut flag = self.flag.lock();
            *flag = true;
        }
        self.cond.notify_one();
        self.events.fetch_add(1, Ordering::Relaxed);

        // Clone out of the lock so the callback may re-register itself.
        let relay = self.relay.lock().clone();
        if let Some(callback) = relay {
            callback();
        }
    }
}

impl Readiness {
    /// Create a new coordinator with the signal cleared
    pub fn new() -> Self {
        Self::default()
    }

    /// Callback to register on the transport.
    ///
    /// Every invocation sets the event signal and re-fires the relay.
    pub fn notifier(&self) -> Sigio {
        let inner = Arc::clone(&self.inner);
        Arc::new(move || inner.signal())
    }

    /// Register (or clear) the caller's activity callback
    pub fn set_relay(&self, callback: Option<Sigio>) {
        *self.inner.relay.lock() = callback;
    }

    /// Whether a relay callback is registered
    pub fn has_relay(&self) -> bool {
        self.inner.relay.lock().is_some()
    }

    /// Set the signal as if the transport had reported activity
    pub fn notify(&self) {
        self.inner.signal();
    }

    /// Total number of notifications received so far
    pub fn event_count(&self) -> u64 {
        self.inner.events.load(Ordering::Relaxed)
    }

    /// Wait until the signal is set or `timeout` elapses.
    ///
    /// Returns `true` if activity was observed (the signal is consumed), or
    /// `false` on timeout. `Timeout::Immediate` never suspends and never
    /// consumes the signal.
    pub fn wait_for_activity(&self, timeout: Timeout) -> bool {
        if timeout.is_immediate() {
            return false;
        }

        // A duration past the clock's range waits like `Infinite`.
        let deadline = match timeout {
            Timeout::After(duration) => Instant::now().checked_add(duration),
            _ => None,
        };

        let mut flag = self.inner.flag.lock();
        match deadline {
            Some(deadline) => {
                while !*flag {
                    if self.inner.cond.wait_until(&mut flag, deadline).timed_out() {
                        break;
                    }
                }
            }
            None => {
                while !*flag {
                    self.inner.cond.wait(&mut flag);
                }
            }
        }

        let signaled = *flag;
        *flag = false;
        signaled
    }
}

impl std::fmt::Debug for Readiness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Readiness")
            .field("pending", &*self.inner.flag.lock())
            .field("events", &self.event_count())
            .field("relay", &self.has_relay())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_immediate_never_waits() {
        let readiness = Readiness::new();
        readiness.notify();
        assert!(!readiness.wait_for_activity(Timeout::Immediate));
        // The pending signal is still there for a blocking waiter.
        assert!(readiness.wait_for_activity(Timeout::Infinite));
    }

    #[test]
    fn test_wait_consumes_signal() {
        let readiness = Readiness::new();
        let notify = readiness.notifier();
        notify();
        assert!(readiness.wait_for_activity(Timeout::After(Duration::from_millis(10))));
        assert!(!readiness.wait_for_activity(Timeout::After(Duration::from_millis(10))));
    }

    #[test]
    fn test_timeout_elapses() {
        let readiness = Readiness::new();
        let start = Instant::now();
        assert!(!readiness.wait_for_activity(Timeout::After(Duration::from_millis(20))));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_unrepresentable_deadline_waits_for_signal() {
        let readiness = Readiness::new();
        readiness.notify();
        assert!(readiness.wait_for_activity(Timeout::After(Duration::MAX)));

        let notify = readiness.notifier();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            notify();
        });
        assert!(readiness.wait_for_activity(Timeout::After(Duration::MAX)));
        handle.join().unwrap();
    }

    #[test]
    fn test_wakeup_from_other_thread() {
        let readiness = Readiness::new();
        let notify = readiness.notifier();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            notify();
        });
        assert!(readiness.wait_for_activity(Timeout::Infinite));
        handle.join().unwrap();
    }

    #[test]
    fn test_relay_fires_on_every_event() {
        let readiness = Readiness::new();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        readiness.set_relay(Some(Arc::new(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        })));

        let notify = readiness.notifier();
        notify();
        notify();
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(readiness.event_count(), 2);

        readiness.set_relay(None);
        notify();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
