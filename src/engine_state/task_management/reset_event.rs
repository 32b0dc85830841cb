//! An auto-reset event for waking background loops.

use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

/// A signal that wakes one waiter and then resets itself.
///
/// Setting an already set event is a no-op, so any number of wake-ups
/// requested while the waiter is busy collapse into a single pass.
#[derive(Debug, Default)]
pub struct ResetEvent {
    signaled: Mutex<bool>,
    condvar: Condvar,
}

impl ResetEvent {
    /// Creates an unset event.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the event, waking a waiter.
    pub fn set(&self) {
        let mut signaled = self.signaled.lock().unwrap_or_else(PoisonError::into_inner);
        *signaled = true;
        self.condvar.notify_one();
    }

    /// Returns `true` if the event is set and nobody consumed it yet.
    pub fn is_set(&self) -> bool {
        *self.signaled.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until the event is set, then resets it.
    pub fn wait(&self) {
        let signaled = self.signaled.lock().unwrap_or_else(PoisonError::into_inner);
        let mut signaled = self
            .condvar
            .wait_while(signaled, |signaled| !*signaled)
            .unwrap_or_else(PoisonError::into_inner);
        *signaled = false;
    }

    /// Like [`Self::wait`] but gives up after `timeout`.
    ///
    /// # Returns
    /// `true` if the event was set
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let signaled = self.signaled.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut signaled, _) = self
            .condvar
            .wait_timeout_while(signaled, timeout, |signaled| !*signaled)
            .unwrap_or_else(PoisonError::into_inner);
        let was_set = *signaled;
        *signaled = false;
        was_set
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn wake_ups_collapse() {
        let event = ResetEvent::new();
        event.set();
        event.set();
        assert!(event.is_set());
        event.wait();
        assert!(!event.is_set());
        assert!(!event.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn wakes_a_waiting_thread() {
        let event = Arc::new(ResetEvent::new());
        let waiter = {
            let event = event.clone();
            thread::spawn(move || event.wait_timeout(Duration::from_secs(10)))
        };
        event.set();
        assert!(waiter.join().unwrap());
    }
}
