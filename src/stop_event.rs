//! Manual-reset event used to ask a service workload to stop.
use std::{
    fmt,
    sync::{Arc, Condvar, Mutex, PoisonError},
    time::{Duration, Instant},
};

#[derive(Default)]
struct Inner {
    signaled: Mutex<bool>,
    cond: Condvar,
}

/// One-shot, manually reset stop signal.
///
/// Starts unsignaled and stays signaled once [`StopEvent::signal`] has been
/// called. Clones refer to the same event, so a caller can keep one clone and
/// hand another to the runtime.
#[derive(Clone, Default)]
pub struct StopEvent {
    inner: Arc<Inner>,
}

impl StopEvent {
    /// Creates a new unsignaled event.
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals the event and wakes every waiter.
    ///
    /// Returns `true` only for the call that moved the event to signaled.
    pub fn signal(&self) -> bool {
        let mut signaled = self
            .inner
            .signaled
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if *signaled {
            return false;
        }
        *signaled = true;
        self.inner.cond.notify_all();
        true
    }

    pub fn is_signaled(&self) -> bool {
        *self
            .inner
            .signaled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Waits up to `timeout` for the event. Returns `true` if it is signaled.
    ///
    /// A timeout too large to express as a deadline waits without one.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            self.wait();
            return true;
        };
        let mut signaled = self
            .inner
            .signaled
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        while !*signaled {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .inner
                .cond
                .wait_timeout(signaled, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            signaled = guard;
        }
        true
    }

    /// Blocks until the event is signaled.
    pub fn wait(&self) {
        let mut signaled = self
            .inner
            .signaled
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while !*signaled {
            signaled = self
                .inner
                .cond
                .wait(signaled)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Whether both handles refer to the same underlying event.
    pub fn same_event(&self, other: &StopEvent) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for StopEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StopEvent")
            .field("signaled", &self.is_signaled())
            .finish()
    }
}
