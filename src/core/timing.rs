use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// How a timed wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Elapsed,
    Cancelled,
}

/// Shared cancellation flag with an interruptible timed wait.
///
/// Cancellation is an outcome, not an error: every loop in the engines checks
/// the returned [`WaitOutcome`] and winds down cleanly on `Cancelled`.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    cancelled: Mutex<bool>,
    condvar: Condvar,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let mut cancelled = self.inner.cancelled.lock();
        *cancelled = true;
        self.inner.condvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancelled.lock()
    }

    /// Sleep for `timeout`, waking early if cancelled.
    pub fn wait(&self, timeout: Duration) -> WaitOutcome {
        let deadline = Instant::now() + timeout;
        let mut cancelled = self.inner.cancelled.lock();
        while !*cancelled {
            if self
                .inner
                .condvar
                .wait_until(&mut cancelled, deadline)
                .timed_out()
            {
                return if *cancelled {
                    WaitOutcome::Cancelled
                } else {
                    WaitOutcome::Elapsed
                };
            }
        }
        WaitOutcome::Cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn wait_elapses() {
        let token = CancelToken::new();
        let start = Instant::now();
        let outcome = token.wait(Duration::from_millis(30));

        assert_eq!(outcome, WaitOutcome::Elapsed);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn cancel_unblocks_waiter() {
        let token = CancelToken::new();
        let waiter = token.clone();

        let handle = thread::spawn(move || waiter.wait(Duration::from_secs(10)));
        thread::sleep(Duration::from_millis(20));
        token.cancel();

        assert_eq!(handle.join().unwrap(), WaitOutcome::Cancelled);
    }

    #[test]
    fn wait_after_cancel_returns_immediately() {
        let token = CancelToken::new();
        token.cancel();

        let start = Instant::now();
        assert_eq!(token.wait(Duration::from_secs(5)), WaitOutcome::Cancelled);
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
