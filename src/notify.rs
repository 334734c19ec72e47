//! Notification plumbing between producer and consumer
//!
//! The consumer always blocks with a bounded timeout, never indefinitely, so
//! it can periodically re-check the shutdown flag even with no events
//! pending. Wakeups may coalesce: the drain loop re-reads the current head
//! on every wake *and* on every timeout expiry, so a missed or merged wakeup
//! never loses data.
//!
//! Two wait implementations cover the two producer kinds: `poll(2)` on the
//! producer's device descriptor, and an in-process gate (mutex + condvar)
//! for loopback producers.

use std::os::fd::BorrowedFd;
use std::time::Duration;

use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use parking_lot::{Condvar, Mutex};

use crate::error::IrqResult;

/// Outcome of one bounded wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The producer signaled readiness.
    Ready,
    /// The timeout expired with no signal.
    TimedOut,
}

/// Block until `fd` reports readable or `timeout` expires.
///
/// An interrupted wait (`EINTR`) is reported as a timeout; the caller's loop
/// retries it transparently, so the interruption is never surfaced.
pub fn wait_readable(fd: BorrowedFd<'_>, timeout: Duration) -> IrqResult<WaitOutcome> {
    let millis = timeout.as_millis().min(u128::from(u16::MAX)) as u16;
    let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];

    match poll(&mut fds, PollTimeout::from(millis)) {
        Ok(0) => Ok(WaitOutcome::TimedOut),
        Ok(_) => {
            let readable = fds[0]
                .revents()
                .map(|ev| ev.contains(PollFlags::POLLIN))
                .unwrap_or(false);
            if readable {
                Ok(WaitOutcome::Ready)
            } else {
                Ok(WaitOutcome::TimedOut)
            }
        }
        Err(nix::Error::EINTR) => Ok(WaitOutcome::TimedOut),
        Err(e) => Err(e.into()),
    }
}

/// In-process readiness gate for loopback producers: wake-one semantics with
/// a bounded wait, the same contract the device descriptor provides.
#[derive(Default)]
pub struct EventGate {
    pending: Mutex<bool>,
    cond: Condvar,
}

impl EventGate {
    /// Create an un-signaled gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal one blocked waiter. Signals coalesce: notifying an already
    /// signaled gate is a no-op.
    pub fn notify_one(&self) {
        let mut pending = self.pending.lock();
        *pending = true;
        self.cond.notify_one();
    }

    /// Block until signaled or `timeout` expires, consuming the signal.
    pub fn wait(&self, timeout: Duration) -> WaitOutcome {
        let mut pending = self.pending.lock();
        if !*pending {
            self.cond.wait_for(&mut pending, timeout);
        }
        if *pending {
            *pending = false;
            WaitOutcome::Ready
        } else {
            WaitOutcome::TimedOut
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn test_gate_times_out_when_unsignaled() {
        let gate = EventGate::new();
        let start = Instant::now();
        assert_eq!(gate.wait(Duration::from_millis(20)), WaitOutcome::TimedOut);
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn test_gate_wakes_blocked_waiter() {
        let gate = Arc::new(EventGate::new());
        let signaler = Arc::clone(&gate);

        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            signaler.notify_one();
        });

        assert_eq!(gate.wait(Duration::from_secs(2)), WaitOutcome::Ready);
        handle.join().unwrap();
    }

    #[test]
    fn test_gate_signals_coalesce() {
        let gate = EventGate::new();
        gate.notify_one();
        gate.notify_one();
        gate.notify_one();

        // One wait consumes the coalesced signal, the next times out.
        assert_eq!(gate.wait(Duration::from_millis(5)), WaitOutcome::Ready);
        assert_eq!(gate.wait(Duration::from_millis(5)), WaitOutcome::TimedOut);
    }
}
