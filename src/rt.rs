//! Best-effort real-time thread tuning
//!
//! The listener thread requests `SCHED_FIFO` and, optionally, a pin to an
//! isolated CPU core at startup. Both are capability-gated OS requests:
//! failure degrades gracefully to default scheduling with a warning and
//! never aborts the session.

use crate::config::ListenerConfig;
use crate::error::{IrqError, IrqResult};

/// Pin the current thread to a specific CPU core.
pub fn pin_to_cpu(cpu: usize) -> IrqResult<()> {
    use nix::sched::{CpuSet, sched_setaffinity};
    use nix::unistd::Pid;

    let mut cpuset = CpuSet::new();
    cpuset.set(cpu)?;
    sched_setaffinity(Pid::from_raw(0), &cpuset)?;
    Ok(())
}

/// Set `SCHED_FIFO` with the given RT priority for the current thread.
pub fn set_fifo_priority(priority: i32) -> IrqResult<()> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    // SAFETY: plain syscall on the calling thread with a valid param struct.
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        return Err(IrqError::Io {
            source: std::io::Error::last_os_error(),
        });
    }
    Ok(())
}

/// Apply the configured tuning to the calling thread, warning on failure.
pub(crate) fn apply_thread_tuning(config: &ListenerConfig) {
    if let Some(cpu) = config.pin_cpu {
        match pin_to_cpu(cpu) {
            Ok(()) => tracing::debug!(cpu, "listener pinned to CPU"),
            Err(e) => tracing::warn!(cpu, error = %e, "CPU pinning failed, continuing unpinned"),
        }
    }

    if let Some(priority) = config.rt_priority {
        match set_fifo_priority(priority) {
            Ok(()) => tracing::debug!(priority, "listener running under SCHED_FIFO"),
            Err(e) => tracing::warn!(
                priority,
                error = %e,
                "SCHED_FIFO elevation failed (requires privilege), continuing at default scheduling"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_elevation_without_privilege_reports_error() {
        // Either we run privileged and it succeeds, or it fails with a
        // clean error. Both are acceptable; it must never panic.
        let _ = set_fifo_priority(80);
    }

    #[test]
    fn test_pin_to_current_cpu_succeeds() {
        // CPU 0 exists on any machine that can run the test suite.
        assert!(pin_to_cpu(0).is_ok());
    }

    #[test]
    fn test_pin_to_absurd_cpu_fails_cleanly() {
        assert!(pin_to_cpu(4096).is_err());
    }
}
