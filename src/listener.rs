//! Listener session lifecycle and drain loop
//!
//! [`FastIrq`] owns the handle, mapping, thread and running flag for one
//! session, and enforces single-session with idempotent `start`/`stop`.
//!
//! State machine: `NotStarted → Starting → Running → Stopping → NotStarted`.
//! `Starting` opens and maps the shared region, validates its size, and
//! unwinds completely on failure (handle closed, no thread spawned).
//! `Running` is the drain loop: wait with a bounded timeout, acquire-load
//! the head, dispatch every newly published record in FIFO order, publish
//! the new tail, re-check the running flag. `Stopping` clears the flag and
//! joins the thread; the loop observes the flag within at most one timeout
//! period, and the mapping and handle are released only after the join.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::ListenerConfig;
use crate::error::{IrqError, IrqResult};
use crate::event::{IrqEvent, RING_CAPACITY};
use crate::loopback::LoopbackShared;
use crate::mapping::DeviceRing;
use crate::notify::{self, WaitOutcome};
use crate::ring::RingConsumer;
use crate::rt;

/// Handler invoked synchronously on the listener thread, once per drained
/// record, in tail order. It must not perform blocking I/O or unbounded
/// work: stalling the drain loop risks producer-side overflow. Decoupling
/// from slow downstream consumers is the handler's own responsibility,
/// typically via [`crate::spsc::channel`].
pub type EventHandler = Box<dyn FnMut(&IrqEvent) + Send>;

/// Observable listener lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    /// No session active; `start()` may be called.
    NotStarted,
    /// `start()` is opening and mapping the session resources.
    Starting,
    /// The listener thread is draining events.
    Running,
    /// `stop()` is joining the listener thread.
    Stopping,
}

/// Where a session's ring and notifications come from.
enum Source {
    /// The producer's device handle, opened at session start.
    Device { path: String },
    /// An in-process loopback channel (tests, benches, demos).
    Loopback { shared: Arc<LoopbackShared> },
}

/// Resources owned by the listener thread for the session's lifetime.
/// Dropped on thread exit, which `stop()` awaits via join, so the mapping
/// and handle are released only after the thread is gone.
enum Backing {
    Device { region: DeviceRing<RING_CAPACITY> },
    Loopback { shared: Arc<LoopbackShared> },
}

impl Backing {
    fn wait(&self, timeout: Duration) -> IrqResult<WaitOutcome> {
        match self {
            Backing::Device { region } => notify::wait_readable(region.fd(), timeout),
            Backing::Loopback { shared } => Ok(shared.gate.wait(timeout)),
        }
    }

    fn ring(&self) -> &crate::ring::SharedRing<RING_CAPACITY> {
        match self {
            Backing::Device { region } => region.shared(),
            Backing::Loopback { shared } => shared.region.shared(),
        }
    }
}

impl Drop for Backing {
    fn drop(&mut self) {
        if let Backing::Loopback { shared } = self {
            shared.consumer_attached.store(false, Ordering::Release);
        }
    }
}

struct Session {
    running: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

struct Inner {
    state: ListenerState,
    session: Option<Session>,
}

/// One producer-to-listener session over a shared ring.
///
/// `stop()` is idempotent and callable from any thread; dropping the value
/// implies `stop()`.
pub struct FastIrq {
    config: ListenerConfig,
    source: Source,
    inner: Mutex<Inner>,
}

impl FastIrq {
    /// Listener for the producer's device at the given path, with default
    /// configuration.
    pub fn open(device_path: impl Into<String>) -> Self {
        Self::with_config(ListenerConfig::for_device(device_path))
    }

    /// Listener configured explicitly; the device path comes from the
    /// configuration.
    pub fn with_config(config: ListenerConfig) -> Self {
        let path = config.device_path.clone();
        Self {
            config,
            source: Source::Device { path },
            inner: Mutex::new(Inner {
                state: ListenerState::NotStarted,
                session: None,
            }),
        }
    }

    pub(crate) fn for_loopback(shared: Arc<LoopbackShared>, config: ListenerConfig) -> Self {
        Self {
            config,
            source: Source::Loopback { shared },
            inner: Mutex::new(Inner {
                state: ListenerState::NotStarted,
                session: None,
            }),
        }
    }

    /// The session configuration.
    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ListenerState {
        self.inner.lock().state
    }

    /// True while a session is active.
    pub fn is_running(&self) -> bool {
        self.state() == ListenerState::Running
    }

    /// Open the session and spawn the listener thread.
    ///
    /// The handler runs on the listener thread once per drained record, in
    /// FIFO order. Fails with [`IrqError::AlreadyRunning`] when a session is
    /// active, or with the specific open/mapping failure, in which case
    /// everything is unwound and `start` may be retried.
    pub fn start<F>(&self, handler: F) -> IrqResult<()>
    where
        F: FnMut(&IrqEvent) + Send + 'static,
    {
        let mut inner = self.inner.lock();
        if inner.state != ListenerState::NotStarted {
            return Err(IrqError::AlreadyRunning);
        }
        inner.state = ListenerState::Starting;

        let backing = match self.open_backing() {
            Ok(backing) => backing,
            Err(e) => {
                inner.state = ListenerState::NotStarted;
                return Err(e);
            }
        };

        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);
        let config = self.config.clone();

        let spawn = std::thread::Builder::new()
            .name("fastirq-listener".to_string())
            .spawn(move || run_loop(backing, handler, config, thread_running));

        match spawn {
            Ok(thread) => {
                inner.session = Some(Session { running, thread });
                inner.state = ListenerState::Running;
                tracing::info!(device = self.device_label(), "listener session started");
                Ok(())
            }
            Err(source) => {
                inner.state = ListenerState::NotStarted;
                Err(IrqError::Io { source })
            }
        }
    }

    /// Tear the session down: clear the running flag, join the thread, then
    /// release the mapping and handle. Idempotent; calling it when already
    /// stopped, or before a successful `start`, is a safe no-op. Never
    /// deadlocks while the listener is blocked in its wait, because every
    /// wait is bounded.
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        let Some(session) = inner.session.take() else {
            inner.state = ListenerState::NotStarted;
            return;
        };
        inner.state = ListenerState::Stopping;

        session.running.store(false, Ordering::Release);
        if let Source::Loopback { shared } = &self.source {
            // Shortcut the bounded wait so loopback shutdown is immediate.
            shared.gate.notify_one();
        }

        if session.thread.join().is_err() {
            tracing::error!("listener thread panicked during session");
        }
        inner.state = ListenerState::NotStarted;
        tracing::info!(device = self.device_label(), "listener session stopped");
    }

    fn open_backing(&self) -> IrqResult<Backing> {
        match &self.source {
            Source::Device { path } => {
                let region = DeviceRing::open(path)?;
                Ok(Backing::Device { region })
            }
            Source::Loopback { shared } => {
                // One concurrent consumer per channel; a second session must
                // fail cleanly rather than corrupt the shared indices.
                if shared
                    .consumer_attached
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    return Err(IrqError::AlreadyRunning);
                }
                Ok(Backing::Loopback {
                    shared: Arc::clone(shared),
                })
            }
        }
    }

    fn device_label(&self) -> &str {
        match &self.source {
            Source::Device { path } => path,
            Source::Loopback { .. } => "loopback",
        }
    }
}

impl Drop for FastIrq {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The drain-and-dispatch loop, run on the listener thread.
fn run_loop<F>(backing: Backing, mut handler: F, config: ListenerConfig, running: Arc<AtomicBool>)
where
    F: FnMut(&IrqEvent) + Send + 'static,
{
    rt::apply_thread_tuning(&config);

    // Local tail picks up from the shared tail, so a new session never
    // replays records a previous one already dispatched.
    let mut consumer = unsafe { RingConsumer::new(backing.ring()) };
    let timeout = config.poll_timeout();

    while running.load(Ordering::Acquire) {
        match backing.wait(timeout) {
            // Drain on wake and on timeout alike; wakeups coalesce.
            Ok(_) => {
                consumer.drain(|event| handler(&event));
            }
            Err(e) => {
                tracing::error!(error = %e, "wait on notification channel failed, stopping drain loop");
                break;
            }
        }
    }

    tracing::debug!(tail = consumer.local_tail(), "drain loop exited");
}
