//! # fastirq — zero-copy interrupt event pipeline
//!
//! Delivers hardware interrupt events from a privileged interrupt-context
//! producer to a user-space consumer thread with minimal and bounded
//! latency. The transport is a shared, lock-free SPSC ring buffer mapped
//! zero-copy into this process; the consumer reads producer-written memory
//! directly, with no kernel-mediated copy in between.
//!
//! Designed for high-rate, low-jitter edge-triggered signals (GPIO pulses
//! and the like) where timestamp precision and drop-awareness matter more
//! than general-purpose convenience. This is strictly a local, in-memory,
//! two-party handoff: no fan-out, no transport, no persistence.
//!
//! ## Architecture
//!
//! ```text
//! hardware edge
//!      │
//!      ▼ (interrupt context: stamp, write slot, release-store head, wake)
//! ┌──────────────────┐   mmap    ┌──────────────────┐
//! │  Shared ring     │──────────►│  FastIrq listener│  SCHED_FIFO,
//! │  head/tail + 256 │           │  wait → drain →  │  pinned core
//! │  event records   │◄──────────│  dispatch → tail │  (best-effort)
//! └──────────────────┘  tail     └────────┬─────────┘
//!                                         │ handler push
//!                                         ▼
//!                                ┌──────────────────┐
//!                                │ SPSC decoupling  │──► application
//!                                │ queue (user mem) │    thread (pop)
//!                                └──────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use fastirq::{FastIrq, spsc};
//!
//! # fn main() -> Result<(), fastirq::IrqError> {
//! let (mut tx, mut rx) = spsc::channel(1024);
//!
//! let listener = FastIrq::open("/dev/rp1_gpio_irq");
//! listener.start(move |event| {
//!     // Interrupt-adjacent context: push and return, never block.
//!     let _ = tx.push(*event);
//! })?;
//!
//! while let Some(event) = rx.pop() {
//!     println!("{}\t{}", event.event_counter, event.timestamp_ns);
//! }
//!
//! listener.stop();
//! # Ok(())
//! # }
//! ```
//!
//! Without the device present, [`LoopbackChannel`] provides an in-process
//! producer with the identical ring layout and wake contract; the test
//! suite, benches and demos run on it.
//!
//! ## Guarantees
//!
//! - Each drained record is delivered to the handler exactly once, in
//!   publish (FIFO) order, across both pipeline stages.
//! - The producer path never blocks, allocates or unwinds; overflow follows
//!   the configured [`OverflowPolicy`] and is always countable.
//! - `stop()` is idempotent, callable from any thread, and joins the
//!   listener thread before the mapping and handle are released.
//! - Real-time scheduling and CPU pinning are best-effort: failure logs a
//!   warning and the session continues at default scheduling.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod event;
pub mod listener;
pub mod loopback;
pub mod mapping;
pub mod notify;
pub mod ring;
pub mod rt;
pub mod spsc;
pub mod stats;

pub use config::{DEFAULT_DEVICE_PATH, DEFAULT_POLL_TIMEOUT_MS, ListenerConfig};
pub use error::{IrqError, IrqResult};
pub use event::{IrqEvent, RING_CAPACITY};
pub use listener::{EventHandler, FastIrq, ListenerState};
pub use loopback::{LoopbackChannel, LoopbackProducer};
pub use mapping::{DeviceRing, MappedRing};
pub use ring::{OverflowPolicy, OwnedRing, RingConsumer, RingProducer, SharedRing};
pub use spsc::{SpscReceiver, SpscSender};
pub use stats::{DeltaRecorder, DeltaSummary, PulseStats, StatsSnapshot};

/// Initialize tracing for low-overhead logging.
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_thread_ids(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
