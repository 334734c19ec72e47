//! Application-side pulse metrics
//!
//! Explicit metrics objects owned by the application and shared with the
//! handler, instead of process-wide mutable counters. [`PulseStats`] is
//! cheap enough to update from the listener thread (relaxed atomics only);
//! [`DeltaRecorder`] captures inter-event deltas for offline jitter
//! analysis.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use serde::Serialize;

use crate::event::IrqEvent;

/// Counters updated by the handler, read by any thread.
#[derive(Debug, Default)]
pub struct PulseStats {
    dispatched: AtomicU64,
    hardware_drops: AtomicU64,
    queue_drops: AtomicU64,
    last_counter: AtomicU32,
    window: AtomicU64,
}

/// Point-in-time copy of the counters, serializable for logs or reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Events dispatched to the handler.
    pub dispatched: u64,
    /// Events the producer lost, inferred from gaps in `event_counter`.
    pub hardware_drops: u64,
    /// Events the application dropped on a full decoupling queue.
    pub queue_drops: u64,
}

impl PulseStats {
    /// Fresh zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one dispatched event. Detects producer-side drops through
    /// gaps in the event counter; counter wrap at 2^32 is handled.
    pub fn record(&self, event: &IrqEvent) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        self.window.fetch_add(1, Ordering::Relaxed);

        let previous = self.last_counter.swap(event.event_counter, Ordering::Relaxed);
        if previous != 0 {
            let gap = event.event_counter.wrapping_sub(previous);
            if gap > 1 {
                self.hardware_drops
                    .fetch_add(u64::from(gap - 1), Ordering::Relaxed);
            }
        }
    }

    /// Record one event dropped on a full decoupling queue.
    pub fn note_queue_drop(&self) {
        self.queue_drops.fetch_add(1, Ordering::Relaxed);
    }

    /// Events dispatched so far.
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// Producer-side drops inferred so far.
    pub fn hardware_drops(&self) -> u64 {
        self.hardware_drops.load(Ordering::Relaxed)
    }

    /// Decoupling-queue drops recorded so far.
    pub fn queue_drops(&self) -> u64 {
        self.queue_drops.load(Ordering::Relaxed)
    }

    /// Take and reset the windowed count. Called once per display interval,
    /// this yields counts-per-interval (e.g. CPS at one second).
    pub fn take_window(&self) -> u64 {
        self.window.swap(0, Ordering::Relaxed)
    }

    /// Copy of the counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            dispatched: self.dispatched(),
            hardware_drops: self.hardware_drops(),
            queue_drops: self.queue_drops(),
        }
    }
}

/// Bounded recorder of inter-event timestamp deltas.
///
/// Backing storage is allocated up front; recording is allocation-free and
/// silently stops at capacity, so it is safe to call from the handler.
#[derive(Debug)]
pub struct DeltaRecorder {
    last_ns: u64,
    deltas: Vec<u64>,
}

/// Aggregate view over the recorded deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeltaSummary {
    /// Number of recorded deltas.
    pub samples: usize,
    /// Smallest delta in nanoseconds.
    pub min_ns: u64,
    /// Largest delta in nanoseconds.
    pub max_ns: u64,
    /// Mean delta in nanoseconds.
    pub mean_ns: u64,
}

impl DeltaRecorder {
    /// Recorder with room for `capacity` deltas.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            last_ns: 0,
            deltas: Vec::with_capacity(capacity),
        }
    }

    /// Record the delta between this event and the previous one. The first
    /// event only seeds the baseline.
    pub fn record(&mut self, event: &IrqEvent) {
        if self.last_ns != 0 && self.deltas.len() < self.deltas.capacity() {
            self.deltas.push(event.timestamp_ns - self.last_ns);
        }
        self.last_ns = event.timestamp_ns;
    }

    /// The recorded deltas, in arrival order.
    pub fn deltas(&self) -> &[u64] {
        &self.deltas
    }

    /// Summarize the recording, or `None` when nothing was recorded.
    pub fn summary(&self) -> Option<DeltaSummary> {
        if self.deltas.is_empty() {
            return None;
        }
        let min_ns = *self.deltas.iter().min().unwrap();
        let max_ns = *self.deltas.iter().max().unwrap();
        let sum: u128 = self.deltas.iter().map(|&d| u128::from(d)).sum();
        Some(DeltaSummary {
            samples: self.deltas.len(),
            min_ns,
            max_ns,
            mean_ns: (sum / self.deltas.len() as u128) as u64,
        })
    }
}
