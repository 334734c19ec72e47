//! In-process loopback channel
//!
//! Stands in for the privileged producer when no device is present: same
//! ring layout, same publication protocol, same wake contract, backed by an
//! anonymous mapping instead of the device's. Used by the test suite,
//! benches and demos; production sessions open the device path instead.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use crate::config::ListenerConfig;
use crate::error::{IrqError, IrqResult};
use crate::event::{IrqEvent, RING_CAPACITY};
use crate::listener::FastIrq;
use crate::mapping::MappedRing;
use crate::notify::EventGate;
use crate::ring::{OverflowPolicy, PublishOutcome};

/// Shared state behind a loopback channel: the mapped ring, the wake gate,
/// and the attachment flags enforcing one producer and one consumer.
pub(crate) struct LoopbackShared {
    pub(crate) region: MappedRing<RING_CAPACITY>,
    pub(crate) gate: EventGate,
    pub(crate) producer_attached: AtomicBool,
    pub(crate) consumer_attached: AtomicBool,
}

/// An in-process stand-in for the producer's device.
///
/// Hands out exactly one [`LoopbackProducer`] and backs any number of
/// *sequential* listener sessions; a second concurrent session fails with
/// [`IrqError::AlreadyRunning`].
pub struct LoopbackChannel {
    shared: Arc<LoopbackShared>,
}

impl LoopbackChannel {
    /// Create a channel over a fresh anonymous mapping.
    pub fn new() -> IrqResult<Self> {
        Ok(Self {
            shared: Arc::new(LoopbackShared {
                region: MappedRing::anonymous()?,
                gate: EventGate::new(),
                producer_attached: AtomicBool::new(false),
                consumer_attached: AtomicBool::new(false),
            }),
        })
    }

    /// The producer side of the channel. At most one may exist.
    pub fn producer(&self, policy: OverflowPolicy) -> IrqResult<LoopbackProducer> {
        if self
            .shared
            .producer_attached
            .compare_exchange(
                false,
                true,
                std::sync::atomic::Ordering::AcqRel,
                std::sync::atomic::Ordering::Acquire,
            )
            .is_err()
        {
            return Err(IrqError::AlreadyRunning);
        }
        Ok(LoopbackProducer {
            shared: Arc::clone(&self.shared),
            policy,
            dropped: 0,
            counter: 0,
        })
    }

    /// A listener session consuming from this channel.
    pub fn listener(&self, config: ListenerConfig) -> FastIrq {
        FastIrq::for_loopback(Arc::clone(&self.shared), config)
    }
}

/// Producer half of a loopback channel, mirroring the interrupt-context
/// contract: publishing is bounded, non-blocking and non-allocating, and
/// never propagates an error.
pub struct LoopbackProducer {
    shared: Arc<LoopbackShared>,
    policy: OverflowPolicy,
    dropped: u64,
    counter: u32,
}

impl LoopbackProducer {
    /// Write and publish one record without signaling. Returns `false` when
    /// the record was refused under drop-new.
    pub fn publish(&mut self, event: IrqEvent) -> bool {
        let ring = self.shared.region.shared();
        // SAFETY: the channel hands out a single producer.
        match unsafe { ring.publish(event, self.policy) } {
            PublishOutcome::Stored => true,
            PublishOutcome::Evicted => {
                self.dropped += 1;
                true
            }
            PublishOutcome::Refused => {
                self.dropped += 1;
                false
            }
        }
    }

    /// Wake one blocked listener.
    pub fn wake(&self) {
        self.shared.gate.notify_one();
    }

    /// Stamp, publish and signal one event: the full per-edge producer
    /// procedure. `aux_state` is the sampled auxiliary state.
    pub fn pulse(&mut self, aux_state: u32) -> bool {
        self.counter = self.counter.wrapping_add(1);
        let event = IrqEvent {
            timestamp_ns: monotonic_ns(),
            event_counter: self.counter,
            aux_state,
        };
        let accepted = self.publish(event);
        self.wake();
        accepted
    }

    /// Records lost to the overflow policy so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// The configured overflow policy.
    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }
}

impl Drop for LoopbackProducer {
    fn drop(&mut self) {
        self.shared
            .producer_attached
            .store(false, std::sync::atomic::Ordering::Release);
    }
}

/// Monotonic clock reading in nanoseconds.
pub fn monotonic_ns() -> u64 {
    use nix::time::{ClockId, clock_gettime};
    match clock_gettime(ClockId::CLOCK_MONOTONIC) {
        Ok(ts) => ts.tv_sec() as u64 * 1_000_000_000 + ts.tv_nsec() as u64,
        Err(_) => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_producer_enforced() {
        let channel = LoopbackChannel::new().unwrap();
        let first = channel.producer(OverflowPolicy::DropNew).unwrap();
        assert!(matches!(
            channel.producer(OverflowPolicy::DropNew),
            Err(IrqError::AlreadyRunning)
        ));
        drop(first);
        assert!(channel.producer(OverflowPolicy::DropNew).is_ok());
    }

    #[test]
    fn test_pulse_stamps_increasing_counters() {
        let channel = LoopbackChannel::new().unwrap();
        let mut producer = channel.producer(OverflowPolicy::DropNew).unwrap();

        producer.pulse(0);
        producer.pulse(1);
        producer.pulse(0);

        assert_eq!(channel.shared.region.shared().len(), 3);
        assert_eq!(producer.dropped(), 0);
    }

    #[test]
    fn test_monotonic_ns_advances() {
        let a = monotonic_ns();
        let b = monotonic_ns();
        assert!(b >= a);
    }
}
