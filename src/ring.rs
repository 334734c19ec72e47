//! Shared SPSC ring buffer and its memory-ordering protocol
//!
//! The ring is a fixed-capacity circular array of [`IrqEvent`] records plus a
//! pair of monotonically increasing indices. `head` is written only by the
//! producer, `tail` only by the consumer; neither side ever writes the
//! other's index (the one exception is the overwrite-oldest overflow policy,
//! which advances `tail` by one to reclaim the oldest slot).
//!
//! Publication protocol: the producer writes the full record into
//! `head % N`, then release-stores `head + 1`. A consumer that acquire-loads
//! the new `head` is therefore guaranteed to observe the fully written
//! record. The consumer mirrors this on its side: it copies records out,
//! then release-stores the new `tail` so the producer can reclaim slots.
//!
//! Invariant at every observation point: `0 <= head - tail <= N` (in
//! wrapping u32 arithmetic; N is a power of two, so index wrap at 2^32 is
//! transparent).

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

use crate::event::IrqEvent;

/// Producer-side rule applied when the consumer has not kept pace and the
/// ring is full. A fixed configuration choice, never decided per build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Refuse the write, count it as dropped, leave `head` unchanged.
    #[default]
    DropNew,
    /// Perform the write and advance `tail` by one, sacrificing the oldest
    /// unread record.
    OverwriteOldest,
}

/// What one publish call actually did to the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PublishOutcome {
    /// The record was written into a free slot.
    Stored,
    /// The record was written after evicting the oldest unread record.
    Evicted,
    /// The record was refused under [`OverflowPolicy::DropNew`].
    Refused,
}

/// Index pair at the head of the shared region. Layout-compatible with the
/// producing side's `{ u32 head; u32 tail; }` header.
#[repr(C)]
#[derive(Debug)]
pub struct RingHeader {
    /// Producer-owned publish index.
    pub head: AtomicU32,
    /// Consumer-owned reclaim index.
    pub tail: AtomicU32,
}

const _: () = assert!(size_of::<RingHeader>() == 8);

/// The shared ring as it exists in mapped memory: header followed by the
/// slot array, no padding in between beyond natural alignment.
#[repr(C)]
pub struct SharedRing<const N: usize> {
    header: RingHeader,
    slots: [UnsafeCell<IrqEvent>; N],
}

// SPSC discipline: slot accesses are synchronized through the head/tail
// acquire/release protocol, at most one producer and one consumer at a time.
unsafe impl<const N: usize> Sync for SharedRing<N> {}
unsafe impl<const N: usize> Send for SharedRing<N> {}

impl<const N: usize> SharedRing<N> {
    pub(crate) const CAPACITY_OK: () =
        assert!(N > 0 && N.is_power_of_two() && N <= (u32::MAX as usize / 2));

    /// Unpadded byte length of the shared structure.
    pub const BYTES: usize = size_of::<Self>();

    /// Ring capacity in records.
    pub const fn capacity() -> usize {
        N
    }

    /// Acquire-load of the producer index.
    pub fn head(&self) -> u32 {
        self.header.head.load(Ordering::Acquire)
    }

    /// Acquire-load of the consumer index.
    pub fn tail(&self) -> u32 {
        self.header.tail.load(Ordering::Acquire)
    }

    /// Number of published, not yet consumed records.
    pub fn len(&self) -> u32 {
        self.head().wrapping_sub(self.tail())
    }

    /// True when no published record is pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write one record and publish it. Bounded, non-blocking,
    /// non-allocating; the outcome reports what occupancy at the time of the
    /// call actually forced, so drop tallies never rely on a stale snapshot.
    ///
    /// # Safety
    /// At most one producer may call this at a time.
    pub(crate) unsafe fn publish(&self, event: IrqEvent, policy: OverflowPolicy) -> PublishOutcome {
        let head = self.header.head.load(Ordering::Relaxed);
        let tail = self.header.tail.load(Ordering::Acquire);

        let mut outcome = PublishOutcome::Stored;
        if head.wrapping_sub(tail) >= N as u32 {
            match policy {
                OverflowPolicy::DropNew => return PublishOutcome::Refused,
                OverflowPolicy::OverwriteOldest => {
                    // Reclaim the oldest slot before writing over it.
                    self.header
                        .tail
                        .store(tail.wrapping_add(1), Ordering::Release);
                    outcome = PublishOutcome::Evicted;
                }
            }
        }

        let slot = head as usize & (N - 1);
        unsafe { *self.slots[slot].get() = event };
        self.header.head.store(head.wrapping_add(1), Ordering::Release);
        outcome
    }

    /// Copy out every record published since `local_tail`, invoking
    /// `dispatch` per record in tail order, then publish the new tail.
    /// Returns the number of records drained.
    ///
    /// # Safety
    /// At most one consumer may call this at a time.
    pub(crate) unsafe fn consume(
        &self,
        local_tail: &mut u32,
        mut dispatch: impl FnMut(IrqEvent),
    ) -> usize {
        let head = self.header.head.load(Ordering::Acquire);

        // Overwrite-oldest eviction advances the shared tail past slots this
        // consumer has not read yet. Adopt it whenever it is closer to head
        // than our local tail, so evicted records are never replayed.
        let shared_tail = self.header.tail.load(Ordering::Acquire);
        if head.wrapping_sub(shared_tail) < head.wrapping_sub(*local_tail) {
            *local_tail = shared_tail;
        }

        let mut drained = 0usize;

        while *local_tail != head {
            let slot = *local_tail as usize & (N - 1);
            let event = unsafe { *self.slots[slot].get() };
            dispatch(event);
            *local_tail = local_tail.wrapping_add(1);
            drained += 1;
        }

        if drained > 0 {
            self.header.tail.store(*local_tail, Ordering::Release);
        }
        drained
    }
}

/// Stateful producer handle over a shared ring.
///
/// Obtained safely from [`OwnedRing::split`]; the unsafe constructor exists
/// for callers that manage the single-producer discipline themselves.
pub struct RingProducer<'r, const N: usize> {
    ring: &'r SharedRing<N>,
    policy: OverflowPolicy,
    dropped: u64,
}

impl<'r, const N: usize> RingProducer<'r, N> {
    /// Wrap a shared ring as its producer side.
    ///
    /// # Safety
    /// The caller must guarantee this is the only producer for `ring`.
    pub unsafe fn new(ring: &'r SharedRing<N>, policy: OverflowPolicy) -> Self {
        Self {
            ring,
            policy,
            dropped: 0,
        }
    }

    /// Publish one record per the configured overflow policy. Returns
    /// `false` when the record was refused (drop-new on a full ring).
    pub fn publish(&mut self, event: IrqEvent) -> bool {
        match unsafe { self.ring.publish(event, self.policy) } {
            PublishOutcome::Stored => true,
            PublishOutcome::Evicted => {
                // The oldest unread record was sacrificed for this one.
                self.dropped += 1;
                true
            }
            PublishOutcome::Refused => {
                self.dropped += 1;
                false
            }
        }
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

/// Stateful consumer handle over a shared ring.
///
/// The local tail starts at the shared `tail` index, so a new consumer never
/// replays records a previous session already dispatched.
pub struct RingConsumer<'r, const N: usize> {
    ring: &'r SharedRing<N>,
    tail: u32,
}

impl<'r, const N: usize> RingConsumer<'r, N> {
    /// Wrap a shared ring as its consumer side.
    ///
    /// # Safety
    /// The caller must guarantee this is the only consumer for `ring`.
    pub unsafe fn new(ring: &'r SharedRing<N>) -> Self {
        let tail = ring.tail();
        Self { ring, tail }
    }

    /// Drain everything published so far, in FIFO order. Safe to call on
    /// every wakeup and every timeout expiry; wakeup coalescing loses
    /// nothing because the current head is re-read each call.
    pub fn drain(&mut self, dispatch: impl FnMut(IrqEvent)) -> usize {
        unsafe { self.ring.consume(&mut self.tail, dispatch) }
    }

    /// The consumer's local tail index.
    pub fn local_tail(&self) -> u32 {
        self.tail
    }
}

/// A heap-allocated ring for in-process use: application-side buffering,
/// tests and benches. The kernel/user ring reaches the same code through
/// [`crate::mapping::MappedRing`] instead.
pub struct OwnedRing<const N: usize> {
    inner: Box<SharedRing<N>>,
}

impl<const N: usize> OwnedRing<N> {
    /// Allocate a zeroed ring. All-zero is the valid empty state.
    pub fn new() -> Self {
        let () = SharedRing::<N>::CAPACITY_OK;
        let layout = std::alloc::Layout::new::<SharedRing<N>>();
        let ptr = unsafe { std::alloc::alloc_zeroed(layout) } as *mut SharedRing<N>;
        if ptr.is_null() {
            std::alloc::handle_alloc_error(layout);
        }
        Self {
            inner: unsafe { Box::from_raw(ptr) },
        }
    }

    /// Borrow the producer and consumer sides. The exclusive borrow enforces
    /// the single-producer/single-consumer discipline at compile time.
    pub fn split(
        &mut self,
        policy: OverflowPolicy,
    ) -> (RingProducer<'_, N>, RingConsumer<'_, N>) {
        let ring: &SharedRing<N> = &self.inner;
        unsafe { (RingProducer::new(ring, policy), RingConsumer::new(ring)) }
    }

    /// Shared view of the ring.
    pub fn shared(&self) -> &SharedRing<N> {
        &self.inner
    }
}

impl<const N: usize> Default for OwnedRing<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(counter: u32) -> IrqEvent {
        IrqEvent {
            timestamp_ns: u64::from(counter) * 1_000,
            event_counter: counter,
            aux_state: counter & 1,
        }
    }

    #[test]
    fn test_publish_then_drain_round_trip() {
        let mut ring = OwnedRing::<8>::new();
        let (mut producer, mut consumer) = ring.split(OverflowPolicy::DropNew);

        let sent = event(1);
        assert!(producer.publish(sent));

        let mut received = Vec::new();
        assert_eq!(consumer.drain(|ev| received.push(ev)), 1);
        assert_eq!(received, vec![sent]);
    }

    #[test]
    fn test_fifo_order_preserved() {
        let mut ring = OwnedRing::<16>::new();
        let (mut producer, mut consumer) = ring.split(OverflowPolicy::DropNew);

        for i in 1..=10 {
            assert!(producer.publish(event(i)));
        }

        let mut counters = Vec::new();
        consumer.drain(|ev| counters.push(ev.event_counter));
        assert_eq!(counters, (1..=10).collect::<Vec<_>>());
    }

    #[test]
    fn test_drop_new_refuses_when_full() {
        let mut ring = OwnedRing::<4>::new();
        let (mut producer, mut consumer) = ring.split(OverflowPolicy::DropNew);

        for i in 1..=4 {
            assert!(producer.publish(event(i)));
        }
        assert!(!producer.publish(event(5)));
        assert_eq!(producer.dropped(), 1);

        let mut counters = Vec::new();
        consumer.drain(|ev| counters.push(ev.event_counter));
        assert_eq!(counters, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_overwrite_oldest_evicts_when_full() {
        let mut ring = OwnedRing::<4>::new();
        let (mut producer, mut consumer) = ring.split(OverflowPolicy::OverwriteOldest);

        for i in 1..=5 {
            assert!(producer.publish(event(i)));
        }
        assert_eq!(producer.dropped(), 1);

        let mut counters = Vec::new();
        consumer.drain(|ev| counters.push(ev.event_counter));
        assert_eq!(counters, vec![2, 3, 4, 5]);
    }

    #[test]
    fn test_consumer_adopts_tail_after_eviction() {
        let mut ring = OwnedRing::<4>::new();
        let (mut producer, mut consumer) = ring.split(OverflowPolicy::OverwriteOldest);

        // First batch drained normally; the consumer's local tail is now 4.
        for i in 1..=4 {
            producer.publish(event(i));
        }
        let mut first = Vec::new();
        consumer.drain(|ev| first.push(ev.event_counter));
        assert_eq!(first, vec![1, 2, 3, 4]);

        // Six more publishes lap the idle consumer twice over capacity.
        for i in 5..=10 {
            assert!(producer.publish(event(i)));
        }
        assert_eq!(producer.dropped(), 2);

        // The drain must pick up from the advanced shared tail, never from
        // the stale local tail, so evicted slots are not replayed.
        let mut second = Vec::new();
        consumer.drain(|ev| second.push(ev.event_counter));
        assert_eq!(second, vec![7, 8, 9, 10]);
    }

    #[test]
    fn test_publish_outcome_tracks_actual_occupancy() {
        let ring = OwnedRing::<4>::new();
        let shared = ring.shared();

        unsafe {
            for i in 1..=4 {
                assert_eq!(
                    shared.publish(event(i), OverflowPolicy::OverwriteOldest),
                    PublishOutcome::Stored
                );
            }
            assert_eq!(
                shared.publish(event(5), OverflowPolicy::OverwriteOldest),
                PublishOutcome::Evicted
            );
            assert_eq!(
                shared.publish(event(6), OverflowPolicy::DropNew),
                PublishOutcome::Refused
            );

            // Space freed by a drain makes the next publish a plain store.
            let mut local_tail = shared.tail();
            shared.consume(&mut local_tail, |_| {});
            assert_eq!(
                shared.publish(event(7), OverflowPolicy::OverwriteOldest),
                PublishOutcome::Stored
            );
        }
    }

    #[test]
    fn test_drain_resumes_after_partial_consume() {
        let mut ring = OwnedRing::<8>::new();
        let (mut producer, mut consumer) = ring.split(OverflowPolicy::DropNew);

        for i in 1..=3 {
            producer.publish(event(i));
        }
        let mut first = Vec::new();
        consumer.drain(|ev| first.push(ev.event_counter));

        for i in 4..=6 {
            producer.publish(event(i));
        }
        let mut second = Vec::new();
        consumer.drain(|ev| second.push(ev.event_counter));

        assert_eq!(first, vec![1, 2, 3]);
        assert_eq!(second, vec![4, 5, 6]);
        assert_eq!(consumer.local_tail(), 6);
    }

    #[test]
    fn test_index_invariant_holds_under_wrap() {
        let mut ring = OwnedRing::<4>::new();
        let (mut producer, mut consumer) = ring.split(OverflowPolicy::DropNew);

        // Cycle the indices well past the capacity several times.
        for i in 1..=64 {
            assert!(producer.publish(event(i)));
            let head = ring_len_snapshot(&producer);
            assert!(head <= 4);
            consumer.drain(|_| {});
        }
        assert_eq!(consumer.local_tail(), 64);
    }

    fn ring_len_snapshot<const N: usize>(producer: &RingProducer<'_, N>) -> u32 {
        producer.ring.len()
    }

    #[test]
    fn test_concurrent_producer_consumer_no_loss() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicBool, Ordering};

        let ring = Arc::new(OwnedRing::<256>::new());
        let done = Arc::new(AtomicBool::new(false));
        const TOTAL: u32 = 50_000;

        let producer_ring = Arc::clone(&ring);
        let producer_done = Arc::clone(&done);
        let producer = std::thread::spawn(move || {
            let shared = producer_ring.shared();
            let mut sent = 0u32;
            while sent < TOTAL {
                let ev = event(sent + 1);
                if unsafe { shared.publish(ev, OverflowPolicy::DropNew) } == PublishOutcome::Stored
                {
                    sent += 1;
                } else {
                    std::thread::yield_now();
                }
            }
            producer_done.store(true, Ordering::Release);
        });

        let shared = ring.shared();
        let mut local_tail = shared.tail();
        let mut next_expected = 1u32;
        loop {
            unsafe {
                shared.consume(&mut local_tail, |ev| {
                    assert_eq!(ev.event_counter, next_expected);
                    next_expected += 1;
                });
            }
            if done.load(Ordering::Acquire) && shared.is_empty() {
                break;
            }
        }

        producer.join().unwrap();
        assert_eq!(next_expected, TOTAL + 1);
    }
}
