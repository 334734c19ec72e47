//! Application decoupling queue: bounded lock-free SPSC
//!
//! A second, purely user-space queue that isolates the time-critical
//! listener thread from slower downstream work. The listener's handler
//! pushes (single producer, non-blocking, drop-on-full) and one application
//! thread pops (single consumer, non-blocking). Dropping on a full queue is
//! a deliberate backpressure choice favoring bounded producer latency over
//! completeness; the caller tracks drop counts, typically via
//! [`crate::stats::PulseStats::note_queue_drop`].
//!
//! Same head/tail acquire/release discipline as the shared ring, entirely in
//! one address space.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;

struct Shared<T> {
    head: CachePadded<AtomicUsize>,
    tail: CachePadded<AtomicUsize>,
    mask: usize,
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
}

// Slot accesses are synchronized through the index protocol; each side is a
// single owner of its handle.
unsafe impl<T: Send> Send for Shared<T> {}
unsafe impl<T: Send> Sync for Shared<T> {}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        let head = *self.head.get_mut();
        let mut tail = *self.tail.get_mut();
        while tail != head {
            let slot = tail & self.mask;
            unsafe { self.slots[slot].get_mut().assume_init_drop() };
            tail = tail.wrapping_add(1);
        }
    }
}

/// Create a bounded SPSC queue with room for at least `capacity` items.
/// The capacity is rounded up to the next power of two.
pub fn channel<T>(capacity: usize) -> (SpscSender<T>, SpscReceiver<T>) {
    let capacity = capacity.max(1).next_power_of_two();
    let slots = (0..capacity)
        .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
        .collect::<Vec<_>>()
        .into_boxed_slice();

    let shared = Arc::new(Shared {
        head: CachePadded::new(AtomicUsize::new(0)),
        tail: CachePadded::new(AtomicUsize::new(0)),
        mask: capacity - 1,
        slots,
    });

    (
        SpscSender {
            shared: Arc::clone(&shared),
        },
        SpscReceiver { shared },
    )
}

/// Producer half. Not cloneable: exactly one producer exists by ownership.
pub struct SpscSender<T> {
    shared: Arc<Shared<T>>,
}

impl<T> SpscSender<T> {
    /// Push one item without blocking. On a full queue the item is handed
    /// back and the push counts as a drop for the caller to record.
    pub fn push(&mut self, value: T) -> Result<(), T> {
        let shared = &self.shared;
        let head = shared.head.load(Ordering::Relaxed);
        let tail = shared.tail.load(Ordering::Acquire);

        if head.wrapping_sub(tail) > shared.mask {
            return Err(value);
        }

        let slot = head & shared.mask;
        unsafe { (*shared.slots[slot].get()).write(value) };
        shared.head.store(head.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Queue capacity in items.
    pub fn capacity(&self) -> usize {
        self.shared.mask + 1
    }

    /// Number of items currently queued.
    pub fn len(&self) -> usize {
        let head = self.shared.head.load(Ordering::Relaxed);
        let tail = self.shared.tail.load(Ordering::Acquire);
        head.wrapping_sub(tail)
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Consumer half. Not cloneable: exactly one consumer exists by ownership.
pub struct SpscReceiver<T> {
    shared: Arc<Shared<T>>,
}

impl<T> SpscReceiver<T> {
    /// Pop the oldest item without blocking, or `None` when empty. The
    /// consumer is not latency-critical; callers should back off briefly on
    /// empty rather than busy-spin.
    pub fn pop(&mut self) -> Option<T> {
        let shared = &self.shared;
        let tail = shared.tail.load(Ordering::Relaxed);
        let head = shared.head.load(Ordering::Acquire);

        if tail == head {
            return None;
        }

        let slot = tail & shared.mask;
        let value = unsafe { (*shared.slots[slot].get()).assume_init_read() };
        shared.tail.store(tail.wrapping_add(1), Ordering::Release);
        Some(value)
    }

    /// Queue capacity in items.
    pub fn capacity(&self) -> usize {
        self.shared.mask + 1
    }

    /// Number of items currently queued.
    pub fn len(&self) -> usize {
        let tail = self.shared.tail.load(Ordering::Relaxed);
        let head = self.shared.head.load(Ordering::Acquire);
        head.wrapping_sub(tail)
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
