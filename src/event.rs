//! The wire-level event record shared between producer and consumer
//!
//! Layout is an ABI contract with the producing side: 16 bytes, naturally
//! aligned, no padding, identical on both ends of the mapping. Records are
//! plain copyable data; an all-zero record is valid, which lets the shared
//! region start zero-initialized.

/// Number of records in the shared ring. Must divide 2^32 so index wrap is
/// transparent; fixed at 256 by agreement with the producing side.
pub const RING_CAPACITY: usize = 256;

/// One interrupt event, stamped in interrupt context.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrqEvent {
    /// Monotonic timestamp taken at the interrupt, in nanoseconds.
    pub timestamp_ns: u64,
    /// Free-running count of interrupts since producer start, wrapping at
    /// 2^32. Gaps between consecutive drained records reveal producer-side
    /// drops.
    pub event_counter: u32,
    /// Auxiliary hardware state sampled at the interrupt (e.g. pin level).
    pub aux_state: u32,
}

// ABI contract with the producing side.
const _: () = assert!(size_of::<IrqEvent>() == 16);
const _: () = assert!(align_of::<IrqEvent>() == 8);
const _: () = assert!(RING_CAPACITY.is_power_of_two());
