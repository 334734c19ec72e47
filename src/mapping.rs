//! Device handle and shared-region mapping
//!
//! The privileged producer owns the physical backing memory; this side only
//! maps it. A session start must validate that the mapped byte length
//! exactly equals the page-aligned size derived from the agreed record
//! layout and capacity. Any mismatch rejects the session instead of
//! proceeding with misaligned access.

use std::fs::{File, OpenOptions};
use std::os::fd::{AsFd, BorrowedFd};
use std::path::Path;
use std::ptr::NonNull;

use memmap2::{MmapMut, MmapOptions};

use crate::error::{IrqError, IrqResult};
use crate::ring::SharedRing;

/// Round `len` up to the next page boundary.
pub fn page_aligned_len(len: usize) -> usize {
    let page = page_size();
    (len + page - 1) & !(page - 1)
}

/// System page size in bytes.
pub fn page_size() -> usize {
    // SAFETY: sysconf has no memory-safety preconditions.
    let ret = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if ret <= 0 { 4096 } else { ret as usize }
}

/// A validated mapping of a `SharedRing<N>`, either over a device's region
/// or over an anonymous in-process one (loopback and tests).
///
/// The mapping's lifetime is strictly bound to this value; the ring pointer
/// it hands out must not outlive it, which the borrow on [`Self::shared`]
/// enforces.
pub struct MappedRing<const N: usize> {
    ring: NonNull<SharedRing<N>>,
    _mmap: MmapMut,
}

// The contained pointer targets the mapping owned by this same value, and
// all shared access goes through the ring's atomic protocol.
unsafe impl<const N: usize> Send for MappedRing<N> {}
unsafe impl<const N: usize> Sync for MappedRing<N> {}

impl<const N: usize> MappedRing<N> {
    /// Expected page-aligned byte length of the mapped region.
    pub fn expected_len() -> usize {
        page_aligned_len(SharedRing::<N>::BYTES)
    }

    /// Map an anonymous zero-initialized region of the agreed size. Used by
    /// the in-process loopback channel; the zeroed header is the valid empty
    /// ring state.
    pub fn anonymous() -> IrqResult<Self> {
        let () = SharedRing::<N>::CAPACITY_OK;
        let mmap =
            MmapMut::map_anon(Self::expected_len()).map_err(|source| IrqError::Mapping { source })?;
        Self::from_mmap(mmap)
    }

    fn map_device(file: &File) -> IrqResult<Self> {
        let () = SharedRing::<N>::CAPACITY_OK;
        let mmap = unsafe { MmapOptions::new().len(Self::expected_len()).map_mut(file) }
            .map_err(|source| IrqError::Mapping { source })?;
        Self::from_mmap(mmap)
    }

    fn from_mmap(mut mmap: MmapMut) -> IrqResult<Self> {
        let expected = Self::expected_len();
        if mmap.len() != expected {
            return Err(IrqError::MappingSize {
                expected,
                actual: mmap.len(),
            });
        }

        let ring = NonNull::new(mmap.as_mut_ptr() as *mut SharedRing<N>)
            .ok_or_else(|| IrqError::Mapping {
                source: std::io::Error::other("null mapping"),
            })?;

        Ok(Self { ring, _mmap: mmap })
    }

    /// Shared view of the mapped ring.
    pub fn shared(&self) -> &SharedRing<N> {
        // SAFETY: the pointer targets this value's own live mapping, whose
        // length was validated against the ring layout at construction.
        unsafe { self.ring.as_ref() }
    }
}

/// A producer device's handle together with its mapped ring. The descriptor
/// always exists here, so the listener's readiness wait needs no fallback.
pub struct DeviceRing<const N: usize> {
    file: File,
    region: MappedRing<N>,
}

impl<const N: usize> DeviceRing<N> {
    /// Open the producer's device handle and map the shared ring.
    ///
    /// Fails with [`IrqError::Open`] when the handle cannot be acquired,
    /// [`IrqError::Mapping`] when the map request is refused (including a
    /// capacity disagreement the producing side rejects), and
    /// [`IrqError::MappingSize`] when the mapped length differs from the
    /// agreed layout. On any failure the handle is closed and nothing leaks.
    pub fn open(path: impl AsRef<Path>) -> IrqResult<Self> {
        let path = path.as_ref();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| IrqError::Open {
                path: path.display().to_string(),
                source,
            })?;

        let region = MappedRing::map_device(&file)?;
        Ok(Self { file, region })
    }

    /// The device descriptor the listener waits for readiness on.
    pub fn fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }

    /// Shared view of the mapped ring.
    pub fn shared(&self) -> &SharedRing<N> {
        self.region.shared()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::IrqEvent;
    use crate::ring::{OverflowPolicy, RingConsumer, RingProducer};

    #[test]
    fn test_expected_len_is_page_aligned() {
        let len = MappedRing::<256>::expected_len();
        assert_eq!(len % page_size(), 0);
        assert!(len >= SharedRing::<256>::BYTES);
    }

    #[test]
    fn test_anonymous_region_starts_empty() {
        let region = MappedRing::<256>::anonymous().unwrap();
        assert!(region.shared().is_empty());
        assert_eq!(region.shared().head(), 0);
        assert_eq!(region.shared().tail(), 0);
    }

    #[test]
    fn test_round_trip_across_mapping() {
        let region = MappedRing::<256>::anonymous().unwrap();
        let shared = region.shared();

        let sent = IrqEvent {
            timestamp_ns: 123_456_789,
            event_counter: 7,
            aux_state: 1,
        };

        let mut producer = unsafe { RingProducer::new(shared, OverflowPolicy::DropNew) };
        let mut consumer = unsafe { RingConsumer::new(shared) };
        assert!(producer.publish(sent));

        let mut received = None;
        consumer.drain(|ev| received = Some(ev));
        assert_eq!(received, Some(sent));
    }

    #[test]
    fn test_open_missing_device_fails_cleanly() {
        let err = DeviceRing::<256>::open("/dev/definitely_not_a_real_irq_device")
            .err()
            .expect("open must fail");
        assert!(matches!(err, IrqError::Open { .. }));
    }
}
