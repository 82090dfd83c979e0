//! Backing memory for ring regions.
//!
//! Allocation and mapping of the shared region belong to the channel
//! boundary, not the rings themselves; this helper exists so that boundary
//! code (and tests) can provision a correctly sized, zeroed, aligned region.
//! Anonymous `mmap` is preferred (page aligned, lazily committed) with an
//! aligned heap allocation as fallback.

use crate::error::{RingError, RingResult};
use crate::layout::{RingHeader, HEADER_SIZE};
use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;

/// Alignment applied to every region; covers the header requirement and
/// keeps the data area cache-line aligned.
pub const REGION_ALIGN: usize = 64;

enum Backing {
    Mapped(memmap2::MmapMut),
    Heap { ptr: NonNull<u8>, layout: Layout },
}

/// Owned, zeroed memory suitable for one ring (header plus data area).
///
/// The region is plain bytes; ring endpoints bind to it via
/// [`SendRing::attach`](crate::SendRing::attach) and
/// [`ReceiveRing::attach`](crate::ReceiveRing::attach) and never outlive it.
pub struct RingRegion {
    len: usize,
    backing: Backing,
}

// SAFETY: the region exclusively owns its allocation. Shared references only
// hand out raw pointers; all access discipline lives in the ring endpoints.
unsafe impl Send for RingRegion {}
unsafe impl Sync for RingRegion {}

impl RingRegion {
    /// Allocates a zeroed region of `len` bytes aligned to [`REGION_ALIGN`].
    pub fn new(len: usize) -> RingResult<Self> {
        if let Some(backing) = Self::mmap_backed(len)? {
            return Ok(Self { len, backing });
        }
        Self::heap_backed(len)
    }

    /// Allocates a region sized for a ring with `data_size` data bytes and
    /// writes the initial (all-zero) header.
    pub fn for_ring(data_size: usize) -> RingResult<Self> {
        let len = HEADER_SIZE
            .checked_add(data_size)
            .ok_or(RingError::AllocationFailed { size: usize::MAX })?;
        let mut region = Self::new(len)?;
        // SAFETY: the allocation holds at least HEADER_SIZE bytes at an
        // alignment satisfying RingHeader.
        unsafe {
            (region.as_mut_ptr() as *mut RingHeader).write(RingHeader::new());
        }
        Ok(region)
    }

    fn heap_backed(len: usize) -> RingResult<Self> {
        let layout = Layout::from_size_align(len.max(1), REGION_ALIGN)
            .map_err(|_| RingError::AllocationFailed { size: len })?;
        let ptr = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(ptr).ok_or(RingError::AllocationFailed { size: len })?;
        Ok(Self {
            len,
            backing: Backing::Heap { ptr, layout },
        })
    }

    fn mmap_backed(len: usize) -> RingResult<Option<Backing>> {
        let map = memmap2::MmapOptions::new()
            .len(len.max(1))
            .map_anon()
            .map_err(|_| RingError::AllocationFailed { size: len })?;
        if map.as_ptr() as usize % REGION_ALIGN != 0 {
            return Ok(None);
        }
        Ok(Some(Backing::Mapped(map)))
    }

    /// Total number of bytes in the region.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true when the region has zero length.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Borrow the region as a const pointer.
    pub fn as_ptr(&self) -> *const u8 {
        match &self.backing {
            Backing::Mapped(map) => map.as_ptr(),
            Backing::Heap { ptr, .. } => ptr.as_ptr(),
        }
    }

    /// Borrow the region as a mut pointer.
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        match &mut self.backing {
            Backing::Mapped(map) => map.as_mut_ptr(),
            Backing::Heap { ptr, .. } => ptr.as_ptr(),
        }
    }
}

impl Drop for RingRegion {
    fn drop(&mut self) {
        if let Backing::Heap { ptr, layout } = &self.backing {
            unsafe {
                dealloc(ptr.as_ptr(), *layout);
            }
        }
    }
}
