//! Raw circular buffer primitive shared by both ring directions.
//!
//! `RingBuffer` does free-space accounting and wraparound-safe copying over a
//! caller-provided region, nothing else: no locking, no blocking, no policy.
//! [`SendRing`](crate::SendRing) and [`ReceiveRing`](crate::ReceiveRing) use
//! it exclusively while holding their local lock.
//!
//! Cross-domain visibility rests on two rules and nothing else: both indices
//! are atomics read with acquire and written with release ordering, and a
//! full fence sits between "payload bytes written" and "index published" so
//! a peer that observes the new index also observes the bytes it covers.

use crate::error::{ProtocolViolation, RingError, RingResult};
use crate::layout::{self, RingHeader, RingSnapshot, FEAT_PENDING_SEND_SIZE, HEADER_SIZE};
#[cfg(feature = "loom")]
use loom::sync::atomic::{fence, Ordering};
use std::ptr::{self, NonNull};
#[cfg(not(feature = "loom"))]
use std::sync::atomic::{fence, Ordering};

/// Smallest usable data area: one trailer plus some payload headroom.
pub(crate) const MIN_DATA_SIZE: usize = 16;

#[derive(Debug)]
pub(crate) struct RingBuffer {
    header: NonNull<RingHeader>,
    data: NonNull<u8>,
    data_size: u32,
}

// SAFETY: the buffer only touches the region through atomics and raw copies
// whose exclusivity is guaranteed by the ring protocol (each index has one
// writer; a producer owns the free span, a consumer the occupied span).
unsafe impl Send for RingBuffer {}
unsafe impl Sync for RingBuffer {}

impl RingBuffer {
    /// Binds to a previously allocated region of `len` bytes at `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads and writes of `len` bytes for the whole
    /// lifetime of the returned buffer, and the header at offset zero must be
    /// initialised (all-zero bytes are a valid initial header).
    pub(crate) unsafe fn attach(ptr: *mut u8, len: usize) -> RingResult<Self> {
        if ptr as usize % std::mem::align_of::<RingHeader>() != 0 {
            return Err(RingError::RegionMisaligned {
                align: std::mem::align_of::<RingHeader>(),
            });
        }
        if len < HEADER_SIZE + MIN_DATA_SIZE {
            return Err(RingError::RegionTooSmall {
                len,
                min: HEADER_SIZE + MIN_DATA_SIZE,
            });
        }
        let data_size = len - HEADER_SIZE;
        if data_size > u32::MAX as usize {
            return Err(RingError::RegionTooLarge {
                len,
                max: HEADER_SIZE + u32::MAX as usize,
            });
        }
        Ok(Self {
            header: NonNull::new_unchecked(ptr as *mut RingHeader),
            data: NonNull::new_unchecked(ptr.add(HEADER_SIZE)),
            data_size: data_size as u32,
        })
    }

    pub(crate) fn header(&self) -> &RingHeader {
        // SAFETY: attach validated the region; the header outlives self.
        unsafe { self.header.as_ref() }
    }

    pub(crate) fn data_size(&self) -> u32 {
        self.data_size
    }

    /// Rejects a peer-published index before it is used in any offset or
    /// length computation.
    pub(crate) fn checked_index(&self, index: u32) -> Result<u32, ProtocolViolation> {
        if index >= self.data_size {
            return Err(ProtocolViolation::IndexOutOfRange {
                index,
                data_size: self.data_size,
            });
        }
        Ok(index)
    }

    pub(crate) fn load_write_index(&self) -> RingResult<u32> {
        let index = self.header().write_index.load(Ordering::Acquire);
        Ok(self.checked_index(index)?)
    }

    pub(crate) fn load_read_index(&self) -> RingResult<u32> {
        let index = self.header().read_index.load(Ordering::Acquire);
        Ok(self.checked_index(index)?)
    }

    /// Publishes a new write index. The fence orders every payload byte
    /// before the store so the consumer can never observe the index without
    /// the bytes.
    pub(crate) fn publish_write_index(&self, index: u32) {
        fence(Ordering::SeqCst);
        self.header().write_index.store(index, Ordering::Release);
    }

    /// Publishes a new read index; same fence rationale as the write side,
    /// protecting the producer from reusing bytes that are still being read.
    pub(crate) fn publish_read_index(&self, index: u32) {
        fence(Ordering::SeqCst);
        self.header().read_index.store(index, Ordering::Release);
    }

    /// Forward distance from `read_index` to `write_index` modulo the data
    /// size: the number of buffered bytes.
    pub(crate) fn occupied(&self) -> RingResult<u32> {
        let windex = self.load_write_index()?;
        let rindex = self.load_read_index()?;
        Ok(if windex >= rindex {
            windex - rindex
        } else {
            self.data_size - rindex + windex
        })
    }

    /// Free space: `data_size` minus the occupied bytes. `read_index ==
    /// write_index` means empty, so a write is only legal while it leaves at
    /// least one free byte behind.
    pub(crate) fn available_for_write(&self) -> RingResult<u32> {
        Ok(self.data_size - self.occupied()?)
    }

    pub(crate) fn wrap_add(&self, index: u32, delta: usize) -> u32 {
        ((index as usize + delta) % self.data_size as usize) as u32
    }

    /// Copies `src` into the data area starting at `index`, splitting into
    /// two copies when the range crosses the end. Returns the new index.
    pub(crate) fn copy_to(&self, index: u32, src: &[u8]) -> u32 {
        debug_assert!(index < self.data_size);
        debug_assert!(src.len() < self.data_size as usize);
        let at = index as usize;
        let first = src.len().min(self.data_size as usize - at);
        // SAFETY: the producer owns [index, index + len) of the free span
        // while its local lock is held; the ranges stay inside the data area.
        unsafe {
            ptr::copy_nonoverlapping(src.as_ptr(), self.data.as_ptr().add(at), first);
            if first < src.len() {
                ptr::copy_nonoverlapping(
                    src.as_ptr().add(first),
                    self.data.as_ptr(),
                    src.len() - first,
                );
            }
        }
        self.wrap_add(index, src.len())
    }

    /// Copies `dst.len()` bytes out of the data area starting at `index`.
    /// Returns the new index.
    pub(crate) fn copy_from(&self, index: u32, dst: &mut [u8]) -> u32 {
        debug_assert!(index < self.data_size);
        debug_assert!(dst.len() < self.data_size as usize);
        let at = index as usize;
        let first = dst.len().min(self.data_size as usize - at);
        // SAFETY: the consumer owns the occupied span while its local lock
        // is held; the ranges stay inside the data area.
        unsafe {
            ptr::copy_nonoverlapping(self.data.as_ptr().add(at), dst.as_mut_ptr(), first);
            if first < dst.len() {
                ptr::copy_nonoverlapping(
                    self.data.as_ptr(),
                    dst.as_mut_ptr().add(first),
                    dst.len() - first,
                );
            }
        }
        self.wrap_add(index, dst.len())
    }

    /// Hands the physical segments of `[index, index + len)` to `fill` in
    /// order: the pre-wrap slice, then the post-wrap slice if the range
    /// crosses the end. An error aborts before the second segment; the
    /// caller must not have advanced any index yet.
    pub(crate) fn with_segments_mut<E>(
        &self,
        index: u32,
        len: usize,
        mut fill: impl FnMut(&mut [u8]) -> Result<(), E>,
    ) -> Result<u32, E> {
        debug_assert!(index < self.data_size);
        debug_assert!(len < self.data_size as usize);
        let at = index as usize;
        let first = len.min(self.data_size as usize - at);
        // SAFETY: same exclusivity argument as `copy_to`; the slices cover
        // free bytes no other party may touch until the index is published.
        unsafe {
            fill(std::slice::from_raw_parts_mut(
                self.data.as_ptr().add(at),
                first,
            ))?;
            if first < len {
                fill(std::slice::from_raw_parts_mut(
                    self.data.as_ptr(),
                    len - first,
                ))?;
            }
        }
        Ok(self.wrap_add(index, len))
    }

    pub(crate) fn interrupt_masked(&self) -> bool {
        layout::load_bool(&self.header().interrupt_mask)
    }

    pub(crate) fn set_interrupt_mask(&self, masked: bool) {
        layout::store_bool(&self.header().interrupt_mask, masked);
    }

    pub(crate) fn pending_send_size(&self) -> u32 {
        self.header().pending_send_size.load(Ordering::Acquire)
    }

    pub(crate) fn set_pending_send_size(&self, bytes: u32) {
        self.header()
            .pending_send_size
            .store(bytes, Ordering::Release);
    }

    pub(crate) fn flow_control_enabled(&self) -> bool {
        self.header().feature_bits.load(Ordering::Acquire) & FEAT_PENDING_SEND_SIZE != 0
    }

    pub(crate) fn set_flow_control(&self, enabled: bool) {
        let bits = if enabled { FEAT_PENDING_SEND_SIZE } else { 0 };
        self.header().feature_bits.store(bits, Ordering::Release);
    }

    pub(crate) fn snapshot(&self) -> RingResult<RingSnapshot> {
        let write_index = self.load_write_index()?;
        let read_index = self.load_read_index()?;
        let occupied = if write_index >= read_index {
            write_index - read_index
        } else {
            self.data_size - read_index + write_index
        };
        Ok(RingSnapshot {
            data_size: self.data_size,
            write_index,
            read_index,
            occupied,
            free: self.data_size - occupied,
            interrupt_masked: self.interrupt_masked(),
            pending_send_size: self.pending_send_size(),
            flow_control: self.flow_control_enabled(),
        })
    }
}
