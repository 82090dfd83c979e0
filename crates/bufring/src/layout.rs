//! Shared ring header layout.
//!
//! Each shared region starts with a [`RingHeader`] at offset zero; the
//! remaining `data_size = region_len - HEADER_SIZE` bytes form the circular
//! data area. Both parties map the same region, but each field has exactly
//! one writer:
//!
//! ```text
//! +-------------------+---------------------------------------------+
//! | RingHeader        | circular data area (data_size bytes)        |
//! +-------------------+---------------------------------------------+
//!                       Packet: [payload bytes...][8-byte trailer]
//! ```
//!
//! The trailer carries the write index the packet started at, shifted into
//! the high half of a little-endian `u64`. It is written on every packet for
//! wire compatibility and skipped unexamined by the read path.

#[cfg(feature = "loom")]
use loom::sync::atomic::{AtomicU32, Ordering};
use std::mem::size_of;
#[cfg(not(feature = "loom"))]
use std::sync::atomic::{AtomicU32, Ordering};

/// Feature bit advertising that the consumer honours `pending_send_size`.
pub const FEAT_PENDING_SEND_SIZE: u32 = 1 << 0;

/// Length of the trailer appended after every packet payload.
pub const TRAILER_LEN: usize = 8;

/// Size of the protocol header at the start of every shared region.
pub const HEADER_SIZE: usize = size_of::<RingHeader>();

/// Fixed-offset control block shared by producer and consumer.
///
/// `write_index` is producer-owned; `read_index`, `interrupt_mask` and
/// `feature_bits` are consumer-owned; `pending_send_size` is published by a
/// blocked producer and inspected by the consumer. The non-owning side only
/// ever reads a field, so plain acquire/release atomics are sufficient with
/// no shared lock.
#[repr(C, align(8))]
pub(crate) struct RingHeader {
    pub(crate) write_index: AtomicU32,
    pub(crate) read_index: AtomicU32,
    pub(crate) interrupt_mask: AtomicU32,
    pub(crate) pending_send_size: AtomicU32,
    pub(crate) feature_bits: AtomicU32,
    _reserved: u32,
}

impl RingHeader {
    pub(crate) fn new() -> Self {
        Self {
            write_index: AtomicU32::new(0),
            read_index: AtomicU32::new(0),
            interrupt_mask: AtomicU32::new(0),
            pending_send_size: AtomicU32::new(0),
            feature_bits: AtomicU32::new(0),
            _reserved: 0,
        }
    }
}

/// Encodes the trailer for a packet whose payload started at `old_windex`.
pub(crate) fn packet_trailer(old_windex: u32) -> [u8; TRAILER_LEN] {
    ((old_windex as u64) << 32).to_le_bytes()
}

/// Read-only dump of a ring's shared state.
///
/// Formatting and reporting belong to external observability layers; the
/// rings only expose the numbers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RingSnapshot {
    /// Size of the circular data area in bytes.
    pub data_size: u32,
    /// Producer-owned write index.
    pub write_index: u32,
    /// Consumer-owned read index.
    pub read_index: u32,
    /// Bytes currently buffered (payloads plus trailers).
    pub occupied: u32,
    /// Bytes a producer could still write.
    pub free: u32,
    /// Whether the consumer has masked producer-side signals.
    pub interrupt_masked: bool,
    /// Free-byte watermark published by a blocked producer, zero if none.
    pub pending_send_size: u32,
    /// Whether the consumer advertised flow-control support.
    pub flow_control: bool,
}

pub(crate) fn load_bool(flag: &AtomicU32) -> bool {
    flag.load(Ordering::Acquire) != 0
}

pub(crate) fn store_bool(flag: &AtomicU32, value: bool) {
    flag.store(value as u32, Ordering::Release);
}
