//! Consumer side of a ring: peek/advance/read and the RX signal decision.

use crate::error::{ProtocolViolation, RingError, RingResult};
use crate::layout::{RingSnapshot, TRAILER_LEN};
use crate::ring::RingBuffer;
#[cfg(feature = "loom")]
use loom::sync::atomic::{AtomicBool, Ordering};
use parking_lot::Mutex;
#[cfg(not(feature = "loom"))]
use std::sync::atomic::{AtomicBool, Ordering};

/// Consumer endpoint of a shared ring.
///
/// `peek` inspects buffered bytes without consuming them; `advance` retires
/// a packet (payload plus trailer) in one atomic index update; `read`
/// composes the two. Each consuming operation reports whether the peer
/// producer, possibly parked on a published `pending_send_size` watermark,
/// must now be signalled. As on the send side, the local mutex serialises
/// local threads only, and `_mut` variants bypass it via exclusive borrow.
pub struct ReceiveRing {
    ring: RingBuffer,
    lock: Mutex<()>,
    closed: AtomicBool,
}

impl ReceiveRing {
    /// Binds a consumer endpoint to a shared region, zeroes the fields this
    /// side owns (`read_index`, `interrupt_mask`) and advertises
    /// flow-control support through the feature bits.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads and writes of `len` bytes for the life
    /// of the ring, the header at offset zero must be initialised (all-zero
    /// bytes qualify), and there must be no other live consumer endpoint
    /// for this region.
    pub unsafe fn attach(ptr: *mut u8, len: usize, flow_control: bool) -> RingResult<Self> {
        let ring = RingBuffer::attach(ptr, len)?;
        ring.publish_read_index(0);
        ring.set_interrupt_mask(false);
        ring.set_flow_control(flow_control);
        Ok(Self {
            ring,
            lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        })
    }

    /// Size of the circular data area in bytes.
    pub fn data_size(&self) -> u32 {
        self.ring.data_size()
    }

    /// Copies `dst.len()` bytes from the current read position without
    /// consuming anything. Repeated peeks return the same bytes.
    pub fn peek(&self, dst: &mut [u8]) -> RingResult<()> {
        let _guard = self.lock.lock();
        self.peek_inner(0, dst)
    }

    /// Like [`peek`](Self::peek), starting `skip` bytes past the read
    /// position; used to look past an already-examined header while the
    /// index still sits before it.
    pub fn peek_at(&self, skip: usize, dst: &mut [u8]) -> RingResult<()> {
        let _guard = self.lock.lock();
        self.peek_inner(skip, dst)
    }

    /// Retires a packet whose payload was `len` bytes: advances the read
    /// index past `len + TRAILER_LEN` bytes in one release store. Returns
    /// whether the peer producer must now be signalled.
    pub fn advance(&self, len: usize) -> RingResult<bool> {
        let _guard = self.lock.lock();
        self.advance_inner(len)
    }

    /// Lock-free variant of [`advance`](Self::advance).
    pub fn advance_mut(&mut self, len: usize) -> RingResult<bool> {
        self.advance_inner(len)
    }

    /// Copies `dst.len()` bytes found `skip` bytes past the read position,
    /// then advances past `skip + dst.len() + TRAILER_LEN` in one atomic
    /// index update. Returns the signal decision.
    pub fn read(&self, skip: usize, dst: &mut [u8]) -> RingResult<bool> {
        let _guard = self.lock.lock();
        self.peek_inner(skip, dst)?;
        self.advance_inner(skip + dst.len())
    }

    /// Lock-free variant of [`read`](Self::read).
    pub fn read_mut(&mut self, skip: usize, dst: &mut [u8]) -> RingResult<bool> {
        self.peek_inner(skip, dst)?;
        self.advance_inner(skip + dst.len())
    }

    fn peek_inner(&self, skip: usize, dst: &mut [u8]) -> RingResult<()> {
        self.ensure_open()?;
        let need = skip + dst.len() + TRAILER_LEN;
        let occupied = self.ring.occupied()? as usize;
        if occupied < need {
            return Err(RingError::WouldBlock {
                need,
                avail: occupied,
            });
        }
        let rindex = self.ring.load_read_index()?;
        self.ring.copy_from(self.ring.wrap_add(rindex, skip), dst);
        Ok(())
    }

    fn advance_inner(&self, len: usize) -> RingResult<bool> {
        self.ensure_open()?;
        let freed = len + TRAILER_LEN;
        let occupied = self.ring.occupied()? as usize;
        if occupied < freed {
            return Err(RingError::WouldBlock {
                need: freed,
                avail: occupied,
            });
        }
        let rindex = self.ring.load_read_index()?;
        self.ring
            .publish_read_index(self.ring.wrap_add(rindex, freed));
        self.need_signal(freed as u32)
    }

    /// Threshold-edge heuristic for waking a blocked producer, evaluated
    /// after the read index has advanced past the freed bytes.
    fn need_signal(&self, freed: u32) -> RingResult<bool> {
        // Producers that never advertised a watermark do not use this
        // protocol at all.
        if !self.ring.flow_control_enabled() {
            return Ok(false);
        }
        let pending = self.ring.pending_send_size();
        if pending == 0 {
            return Ok(false);
        }
        let write_avail = self.ring.available_for_write()?;
        // Already past the watermark before this read: no new edge. The
        // peer may have refilled the freed bytes between the index publish
        // and this load, so the subtraction must saturate; the shortfall
        // check below then reports "no signal" for that state.
        if write_avail.saturating_sub(freed) > pending {
            return Ok(false);
        }
        // Still not enough space even counting the bytes just freed.
        if write_avail <= pending {
            return Ok(false);
        }
        Ok(true)
    }

    /// Free-byte watermark most recently published by the peer producer.
    pub fn pending_send_size(&self) -> u32 {
        self.ring.pending_send_size()
    }

    /// Masks or unmasks producer-side signals. While masked, enqueues on
    /// the peer never request a signal; the consumer is expected to poll.
    pub fn set_interrupt_mask(&self, masked: bool) {
        self.ring.set_interrupt_mask(masked);
    }

    /// Whether producer-side signals are currently masked.
    pub fn interrupt_masked(&self) -> bool {
        self.ring.interrupt_masked()
    }

    /// Read-only dump of the shared ring state.
    pub fn snapshot(&self) -> RingResult<RingSnapshot> {
        self.ring.snapshot()
    }

    /// Marks the endpoint closed; every subsequent operation fails fast with
    /// [`ProtocolViolation::Closed`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> RingResult<()> {
        if self.is_closed() {
            return Err(ProtocolViolation::Closed.into());
        }
        Ok(())
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;
    use crate::test_util::ring_pair;

    #[test]
    fn round_trip_restores_the_payload() {
        let pair = ring_pair(256, false);
        let payload: Vec<u8> = (0u8..100).collect();
        pair.tx.enqueue(&[&payload]).unwrap();

        let mut out = vec![0u8; payload.len()];
        pair.rx.peek(&mut out).unwrap();
        assert_eq!(out, payload);

        pair.rx.advance(payload.len()).unwrap();
        let snap = pair.rx.snapshot().unwrap();
        assert_eq!(snap.occupied, 0);
        assert_eq!(snap.free, snap.data_size);
    }

    #[test]
    fn peek_is_non_destructive() {
        let pair = ring_pair(64, false);
        pair.tx.enqueue(&[&[0x42; 20]]).unwrap();

        let mut out = [0u8; 20];
        for _ in 0..3 {
            pair.rx.peek(&mut out).unwrap();
            assert_eq!(out, [0x42; 20]);
            out.fill(0);
        }
        assert_eq!(pair.rx.snapshot().unwrap().read_index, 0);
    }

    #[test]
    fn peek_at_skips_examined_bytes() {
        let pair = ring_pair(128, false);
        pair.tx.enqueue(&[b"HDR!", b"payload"]).unwrap();

        let mut header = [0u8; 4];
        pair.rx.peek(&mut header).unwrap();
        assert_eq!(&header, b"HDR!");

        let mut body = [0u8; 7];
        pair.rx.peek_at(header.len(), &mut body).unwrap();
        assert_eq!(&body, b"payload");

        // One atomic retirement of header + payload + trailer.
        pair.rx.read(header.len(), &mut body).unwrap();
        assert_eq!(&body, b"payload");
        assert_eq!(pair.rx.snapshot().unwrap().occupied, 0);
    }

    #[test]
    fn short_ring_would_block() {
        let pair = ring_pair(64, false);
        pair.tx.enqueue(&[&[1u8; 10]]).unwrap();

        let mut out = [0u8; 11];
        let err = pair.rx.peek(&mut out).unwrap_err();
        assert!(matches!(
            err,
            RingError::WouldBlock {
                need: 19,
                avail: 18
            }
        ));
        // The buffered packet is still fully readable.
        let mut ok = [0u8; 10];
        pair.rx.read(0, &mut ok).unwrap();
        assert_eq!(ok, [1u8; 10]);
    }

    /// Threshold edge: with four 24-byte payloads buffered (32 bytes each
    /// with trailer) in a 256-byte ring and a 160-byte watermark, only the
    /// advance that lifts free space from 160 to 192 crosses the edge.
    #[test]
    fn advance_signals_exactly_once_at_the_watermark() {
        let pair = ring_pair(256, true);
        for _ in 0..4 {
            pair.tx.enqueue(&[&[7u8; 24]]).unwrap();
        }
        assert_eq!(pair.tx.snapshot().unwrap().free, 128);
        assert!(pair.tx.set_pending_send_size(160));

        let signals: Vec<bool> = (0..4).map(|_| pair.rx.advance(24).unwrap()).collect();
        assert_eq!(signals, vec![false, true, false, false]);
    }

    #[test]
    fn no_signal_without_watermark_or_feature() {
        // Feature advertised but watermark cleared.
        let pair = ring_pair(128, true);
        pair.tx.enqueue(&[&[0u8; 100]]).unwrap();
        assert!(!pair.rx.advance(100).unwrap());

        // Watermark cannot even be published without the feature.
        let plain = ring_pair(128, false);
        plain.tx.enqueue(&[&[0u8; 100]]).unwrap();
        assert!(!plain.tx.set_pending_send_size(64));
        assert!(!plain.rx.advance(100).unwrap());
    }

    #[test]
    fn closed_ring_fails_fast() {
        let pair = ring_pair(64, false);
        pair.tx.enqueue(&[b"left behind"]).unwrap();
        pair.rx.close();

        let mut out = [0u8; 11];
        assert!(matches!(
            pair.rx.peek(&mut out),
            Err(RingError::Protocol(ProtocolViolation::Closed))
        ));
        assert!(matches!(
            pair.rx.advance(11),
            Err(RingError::Protocol(ProtocolViolation::Closed))
        ));
    }
}
