//! Producer side of a ring: packet enqueue and the TX signal decision.

use crate::error::{FragmentError, ProtocolViolation, RingError, RingResult};
use crate::layout::{packet_trailer, RingSnapshot, TRAILER_LEN};
use crate::ring::RingBuffer;
#[cfg(feature = "loom")]
use loom::sync::atomic::{AtomicBool, Ordering};
use parking_lot::Mutex;
#[cfg(not(feature = "loom"))]
use std::sync::atomic::{AtomicBool, Ordering};

/// Producer endpoint of a shared ring.
///
/// Enqueue operations append one packet (fragments plus the 8-byte trailer)
/// atomically: either the write index advances past the whole packet exactly
/// once, or the ring is untouched. The boolean they return is the signal
/// decision; delivering the actual cross-domain notification is the caller's
/// job.
///
/// A `parking_lot` mutex serialises local producers; it protects nothing
/// across the domain boundary, where the atomic index discipline stands
/// alone. Callers holding `&mut SendRing` can use the `_mut` variants, which
/// rely on exclusive borrow instead of the lock; pick one form per ring and
/// stay with it.
pub struct SendRing {
    ring: RingBuffer,
    lock: Mutex<()>,
    closed: AtomicBool,
}

impl SendRing {
    /// Binds a producer endpoint to a shared region and zeroes the fields
    /// this side owns (`write_index`, `pending_send_size`).
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads and writes of `len` bytes for the life
    /// of the ring, the header at offset zero must be initialised (all-zero
    /// bytes qualify), and there must be no other live producer endpoint for
    /// this region.
    pub unsafe fn attach(ptr: *mut u8, len: usize) -> RingResult<Self> {
        let ring = RingBuffer::attach(ptr, len)?;
        ring.publish_write_index(0);
        ring.set_pending_send_size(0);
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

    /// Appends one packet made of `fragments`, in order, followed by the
    /// trailer. Returns whether the peer consumer must now be signalled.
    ///
    /// Fails with [`RingError::WouldBlock`] when the packet does not leave
    /// at least one free byte behind; nothing is written in that case.
    pub fn enqueue(&self, fragments: &[&[u8]]) -> RingResult<bool> {
        let _guard = self.lock.lock();
        self.enqueue_inner(fragments)
    }

    /// Lock-free variant of [`enqueue`](Self::enqueue) for callers holding
    /// the ring exclusively.
    pub fn enqueue_mut(&mut self, fragments: &[&[u8]]) -> RingResult<bool> {
        self.enqueue_inner(fragments)
    }

    /// Appends one packet of `len` payload bytes produced by `fill`, which
    /// is invoked once per physical segment (pre-wrap, then post-wrap when
    /// the packet crosses the end of the data area).
    ///
    /// A callback failure aborts the enqueue with no visible effect: the
    /// write index never advanced, so any bytes the callback already wrote
    /// are garbage the next successful write overwrites.
    pub fn enqueue_with<F>(&self, len: usize, fill: F) -> RingResult<bool>
    where
        F: FnMut(&mut [u8]) -> Result<(), FragmentError>,
    {
        let _guard = self.lock.lock();
        self.enqueue_with_inner(len, fill)
    }

    /// Lock-free variant of [`enqueue_with`](Self::enqueue_with).
    pub fn enqueue_with_mut<F>(&mut self, len: usize, fill: F) -> RingResult<bool>
    where
        F: FnMut(&mut [u8]) -> Result<(), FragmentError>,
    {
        self.enqueue_with_inner(len, fill)
    }

    fn enqueue_inner(&self, fragments: &[&[u8]]) -> RingResult<bool> {
        let payload: usize = fragments.iter().map(|f| f.len()).sum();
        let old_windex = self.reserve(payload)?;
        let mut cursor = old_windex;
        for fragment in fragments {
            cursor = self.ring.copy_to(cursor, fragment);
        }
        self.commit(old_windex, cursor)
    }

    fn enqueue_with_inner<F>(&self, len: usize, fill: F) -> RingResult<bool>
    where
        F: FnMut(&mut [u8]) -> Result<(), FragmentError>,
    {
        let old_windex = self.reserve(len)?;
        let cursor = self
            .ring
            .with_segments_mut(old_windex, len, fill)
            .map_err(RingError::FragmentCallback)?;
        self.commit(old_windex, cursor)
    }

    /// Validates space for `payload + TRAILER_LEN` bytes and returns the
    /// current write index. Equality is rejected too: an exact fit would
    /// make `write_index` catch `read_index` and the ring look empty.
    fn reserve(&self, payload: usize) -> RingResult<u32> {
        self.ensure_open()?;
        let total = payload + TRAILER_LEN;
        let avail = self.ring.available_for_write()? as usize;
        if avail <= total {
            return Err(RingError::WouldBlock { need: total, avail });
        }
        self.ring.load_write_index()
    }

    /// Writes the trailer, snapshots the read index, publishes the new write
    /// index, and evaluates the edge trigger.
    fn commit(&self, old_windex: u32, cursor: u32) -> RingResult<bool> {
        let cursor = self.ring.copy_to(cursor, &packet_trailer(old_windex));
        // Snapshot before publishing: if the consumer advances read_index
        // past old_windex concurrently, it drained the packet we just made
        // visible and needs no wakeup; if it reads the stale index, it was
        // awake and draining anyway.
        let rindex = self.ring.load_read_index()?;
        self.ring.publish_write_index(cursor);
        // Edge trigger: only an empty->nonempty transition can have left the
        // consumer idle; anything else and it is still draining.
        Ok(!self.ring.interrupt_masked() && old_windex == rindex)
    }

    /// Publishes the free-byte watermark this producer is waiting for, so
    /// the peer consumer's threshold heuristic can wake it. Returns false
    /// without writing when the consumer never advertised flow-control
    /// support. Pass zero to clear the watermark.
    pub fn set_pending_send_size(&self, bytes: u32) -> bool {
        if !self.ring.flow_control_enabled() {
            return false;
        }
        self.ring.set_pending_send_size(bytes);
        true
    }

    /// Whether the peer consumer advertised the pending-send-size protocol.
    pub fn flow_control_enabled(&self) -> bool {
        self.ring.flow_control_enabled()
    }

    /// Whether the peer consumer currently masks producer signals.
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
    fn signals_only_on_the_empty_edge() {
        let pair = ring_pair(256, false);

        assert!(pair.tx.enqueue(&[b"first"]).unwrap());
        // Ring already non-empty: the consumer is assumed awake.
        assert!(!pair.tx.enqueue(&[b"second"]).unwrap());

        pair.rx.advance(5).unwrap();
        pair.rx.advance(6).unwrap();
        assert_eq!(pair.rx.snapshot().unwrap().occupied, 0);

        // Empty again, so the next enqueue is a fresh edge.
        assert!(pair.tx.enqueue(&[b"third"]).unwrap());
    }

    #[test]
    fn masked_consumer_suppresses_the_signal() {
        let pair = ring_pair(256, false);
        pair.rx.set_interrupt_mask(true);
        assert!(!pair.tx.enqueue(&[b"quiet"]).unwrap());
        pair.rx.set_interrupt_mask(false);
    }

    #[test]
    fn fragments_are_concatenated_in_order() {
        let pair = ring_pair(128, false);
        pair.tx.enqueue(&[b"ab", b"", b"cdef", b"g"]).unwrap();

        let mut out = [0u8; 7];
        pair.rx.peek(&mut out).unwrap();
        assert_eq!(&out, b"abcdefg");
        // Payload plus trailer is all the packet occupies.
        assert_eq!(pair.tx.snapshot().unwrap().occupied, 7 + TRAILER_LEN as u32);
    }

    /// The dsize = 64 walkthrough: 20-byte payloads cost 28 bytes each, so
    /// two fit (36 then 8 bytes free) and the third must be rejected with
    /// every ring byte left intact.
    #[test]
    fn rejection_leaves_no_side_effects() {
        let pair = ring_pair(64, false);

        assert!(pair.tx.enqueue(&[&[0xAA; 20]]).unwrap());
        assert!(!pair.tx.enqueue(&[&[0xBB; 20]]).unwrap());

        let before = pair.tx.snapshot().unwrap();
        assert_eq!(before.free, 8);

        match pair.tx.enqueue(&[&[0xCC; 20]]) {
            Err(RingError::WouldBlock { need, avail }) => {
                assert_eq!(need, 28);
                assert_eq!(avail, 8);
            }
            other => panic!("expected WouldBlock, got {other:?}"),
        }
        assert_eq!(pair.tx.snapshot().unwrap(), before);

        // Both buffered packets survive the rejected write.
        let mut out = [0u8; 20];
        pair.rx.read(0, &mut out).unwrap();
        assert_eq!(out, [0xAA; 20]);
        pair.rx.read(0, &mut out).unwrap();
        assert_eq!(out, [0xBB; 20]);
    }

    #[test]
    fn exact_fit_is_rejected() {
        let pair = ring_pair(64, false);
        // 56 + 8 == 64 would make the ring look empty again.
        let err = pair.tx.enqueue(&[&[0u8; 56]]).unwrap_err();
        assert!(matches!(err, RingError::WouldBlock { need: 64, avail: 64 }));
    }

    #[test]
    fn callback_writes_per_physical_segment() {
        let pair = ring_pair(64, false);
        // Park the cursor near the end so the next packet wraps.
        pair.tx.enqueue(&[&[0u8; 32]]).unwrap();
        pair.rx.advance(32).unwrap();

        let mut segments = Vec::new();
        pair.tx
            .enqueue_with(30, |segment| {
                segments.push(segment.len());
                segment.fill(0x5A);
                Ok(())
            })
            .unwrap();
        assert_eq!(segments.iter().sum::<usize>(), 30);
        assert!(segments.len() == 2, "expected a wrapping packet");

        let mut out = [0u8; 30];
        pair.rx.peek(&mut out).unwrap();
        assert_eq!(out, [0x5A; 30]);
    }

    #[test]
    fn callback_failure_commits_nothing() {
        let pair = ring_pair(128, false);
        let before = pair.tx.snapshot().unwrap();

        let err = pair
            .tx
            .enqueue_with(16, |_segment| Err("source went away".into()))
            .unwrap_err();
        assert!(matches!(err, RingError::FragmentCallback(_)));
        assert_eq!(pair.tx.snapshot().unwrap(), before);

        // The ring still works and the consumer only ever sees committed
        // packets.
        assert!(pair.tx.enqueue(&[b"good"]).unwrap());
        let mut out = [0u8; 4];
        pair.rx.peek(&mut out).unwrap();
        assert_eq!(&out, b"good");
    }

    #[test]
    fn pending_send_size_requires_the_feature_bit() {
        let plain = ring_pair(128, false);
        assert!(!plain.tx.set_pending_send_size(64));

        let flow = ring_pair(128, true);
        assert!(flow.tx.set_pending_send_size(64));
        assert_eq!(flow.rx.pending_send_size(), 64);
    }

    #[test]
    fn closed_ring_fails_fast() {
        let pair = ring_pair(128, false);
        pair.tx.close();
        let err = pair.tx.enqueue(&[b"late"]).unwrap_err();
        assert!(matches!(
            err,
            RingError::Protocol(ProtocolViolation::Closed)
        ));
    }
}
