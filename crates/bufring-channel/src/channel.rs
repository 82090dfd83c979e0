//! Duplex channel assembled from two independent rings.
//!
//! The core rings only decide *whether* the peer needs a signal; this module
//! supplies everything external to them: region provisioning, the
//! doorbell wiring, and a blocking convenience layer that drives the
//! flow-control protocol. Frames carry a 4-byte little-endian length prefix
//! as the channel-level convention, since the rings impose none beyond the
//! trailer.

use crate::doorbell::{Doorbell, FutexDoorbell};
use crate::error::{ChannelError, ChannelResult};
use bufring::{ReceiveRing, RingError, RingRegion, SendRing, TRAILER_LEN};
use std::sync::Arc;
use tracing::{debug, trace};

/// Length prefix prepended to every payload by the channel layer.
pub const FRAME_HEADER_LEN: usize = 4;

struct Regions {
    _a_to_b: RingRegion,
    _b_to_a: RingRegion,
}

/// One side of a duplex ring channel.
///
/// Each endpoint owns a producer view of one ring and a consumer view of the
/// other; the peer endpoint holds the mirror image. Signals travel through
/// futex doorbells: the endpoint rings the peer's bell whenever the rings
/// request it and parks on its own while blocked.
pub struct Endpoint {
    tx: SendRing,
    rx: ReceiveRing,
    peer_bell: Arc<FutexDoorbell>,
    local_bell: Arc<FutexDoorbell>,
    _regions: Arc<Regions>,
}

/// Allocates both rings and returns the two connected endpoints.
///
/// `a_to_b_data` and `b_to_a_data` size the circular data areas in bytes.
/// Flow control is always advertised, so blocking sends can publish their
/// watermark and be woken by the peer's threshold heuristic.
pub fn pair(a_to_b_data: usize, b_to_a_data: usize) -> ChannelResult<(Endpoint, Endpoint)> {
    let mut a_to_b = RingRegion::for_ring(a_to_b_data)?;
    let mut b_to_a = RingRegion::for_ring(b_to_a_data)?;

    // Consumers attach first so their feature bits are in place before any
    // producer inspects them.
    // SAFETY: each region outlives both endpoints via the shared Arc, and
    // exactly one producer and one consumer attach per region.
    let (tx_a, rx_b) = unsafe {
        let rx = ReceiveRing::attach(a_to_b.as_mut_ptr(), a_to_b.len(), true)?;
        let tx = SendRing::attach(a_to_b.as_mut_ptr(), a_to_b.len())?;
        (tx, rx)
    };
    let (tx_b, rx_a) = unsafe {
        let rx = ReceiveRing::attach(b_to_a.as_mut_ptr(), b_to_a.len(), true)?;
        let tx = SendRing::attach(b_to_a.as_mut_ptr(), b_to_a.len())?;
        (tx, rx)
    };

    let regions = Arc::new(Regions {
        _a_to_b: a_to_b,
        _b_to_a: b_to_a,
    });
    let bell_a = Arc::new(FutexDoorbell::new());
    let bell_b = Arc::new(FutexDoorbell::new());

    let a = Endpoint {
        tx: tx_a,
        rx: rx_a,
        peer_bell: Arc::clone(&bell_b),
        local_bell: Arc::clone(&bell_a),
        _regions: Arc::clone(&regions),
    };
    let b = Endpoint {
        tx: tx_b,
        rx: rx_b,
        peer_bell: bell_a,
        local_bell: bell_b,
        _regions: regions,
    };
    Ok((a, b))
}

impl Endpoint {
    /// Enqueues one framed payload without blocking; rings the peer's
    /// doorbell if the ring requests it.
    pub fn try_send(&self, payload: &[u8]) -> ChannelResult<()> {
        let need = FRAME_HEADER_LEN + payload.len() + TRAILER_LEN;
        if need >= self.tx.data_size() as usize {
            return Err(ChannelError::PayloadTooLarge {
                len: payload.len(),
                data_size: self.tx.data_size(),
            });
        }
        let header = (payload.len() as u32).to_le_bytes();
        let need_signal = self.tx.enqueue(&[&header, payload])?;
        if need_signal {
            trace!(bytes = payload.len(), "ringing consumer doorbell");
            self.peer_bell.ring();
        }
        Ok(())
    }

    /// Enqueues one framed payload, parking until space frees up.
    ///
    /// On `WouldBlock` the endpoint publishes the byte count it needs as the
    /// pending-send watermark, retries once (the publish races the peer's
    /// watermark check) and then waits for the doorbell.
    pub fn send(&self, payload: &[u8]) -> ChannelResult<()> {
        let mut published = false;
        loop {
            let seen = self.local_bell.epoch();
            match self.try_send(payload) {
                Ok(()) => {
                    if published {
                        self.tx.set_pending_send_size(0);
                    }
                    return Ok(());
                }
                Err(ChannelError::Ring(RingError::WouldBlock { need, .. })) => {
                    if !published {
                        self.tx.set_pending_send_size(need as u32);
                        published = true;
                        continue;
                    }
                    debug!(need, "producer parked awaiting ring space");
                    self.local_bell.wait(seen);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Dequeues one framed payload if available; rings the peer's doorbell
    /// when the retirement crosses its published watermark.
    pub fn try_recv(&self) -> ChannelResult<Option<Vec<u8>>> {
        let mut header = [0u8; FRAME_HEADER_LEN];
        match self.rx.peek(&mut header) {
            Ok(()) => {}
            Err(RingError::WouldBlock { .. }) => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let len = u32::from_le_bytes(header) as usize;
        if FRAME_HEADER_LEN + len + TRAILER_LEN > self.rx.data_size() as usize {
            return Err(ChannelError::CorruptFrame { len });
        }

        let mut payload = vec![0u8; len];
        // A committed packet always holds every byte its header claims, so a
        // short read means the header itself is garbage.
        let need_signal = match self.rx.read(FRAME_HEADER_LEN, &mut payload) {
            Ok(need_signal) => need_signal,
            Err(RingError::WouldBlock { .. }) => return Err(ChannelError::CorruptFrame { len }),
            Err(e) => return Err(e.into()),
        };
        if need_signal {
            trace!(bytes = len, "ringing producer doorbell");
            self.peer_bell.ring();
        }
        Ok(Some(payload))
    }

    /// Dequeues one framed payload, parking until one arrives.
    pub fn recv(&self) -> ChannelResult<Vec<u8>> {
        loop {
            let seen = self.local_bell.epoch();
            if let Some(payload) = self.try_recv()? {
                return Ok(payload);
            }
            self.local_bell.wait(seen);
        }
    }

    /// Drains up to `max` payloads under interrupt mask, invoking `f` for
    /// each. Masking spares the producer its empty-edge signals while we
    /// are actively polling; the post-unmask re-check catches packets that
    /// raced the unmask and were therefore enqueued silently.
    pub fn drain(&self, max: usize, mut f: impl FnMut(&[u8])) -> ChannelResult<usize> {
        let mut drained = 0;
        self.rx.set_interrupt_mask(true);
        loop {
            while drained < max {
                match self.try_recv() {
                    Ok(Some(payload)) => {
                        f(&payload);
                        drained += 1;
                    }
                    Ok(None) => break,
                    Err(e) => {
                        self.rx.set_interrupt_mask(false);
                        return Err(e);
                    }
                }
            }
            self.rx.set_interrupt_mask(false);
            if drained >= max {
                return Ok(drained);
            }
            match self.rx.snapshot() {
                Ok(snap) if snap.occupied > 0 => self.rx.set_interrupt_mask(true),
                Ok(_) => return Ok(drained),
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Producer view of the outbound ring.
    pub fn tx(&self) -> &SendRing {
        &self.tx
    }

    /// Consumer view of the inbound ring.
    pub fn rx(&self) -> &ReceiveRing {
        &self.rx
    }

    /// This endpoint's own doorbell; its epoch counts the signals the peer
    /// delivered here.
    pub fn doorbell(&self) -> &FutexDoorbell {
        &self.local_bell
    }

    /// Closes this endpoint's ring views; subsequent local operations fail
    /// fast. Rings the peer's doorbell so a parked peer re-evaluates.
    pub fn close(&self) {
        self.tx.close();
        self.rx.close();
        self.peer_bell.ring();
    }
}
