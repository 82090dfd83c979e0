//! Bidirectional shared-memory ring-buffer transport.
//!
//! Two execution domains that share memory but no lock exchange discrete
//! packets through a pair of independent rings: one carries outbound traffic
//! (local producer, remote consumer), the other inbound. This crate is the
//! ring engine only:
//!
//! * [`RingRegion`] – zeroed, aligned backing memory for one ring.
//! * [`SendRing`] – producer endpoint: fragment/callback enqueue and the
//!   empty-edge TX signal decision.
//! * [`ReceiveRing`] – consumer endpoint: peek/advance/read and the
//!   watermark-edge RX signal decision.
//! * [`RingSnapshot`] – read-only state dump for external reporting.
//!
//! Packets are framed as payload bytes followed by an 8-byte trailer; no
//! length prefix is imposed, callers encode lengths by convention. Every
//! operation is synchronous and non-blocking: shortage of space or data is
//! reported as [`RingError::WouldBlock`], and delivering the cross-domain
//! signal the rings ask for is always the caller's job.

mod error;
mod layout;
mod recv;
mod region;
mod ring;
mod send;

pub use error::{FragmentError, ProtocolViolation, RingError, RingResult};
pub use layout::{RingSnapshot, FEAT_PENDING_SEND_SIZE, HEADER_SIZE, TRAILER_LEN};
pub use recv::ReceiveRing;
pub use region::{RingRegion, REGION_ALIGN};
pub use send::SendRing;
