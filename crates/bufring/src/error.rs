//! Error surface for the ring engine.
//!
//! Everything recoverable is `WouldBlock`: the caller retries after the peer
//! makes progress. `ProtocolViolation` covers conditions that indicate a bug
//! or a corrupted peer and must not be retried. The rings never log, panic,
//! or retry internally; every failure is returned to the immediate caller.

use thiserror::Error;

/// Convenience result alias for fallible ring operations.
pub type RingResult<T, E = RingError> = Result<T, E>;

/// Boxed error produced by a caller-supplied fragment copy callback.
pub type FragmentError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by ring operations.
#[derive(Debug, Error)]
pub enum RingError {
    /// Not enough free space (producer) or buffered bytes (consumer).
    ///
    /// Ring state is untouched; the caller retries once the peer has drained
    /// or refilled the ring.
    #[error("ring would block: need {need} bytes, {avail} available")]
    WouldBlock { need: usize, avail: usize },

    /// A fragment copy callback failed mid-write.
    ///
    /// The write index was never advanced, so the bytes already copied are
    /// unreachable garbage that the next successful write overwrites.
    #[error("fragment callback failed")]
    FragmentCallback(#[source] FragmentError),

    /// The supplied region cannot hold the header plus a usable data area.
    #[error("region of {len} bytes is too small, need at least {min}")]
    RegionTooSmall { len: usize, min: usize },

    /// The data area would exceed what 32-bit ring indices can address.
    #[error("region of {len} bytes exceeds the maximum of {max}")]
    RegionTooLarge { len: usize, max: usize },

    /// The region base pointer does not satisfy the header alignment.
    #[error("region pointer is not {align}-byte aligned")]
    RegionMisaligned { align: usize },

    /// Allocation of a backing region failed.
    #[error("failed to allocate ring region of {size} bytes")]
    AllocationFailed { size: usize },

    /// Unrecoverable misuse or corrupted peer state.
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),
}

/// Fatal conditions reported distinctly so callers never retry them.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolViolation {
    /// The peer published an index outside the data area. The peer-owned
    /// index is never trusted to compute a copy length, so the operation
    /// aborts before touching any bytes.
    #[error("peer index {index:#x} outside data area of {data_size} bytes")]
    IndexOutOfRange { index: u32, data_size: u32 },

    /// The ring was operated on after teardown.
    #[error("ring operated on after close")]
    Closed,
}
