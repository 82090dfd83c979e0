//! Channel boundary around the `bufring` engine.
//!
//! The rings decide when a signal is needed; this crate is the collaborator
//! that allocates the shared regions, wires doorbells between the two sides,
//! and offers blocking send/recv built on the pending-send-size flow-control
//! protocol. In-process doorbells are futex-backed; a partitioned deployment
//! would swap in its interrupt/hypercall primitive behind [`Doorbell`].

mod channel;
mod doorbell;
mod error;

pub use channel::{pair, Endpoint, FRAME_HEADER_LEN};
pub use doorbell::{Doorbell, FutexDoorbell};
pub use error::{ChannelError, ChannelResult};
