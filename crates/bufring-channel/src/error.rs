use thiserror::Error;

use bufring::RingError;

pub type ChannelResult<T> = Result<T, ChannelError>;

#[derive(Debug, Error)]
pub enum ChannelError {
    /// The payload can never fit the ring, no matter how much is drained.
    #[error("payload of {len} bytes can never fit a ring with {data_size} data bytes")]
    PayloadTooLarge { len: usize, data_size: u32 },

    /// A frame header promised more bytes than the ring could ever hold;
    /// the peer is corrupt or speaking a different framing.
    #[error("corrupt frame header: claimed payload of {len} bytes")]
    CorruptFrame { len: usize },

    #[error("ring error: {0}")]
    Ring(#[from] RingError),
}
