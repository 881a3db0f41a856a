use crate::codec::FrameFlags;

/// Errors that can occur during frame encoding, decoding, and reassembly.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Fewer bytes than a frame header were supplied.
    #[error("frame too short ({len} bytes, header is 8)")]
    TruncatedHeader { len: usize },

    /// A frame arrived out of sequence.
    #[error("frame received with flags {flags} when {expected} was expected")]
    UnexpectedFlags {
        flags: FrameFlags,
        expected: &'static str,
    },

    /// More payload arrived than the first frame declared.
    #[error("message declared {declared} bytes but {received} bytes arrived")]
    LengthOverrun { declared: usize, received: usize },

    /// The last frame arrived before the declared length was reached.
    #[error("message declared length {declared} but {received} bytes were received")]
    LengthMismatch { declared: usize, received: usize },

    /// A non-first frame carried a different payload size than its header.
    #[error("frame declared {declared} payload bytes but carried {actual}")]
    FrameLengthMismatch { declared: usize, actual: usize },

    /// A non-first frame exceeds the negotiated frame payload size.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// The message exceeds the configured maximum size.
    #[error("message too large ({size} bytes, max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// An earlier protocol violation left the reassembler unusable.
    #[error("reassembler faulted by an earlier protocol violation")]
    Faulted,

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

impl FrameError {
    /// True for faults caused by the peer breaking the framing rules.
    pub fn is_protocol_violation(&self) -> bool {
        !matches!(self, FrameError::Io(_) | FrameError::ConnectionClosed)
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
