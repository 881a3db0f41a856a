use dvcprims_frame::FrameError;
use dvcprims_transport::{is_disconnect, TransportError};

/// Errors that can occur in channel operations.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The peer broke the framing rules. The channel is no longer usable.
    #[error("protocol violation: {0}")]
    ProtocolViolation(#[source] FrameError),

    /// The channel is closed, locally or by the peer.
    #[error("channel disconnected")]
    Disconnected,

    /// No endpoint is serving the named channel.
    #[error("channel {name:?} is not available: {source}")]
    Unavailable {
        name: String,
        #[source]
        source: TransportError,
    },

    /// The channel name fails validation.
    #[error("invalid channel name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    /// A read was cancelled before a message was delivered to it.
    #[error("read cancelled")]
    Cancelled,

    /// The pending-read queue was disposed before this call.
    #[error("pending-read queue disposed")]
    Disposed,

    /// An outbound message exceeds the configured maximum size.
    #[error("message too large ({size} bytes, max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// I/O error that does not indicate a disconnect.
    #[error("I/O error: {0}")]
    Io(#[source] std::io::Error),
}

impl ChannelError {
    /// True when the channel is permanently unusable after this error.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ChannelError::ProtocolViolation(_) | ChannelError::Disconnected
        )
    }
}

impl From<FrameError> for ChannelError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::ConnectionClosed => ChannelError::Disconnected,
            FrameError::Io(io) => io.into(),
            other => ChannelError::ProtocolViolation(other),
        }
    }
}

impl From<std::io::Error> for ChannelError {
    fn from(err: std::io::Error) -> Self {
        if is_disconnect(&err) {
            ChannelError::Disconnected
        } else {
            ChannelError::Io(err)
        }
    }
}

pub type Result<T> = std::result::Result<T, ChannelError>;
