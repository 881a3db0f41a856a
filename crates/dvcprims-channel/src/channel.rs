use async_trait::async_trait;
use bytes::Bytes;
use dvcprims_frame::FrameConfig;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::lifecycle::DisconnectHandler;

/// Lifecycle of a channel. Only `Open` channels send or receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ChannelState {
    Open = 0,
    /// The peer closed, the transport failed, or the peer broke the framing.
    RemoteClosed = 1,
    /// Disposed by this side.
    LocallyClosed = 2,
}

impl ChannelState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => ChannelState::Open,
            1 => ChannelState::RemoteClosed,
            _ => ChannelState::LocallyClosed,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChannelState::Open => "open",
            ChannelState::RemoteClosed => "remote-closed",
            ChannelState::LocallyClosed => "locally-closed",
        }
    }
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration shared by both channel variants.
#[derive(Debug, Clone, Default)]
pub struct ChannelConfig {
    /// Framing limits. Both ends must use the same `max_frame_payload`.
    pub frame: FrameConfig,
}

/// A duplex, message-oriented channel.
///
/// Messages arrive whole and in order. A message is never split across
/// reads or merged with another.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// The channel name.
    fn name(&self) -> &str;

    /// Current lifecycle state.
    fn state(&self) -> ChannelState;

    /// Send one complete message.
    ///
    /// Fails with [`ChannelError::Disconnected`](crate::ChannelError::Disconnected)
    /// unless the channel is open.
    async fn send_message(&self, message: &[u8]) -> Result<()>;

    /// Wait for the next complete message.
    ///
    /// `cancel` is honored only until the message starts arriving.
    async fn read_message(&self, cancel: &CancellationToken) -> Result<Bytes>;

    /// Close the channel and release its handle. Safe to call repeatedly.
    fn dispose(&self);

    /// Run `handler` once when the channel leaves `Open`.
    ///
    /// Handlers run on the thread that closed the channel, after its teardown
    /// and outside any internal lock. Returns `false`, dropping the handler, if it already has.
    fn on_disconnected(&self, handler: DisconnectHandler) -> bool;

    /// Resolves once the channel has left `Open`.
    async fn disconnected(&self);

    fn is_open(&self) -> bool {
        self.state() == ChannelState::Open
    }
}
