//! Message channels over dynamic virtual channels.
//!
//! Two channel variants share one async API, [`MessageChannel`]:
//! - [`CallbackChannel`] is fed by a native layer that calls in once per
//!   arriving frame. Completed messages queue in a [`PendingReadQueue`]
//!   until a reader asks for them.
//! - [`StreamChannel`] pumps frames itself over a byte stream.
//!
//! Both raise a single disconnect notification, however the channel ends.

pub mod channel;
#[cfg(unix)]
pub mod connector;
pub mod error;
mod lifecycle;
#[cfg(unix)]
pub mod listener;
pub mod name;
pub mod push;
pub mod queue;
pub mod registry;
pub mod stream;

#[cfg(test)]
mod test_support;

pub use channel::{ChannelConfig, ChannelState, MessageChannel};
#[cfg(unix)]
pub use connector::{default_channel_dir, open, open_with_config, CHANNEL_DIR_ENV};
pub use error::{ChannelError, Result};
pub use lifecycle::DisconnectHandler;
#[cfg(unix)]
pub use listener::StreamListener;
pub use name::{validate_channel_name, ChannelName, MAX_CHANNEL_NAME_LEN};
pub use push::CallbackChannel;
pub use queue::PendingReadQueue;
pub use registry::{AcceptError, AcceptHandler, ChannelListener, ChannelManager, ListenerRegistry};
pub use stream::StreamChannel;
