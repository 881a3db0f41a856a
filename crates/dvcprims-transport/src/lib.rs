//! Transport boundaries for dynamic virtual channels.
//!
//! Two collaborator shapes are modelled here:
//! - [`NativeChannel`]: a push-style native handle. The native layer owns the
//!   receive side and calls into dvcprims; dvcprims only writes and closes.
//! - [`ChannelStream`]: a readable/writable byte stream. On Unix this is a
//!   Unix domain socket found by channel name through [`UnixDomainSocket`].
//!
//! Neither carries any framing. Everything above builds on these types.

pub mod error;
pub mod traits;

#[cfg(unix)]
pub mod uds;

pub use error::{is_disconnect, Result, TransportError};
pub use traits::{ChannelStream, NativeChannel};

#[cfg(unix)]
pub use uds::UnixDomainSocket;
