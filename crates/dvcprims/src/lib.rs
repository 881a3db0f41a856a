//! Message channels over dynamic virtual channels.
//!
//! dvcprims turns a raw virtual-channel byte pipe into a duplex, message-oriented
//! channel: messages are split into flagged frames on send and reassembled on
//! receive, with cancellable reads and a single disconnect notification.
//!
//! # Crate Structure
//!
//! - [`transport`]: Native channel handles and byte streams
//! - [`frame`]: Frame codec and reassembly
//! - [`channel`]: Push and stream channels, naming, listeners (behind `channel` feature)

/// Re-export transport types.
pub mod transport {
    pub use dvcprims_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use dvcprims_frame::*;
}

/// Re-export channel types (requires `channel` feature).
#[cfg(feature = "channel")]
pub mod channel {
    pub use dvcprims_channel::*;
}
