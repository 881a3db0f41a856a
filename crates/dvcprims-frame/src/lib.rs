//! Message framing for dynamic virtual channels.
//!
//! A message is split into one or more frames, each carrying an 8-byte header:
//! - A 4-byte little-endian length
//! - A 4-byte little-endian flag set (`FIRST`, `LAST`)
//!
//! The first frame's length is the total message size; every later frame's
//! length is its own payload size. [`Reassembler`] enforces the sequencing
//! rules on the way in, [`frames`] produces them on the way out.

pub mod codec;
pub mod error;
pub mod reader;
pub mod reassembler;
pub mod writer;

pub use codec::{
    decode_header, encode_frame, encode_message, frames, Frame, FrameConfig, FrameFlags,
    FrameHeader, Frames, DEFAULT_MAX_FRAME_PAYLOAD, DEFAULT_MAX_MESSAGE_SIZE, HEADER_SIZE,
};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use reassembler::{ReassemblyState, Reassembler};
pub use writer::FrameWriter;
