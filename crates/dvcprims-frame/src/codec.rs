use std::fmt;

use bitflags::bitflags;
use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Frame header: length (4) + flags (4) = 8 bytes.
pub const HEADER_SIZE: usize = 8;

/// Default maximum payload carried by one frame.
pub const DEFAULT_MAX_FRAME_PAYLOAD: usize = 1600;

/// Default maximum reassembled message size: 16 MiB.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

bitflags! {
    /// Position of a frame within its message.
    ///
    /// Interior frames carry neither flag. Unknown bits are preserved on
    /// decode and otherwise ignored.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FrameFlags: u32 {
        /// First frame of a message; its length is the message total.
        const FIRST = 0x01;
        /// Final frame of a message.
        const LAST = 0x02;
        /// Single-frame message.
        const ONLY = Self::FIRST.bits() | Self::LAST.bits();
    }
}

impl FrameFlags {
    pub fn is_first(self) -> bool {
        self.contains(FrameFlags::FIRST)
    }

    pub fn is_last(self) -> bool {
        self.contains(FrameFlags::LAST)
    }

    fn describe(self) -> &'static str {
        match (self.is_first(), self.is_last()) {
            (true, true) => "ONLY",
            (true, false) => "FIRST",
            (false, true) => "LAST",
            (false, false) => "MIDDLE",
        }
    }
}

impl fmt::Display for FrameFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// The fixed 8-byte header preceding every frame payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Message total on a `FIRST` frame, own payload size otherwise.
    pub length: u32,
    pub flags: FrameFlags,
}

impl FrameHeader {
    pub fn new(length: u32, flags: FrameFlags) -> Self {
        Self { length, flags }
    }

    /// Decode a header from the first 8 bytes of `src`.
    pub fn decode(src: &[u8]) -> Result<Self> {
        if src.len() < HEADER_SIZE {
            return Err(FrameError::TruncatedHeader { len: src.len() });
        }
        let length = u32::from_le_bytes([src[0], src[1], src[2], src[3]]);
        let flags = u32::from_le_bytes([src[4], src[5], src[6], src[7]]);
        Ok(Self {
            length,
            flags: FrameFlags::from_bits_retain(flags),
        })
    }

    /// Append the wire form of this header to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(HEADER_SIZE);
        dst.put_u32_le(self.length);
        dst.put_u32_le(self.flags.bits());
    }

    /// Number of payload bytes that follow this header on a byte stream.
    ///
    /// A first frame carries `min(total, max_frame_payload)`, because senders
    /// fill every frame but the last.
    pub fn payload_len(&self, max_frame_payload: usize) -> usize {
        let length = self.length as usize;
        if self.flags.is_first() {
            length.min(max_frame_payload)
        } else {
            length
        }
    }
}

/// Decode the header that starts at `offset` within `buffer`.
///
/// Reads at most 8 bytes and never consumes anything.
pub fn decode_header(buffer: &[u8], offset: usize) -> Result<FrameHeader> {
    let src = buffer.get(offset..).unwrap_or_default();
    FrameHeader::decode(src)
}

/// A decoded frame: header plus the payload it carried.
#[derive(Debug, Clone)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Bytes,
}

impl Frame {
    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Encode one frame into `dst`.
///
/// `message_len` is the size of the whole message; it becomes the header
/// length when `flags` contains `FIRST`.
///
/// Wire format:
/// ```text
/// ┌──────────────┬──────────────┬──────────────────┐
/// │ Length       │ Flags        │ Payload          │
/// │ (4B LE)      │ (4B LE)      │                  │
/// └──────────────┴──────────────┴──────────────────┘
/// ```
pub fn encode_frame(
    payload: &[u8],
    flags: FrameFlags,
    message_len: usize,
    dst: &mut BytesMut,
) -> Result<()> {
    let length = if flags.is_first() {
        message_len
    } else {
        payload.len()
    };
    let length = u32::try_from(length).map_err(|_| FrameError::MessageTooLarge {
        size: length,
        max: u32::MAX as usize,
    })?;

    dst.reserve(HEADER_SIZE + payload.len());
    FrameHeader::new(length, flags).encode(dst);
    dst.put_slice(payload);
    Ok(())
}

/// Split `message` into frames of at most `max_frame_payload` bytes.
///
/// A zero-length message still yields one `ONLY` frame.
pub fn frames(message: &[u8], max_frame_payload: usize) -> Result<Frames<'_>> {
    if u32::try_from(message.len()).is_err() {
        return Err(FrameError::MessageTooLarge {
            size: message.len(),
            max: u32::MAX as usize,
        });
    }
    Ok(Frames {
        message,
        max: max_frame_payload.max(1),
        offset: 0,
        done: false,
    })
}

/// Iterator over the frames of one message, in send order.
#[derive(Debug, Clone)]
pub struct Frames<'a> {
    message: &'a [u8],
    max: usize,
    offset: usize,
    done: bool,
}

impl<'a> Iterator for Frames<'a> {
    type Item = (FrameHeader, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let start = self.offset;
        let end = (start + self.max).min(self.message.len());
        let mut flags = FrameFlags::empty();
        if start == 0 {
            flags |= FrameFlags::FIRST;
        }
        if end == self.message.len() {
            flags |= FrameFlags::LAST;
            self.done = true;
        }
        self.offset = end;

        // Length fits: `frames` rejected messages above u32::MAX.
        let length = (if flags.is_first() {
            self.message.len()
        } else {
            end - start
        }) as u32;
        Some((FrameHeader::new(length, flags), &self.message[start..end]))
    }
}

/// Encode every frame of `message` into `dst`. Returns the frame count.
pub fn encode_message(
    message: &[u8],
    max_frame_payload: usize,
    dst: &mut BytesMut,
) -> Result<usize> {
    let mut count = 0usize;
    dst.reserve(message.len() + HEADER_SIZE);
    for (header, payload) in frames(message, max_frame_payload)? {
        header.encode(dst);
        dst.put_slice(payload);
        count += 1;
    }
    Ok(count)
}

/// Configuration for framing on both send and receive paths.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload bytes per frame. Both ends must agree. Default: 1600.
    pub max_frame_payload: usize,
    /// Maximum reassembled message size in bytes. Default: 16 MiB.
    pub max_message_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_payload: DEFAULT_MAX_FRAME_PAYLOAD,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}
