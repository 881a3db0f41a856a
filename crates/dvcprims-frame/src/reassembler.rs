use bytes::{Bytes, BytesMut};
use tracing::debug;

use crate::codec::{FrameConfig, FrameHeader, HEADER_SIZE};
use crate::error::{FrameError, Result};

/// Upper bound on the buffer pre-sized from a peer-declared length.
const MAX_PREALLOCATION: usize = 64 * 1024;

/// Observable state of a [`Reassembler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReassemblyState {
    /// No message is open.
    Idle,
    /// A `FIRST` frame arrived; waiting for `LAST`.
    Accumulating,
    /// A protocol violation occurred. Terminal.
    Faulted,
}

enum State {
    Idle,
    Accumulating { declared: usize, buf: BytesMut },
    Faulted,
}

/// Accumulates frames, in arrival order, into complete messages.
///
/// Sizes come from the frame headers, never from how the bytes were chunked
/// by whatever delivered them. Any violation faults the reassembler for good;
/// the channel it belongs to must be torn down.
pub struct Reassembler {
    state: State,
    max_message_size: usize,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::with_config(&FrameConfig::default())
    }

    pub fn with_config(config: &FrameConfig) -> Self {
        Self {
            state: State::Idle,
            max_message_size: config.max_message_size,
        }
    }

    /// Feed one complete wire frame (header followed by payload).
    pub fn push_frame(&mut self, frame: &[u8]) -> Result<Option<Bytes>> {
        let header = match FrameHeader::decode(frame) {
            Ok(header) => header,
            Err(err) => return Err(self.fault(err)),
        };
        self.push(header, &frame[HEADER_SIZE..])
    }

    /// Feed a decoded header and the payload it carried.
    ///
    /// Returns the message when this frame completes it.
    pub fn push(&mut self, header: FrameHeader, payload: &[u8]) -> Result<Option<Bytes>> {
        let state = std::mem::replace(&mut self.state, State::Faulted);
        let (declared, mut buf) = match state {
            State::Faulted => return Err(FrameError::Faulted),
            State::Idle => {
                if !header.flags.is_first() {
                    return Err(self.fault(FrameError::UnexpectedFlags {
                        flags: header.flags,
                        expected: "FIRST",
                    }));
                }
                let declared = header.length as usize;
                if declared > self.max_message_size {
                    return Err(self.fault(FrameError::MessageTooLarge {
                        size: declared,
                        max: self.max_message_size,
                    }));
                }
                (declared, BytesMut::with_capacity(declared.min(MAX_PREALLOCATION)))
            }
            State::Accumulating { declared, buf } => {
                if header.flags.is_first() {
                    return Err(self.fault(FrameError::UnexpectedFlags {
                        flags: header.flags,
                        expected: "MIDDLE or LAST",
                    }));
                }
                if header.length as usize != payload.len() {
                    return Err(self.fault(FrameError::FrameLengthMismatch {
                        declared: header.length as usize,
                        actual: payload.len(),
                    }));
                }
                (declared, buf)
            }
        };

        let received = buf.len() + payload.len();
        if received > declared {
            return Err(self.fault(FrameError::LengthOverrun { declared, received }));
        }
        buf.extend_from_slice(payload);

        if !header.flags.is_last() {
            self.state = State::Accumulating { declared, buf };
            return Ok(None);
        }

        if buf.len() != declared {
            return Err(self.fault(FrameError::LengthMismatch {
                declared,
                received: buf.len(),
            }));
        }

        self.state = State::Idle;
        debug!(size = declared, "message reassembled");
        Ok(Some(buf.freeze()))
    }

    /// Current state.
    pub fn state(&self) -> ReassemblyState {
        match self.state {
            State::Idle => ReassemblyState::Idle,
            State::Accumulating { .. } => ReassemblyState::Accumulating,
            State::Faulted => ReassemblyState::Faulted,
        }
    }

    /// True when no message is partially assembled.
    pub fn is_idle(&self) -> bool {
        matches!(self.state, State::Idle)
    }

    /// Enter `Faulted` and hand back `err`. The owner of the stream logs it
    /// when it closes.
    pub(crate) fn fault(&mut self, err: FrameError) -> FrameError {
        self.state = State::Faulted;
        err
    }
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}
