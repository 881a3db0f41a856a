use std::io::ErrorKind;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};

use crate::codec::{Frame, FrameConfig, FrameHeader, HEADER_SIZE};
use crate::error::{FrameError, Result};
use crate::reassembler::{ReassemblyState, Reassembler};

const READ_BUFFER_CAPACITY: usize = 8 * 1024;

/// Reads frames and whole messages from any `AsyncRead` byte stream.
///
/// A byte stream carries no record boundaries, so the payload size of a
/// `FIRST` frame is derived from the shared `max_frame_payload`: senders
/// always fill a frame before starting the next one.
pub struct FrameReader<R> {
    inner: BufReader<R>,
    config: FrameConfig,
    reassembler: Reassembler,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: R) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: R, config: FrameConfig) -> Self {
        let reassembler = Reassembler::with_config(&config);
        Self {
            inner: BufReader::with_capacity(READ_BUFFER_CAPACITY, inner),
            config,
            reassembler,
        }
    }

    /// Wait until at least one byte is buffered without consuming it.
    ///
    /// Returns `false` at end of stream. Cancel-safe: dropping the future
    /// loses nothing, so callers may race it against a cancellation signal.
    pub async fn ready(&mut self) -> Result<bool> {
        loop {
            match self.inner.fill_buf().await {
                Ok(buf) => return Ok(!buf.is_empty()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Read the next frame.
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when the stream ends,
    /// whether at a frame boundary or partway through one. Not cancel-safe.
    pub async fn read_frame(&mut self) -> Result<Frame> {
        let mut raw = [0u8; HEADER_SIZE];
        self.inner.read_exact(&mut raw).await.map_err(map_eof)?;
        let header = FrameHeader::decode(&raw)?;

        if !header.flags.is_first() && header.length as usize > self.config.max_frame_payload {
            return Err(FrameError::FrameTooLarge {
                size: header.length as usize,
                max: self.config.max_frame_payload,
            });
        }

        let mut payload = BytesMut::zeroed(header.payload_len(self.config.max_frame_payload));
        self.inner.read_exact(&mut payload).await.map_err(map_eof)?;

        Ok(Frame {
            header,
            payload: payload.freeze(),
        })
    }

    /// Read frames until one message is complete.
    ///
    /// Any protocol violation faults the reader; every later call fails.
    pub async fn read_message(&mut self) -> Result<Bytes> {
        if self.reassembler.state() == ReassemblyState::Faulted {
            return Err(FrameError::Faulted);
        }
        loop {
            let frame = match self.read_frame().await {
                Ok(frame) => frame,
                Err(err) if err.is_protocol_violation() => {
                    return Err(self.reassembler.fault(err));
                }
                Err(err) => return Err(err),
            };
            if let Some(message) = self.reassembler.push(frame.header, &frame.payload)? {
                return Ok(message);
            }
        }
    }

    /// True when no message is partially read.
    pub fn is_idle(&self) -> bool {
        self.reassembler.is_idle()
    }

    /// Reassembly state of the inbound direction.
    pub fn state(&self) -> ReassemblyState {
        self.reassembler.state()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &R {
        self.inner.get_ref()
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut R {
        self.inner.get_mut()
    }

    /// Consume the reader and return the inner stream. Buffered bytes are lost.
    pub fn into_inner(self) -> R {
        self.inner.into_inner()
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

fn map_eof(err: std::io::Error) -> FrameError {
    if err.kind() == ErrorKind::UnexpectedEof {
        FrameError::ConnectionClosed
    } else {
        FrameError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::{BufMut, BytesMut};
    use tokio::io::AsyncWriteExt;

    use super::*;
    use crate::codec::{encode_frame, encode_message, FrameFlags};

    fn wire_message(message: &[u8], max_frame_payload: usize) -> Vec<u8> {
        let mut wire = BytesMut::new();
        encode_message(message, max_frame_payload, &mut wire).unwrap();
        wire.to_vec()
    }

    #[tokio::test]
    async fn read_single_frame() {
        let wire = wire_message(b"hello", 1600);
        let mut reader = FrameReader::new(wire.as_slice());

        let frame = reader.read_frame().await.unwrap();
        assert_eq!(frame.header.flags, FrameFlags::ONLY);
        assert_eq!(frame.payload.as_ref(), b"hello");
    }

    #[tokio::test]
    async fn read_multi_frame_message() {
        let message: Vec<u8> = (0..5000u32).map(|i| i as u8).collect();
        let wire = wire_message(&message, 1600);
        let mut reader = FrameReader::new(wire.as_slice());

        let out = reader.read_message().await.unwrap();
        assert_eq!(out.as_ref(), message.as_slice());
        assert!(reader.is_idle());
    }

    #[tokio::test]
    async fn read_consecutive_messages() {
        let mut wire = wire_message(b"one", 1600);
        wire.extend(wire_message(b"", 1600));
        wire.extend(wire_message(b"three", 2));
        let config = FrameConfig {
            max_frame_payload: 2,
            ..FrameConfig::default()
        };
        let mut reader = FrameReader::with_config(wire.as_slice(), config);

        assert_eq!(reader.read_message().await.unwrap().as_ref(), b"one");
        assert!(reader.read_message().await.unwrap().is_empty());
        assert_eq!(reader.read_message().await.unwrap().as_ref(), b"three");
    }

    #[tokio::test]
    async fn byte_at_a_time_stream() {
        let message = vec![0x42u8; 3000];
        let wire = wire_message(&message, 1600);
        let (mut tx, rx) = tokio::io::duplex(1);

        let writer = tokio::spawn(async move {
            tx.write_all(&wire).await.unwrap();
        });
        let mut reader = FrameReader::new(rx);
        let out = reader.read_message().await.unwrap();
        writer.await.unwrap();

        assert_eq!(out.len(), 3000);
        assert!(out.iter().all(|b| *b == 0x42));
    }

    #[tokio::test]
    async fn clean_eof_is_connection_closed() {
        let mut reader = FrameReader::new(&b""[..]);
        assert!(!reader.ready().await.unwrap());
        let err = reader.read_message().await.unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[tokio::test]
    async fn eof_mid_message_is_connection_closed() {
        let wire = wire_message(&[9u8; 4000], 1600);
        let mut reader = FrameReader::new(&wire[..2000]);

        let err = reader.read_message().await.unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
        assert!(!err.is_protocol_violation());
    }

    #[tokio::test]
    async fn leading_last_frame_faults_reader() {
        let mut wire = BytesMut::new();
        encode_frame(b"tail", FrameFlags::LAST, 4, &mut wire).unwrap();
        encode_frame(b"ok", FrameFlags::ONLY, 2, &mut wire).unwrap();
        let mut reader = FrameReader::new(&wire[..]);

        let err = reader.read_message().await.unwrap_err();
        assert!(err.is_protocol_violation());
        assert_eq!(reader.state(), ReassemblyState::Faulted);

        let err = reader.read_message().await.unwrap_err();
        assert!(matches!(err, FrameError::Faulted));
    }

    #[tokio::test]
    async fn oversized_interior_frame_rejected() {
        let mut wire = BytesMut::new();
        encode_frame(b"ab", FrameFlags::FIRST, 100, &mut wire).unwrap();
        wire.put_u32_le(64);
        wire.put_u32_le(0);

        let config = FrameConfig {
            max_frame_payload: 2,
            ..FrameConfig::default()
        };
        let mut reader = FrameReader::with_config(&wire[..], config);
        let err = reader.read_message().await.unwrap_err();
        assert!(matches!(err, FrameError::FrameTooLarge { size: 64, max: 2 }));
        assert_eq!(reader.state(), ReassemblyState::Faulted);
    }

    #[tokio::test]
    async fn ready_is_cancel_safe() {
        let (mut tx, rx) = tokio::io::duplex(64);
        let mut reader = FrameReader::new(rx);

        let waited = tokio::time::timeout(Duration::from_millis(20), reader.ready()).await;
        assert!(waited.is_err());

        tx.write_all(&wire_message(b"late", 1600)).await.unwrap();
        assert!(reader.ready().await.unwrap());
        assert_eq!(reader.read_message().await.unwrap().as_ref(), b"late");
    }

    #[tokio::test]
    async fn accessors_and_into_inner() {
        let mut reader = FrameReader::new(&b""[..]);
        assert_eq!(reader.config().max_frame_payload, 1600);
        let _ = reader.get_ref();
        let _ = reader.get_mut();
        let _inner = reader.into_inner();
    }
}
