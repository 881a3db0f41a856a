use std::io::ErrorKind;

use bytes::BytesMut;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::codec::{encode_message, FrameConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes whole messages, split into frames, to any `AsyncWrite` stream.
pub struct FrameWriter<W> {
    inner: W,
    buf: BytesMut,
    config: FrameConfig,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: W) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: W, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Encode `message`, write every frame, and flush.
    ///
    /// Returns the number of frames written. Not cancel-safe: dropping the
    /// future partway leaves the stream mid-frame.
    pub async fn send_message(&mut self, message: &[u8]) -> Result<usize> {
        if message.len() > self.config.max_message_size {
            return Err(FrameError::MessageTooLarge {
                size: message.len(),
                max: self.config.max_message_size,
            });
        }

        self.buf.clear();
        let count = encode_message(message, self.config.max_frame_payload, &mut self.buf)?;

        self.inner.write_all(&self.buf).await.map_err(map_write)?;
        self.flush().await?;

        trace!(
            size = message.len(),
            frames = count,
            wire = self.buf.len(),
            "message written"
        );
        Ok(count)
    }

    /// Flush the underlying stream.
    pub async fn flush(&mut self) -> Result<()> {
        self.inner.flush().await.map_err(map_write)
    }

    /// Shut down the write direction of the underlying stream.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner.shutdown().await.map_err(map_write)
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> W {
        self.inner
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

fn map_write(err: std::io::Error) -> FrameError {
    if err.kind() == ErrorKind::WriteZero {
        FrameError::ConnectionClosed
    } else {
        FrameError::Io(err)
    }
}
