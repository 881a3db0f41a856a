use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};

/// A push-style native virtual-channel handle.
///
/// The native layer delivers inbound frames by calling into the channel that
/// wraps this handle; the handle itself only exposes the outbound half. No
/// assumption is made about which thread calls `write` or `close`, so
/// implementations must be `Send + Sync`.
pub trait NativeChannel: Send + Sync {
    /// Write one complete frame (header and payload) to the peer.
    fn write(&self, frame: &[u8]) -> io::Result<()>;

    /// Release the native handle. Called at most once per channel.
    fn close(&self);
}

/// A connected byte stream carrying a virtual channel.
///
/// This is the fundamental I/O type for stream channels.
/// On Unix, this wraps a Unix domain socket stream. An in-memory variant
/// backs [`ChannelStream::pair`].
pub struct ChannelStream {
    inner: ChannelStreamInner,
}

enum ChannelStreamInner {
    #[cfg(unix)]
    Unix(tokio::net::UnixStream),
    Memory(DuplexStream),
}

impl ChannelStream {
    /// Create a ChannelStream from a Unix domain socket stream.
    #[cfg(unix)]
    pub(crate) fn from_unix(stream: tokio::net::UnixStream) -> Self {
        Self {
            inner: ChannelStreamInner::Unix(stream),
        }
    }

    /// Create two connected in-memory streams.
    ///
    /// `capacity` bounds the bytes buffered in each direction before writes
    /// wait for the reader.
    pub fn pair(capacity: usize) -> (Self, Self) {
        let (left, right) = tokio::io::duplex(capacity);
        (
            Self {
                inner: ChannelStreamInner::Memory(left),
            },
            Self {
                inner: ChannelStreamInner::Memory(right),
            },
        )
    }

    /// Get the credentials of the connected peer.
    ///
    /// Returns `(uid, gid, pid)`, or `None` for in-memory streams and on
    /// platforms that do not expose peer credentials.
    pub fn peer_credentials(&self) -> Option<(u32, u32, Option<i32>)> {
        match &self.inner {
            #[cfg(unix)]
            ChannelStreamInner::Unix(stream) => stream
                .peer_cred()
                .ok()
                .map(|cred| (cred.uid(), cred.gid(), cred.pid())),
            ChannelStreamInner::Memory(_) => None,
        }
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match &self.inner {
            #[cfg(unix)]
            ChannelStreamInner::Unix(_) => "unix-domain-socket",
            ChannelStreamInner::Memory(_) => "memory",
        }
    }
}

impl AsyncRead for ChannelStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            #[cfg(unix)]
            ChannelStreamInner::Unix(stream) => Pin::new(stream).poll_read(cx, buf),
            ChannelStreamInner::Memory(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for ChannelStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut self.get_mut().inner {
            #[cfg(unix)]
            ChannelStreamInner::Unix(stream) => Pin::new(stream).poll_write(cx, buf),
            ChannelStreamInner::Memory(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            #[cfg(unix)]
            ChannelStreamInner::Unix(stream) => Pin::new(stream).poll_flush(cx),
            ChannelStreamInner::Memory(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            #[cfg(unix)]
            ChannelStreamInner::Unix(stream) => Pin::new(stream).poll_shutdown(cx),
            ChannelStreamInner::Memory(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

impl std::fmt::Debug for ChannelStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelStream")
            .field("type", &self.transport_name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    #[tokio::test]
    async fn memory_pair_is_bidirectional() {
        let (mut left, mut right) = ChannelStream::pair(64);

        left.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        right.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        right.write_all(b"pong").await.unwrap();
        left.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");
    }

    #[tokio::test]
    async fn dropping_one_end_yields_eof() {
        let (left, mut right) = ChannelStream::pair(64);
        drop(left);

        let mut buf = [0u8; 1];
        assert_eq!(right.read(&mut buf).await.unwrap(), 0);
    }

    #[test]
    fn memory_stream_has_no_credentials() {
        let (left, _right) = ChannelStream::pair(8);
        assert!(left.peer_credentials().is_none());
        assert_eq!(left.transport_name(), "memory");
        assert!(format!("{left:?}").contains("memory"));
    }
}
