use async_trait::async_trait;
use bytes::Bytes;
use dvcprims_frame::{FrameError, FrameReader, FrameWriter};
use dvcprims_transport::ChannelStream;
use tokio::io::{split, AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::channel::{ChannelConfig, ChannelState, MessageChannel};
use crate::error::{ChannelError, Result};
use crate::lifecycle::{DisconnectHandler, Lifecycle};

/// A channel that pumps frames over a readable/writable byte stream.
///
/// Every send is flushed before it returns. A read may be cancelled while it
/// waits for a message to start; once the first byte of a message has been
/// consumed the read runs to completion, because stopping partway would leave
/// the stream between frame boundaries. Only disposal interrupts it then.
pub struct StreamChannel<S = ChannelStream> {
    name: String,
    config: ChannelConfig,
    reader: AsyncMutex<Option<FrameReader<ReadHalf<S>>>>,
    writer: AsyncMutex<Option<FrameWriter<WriteHalf<S>>>>,
    shutdown: CancellationToken,
    lifecycle: Lifecycle,
}

impl<S> StreamChannel<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new(name: impl Into<String>, stream: S) -> Self {
        Self::with_config(name, stream, ChannelConfig::default())
    }

    pub fn with_config(name: impl Into<String>, stream: S, config: ChannelConfig) -> Self {
        let (read_half, write_half) = split(stream);
        Self {
            name: name.into(),
            reader: AsyncMutex::new(Some(FrameReader::with_config(
                read_half,
                config.frame.clone(),
            ))),
            writer: AsyncMutex::new(Some(FrameWriter::with_config(
                write_half,
                config.frame.clone(),
            ))),
            config,
            shutdown: CancellationToken::new(),
            lifecycle: Lifecycle::new(),
        }
    }

    /// Channel configuration.
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Token cancelled once the channel leaves `Open`.
    pub fn disconnect_token(&self) -> CancellationToken {
        self.lifecycle.disconnect_token()
    }

    fn close(&self, to: ChannelState) -> bool {
        self.lifecycle.close(to, || {
            self.shutdown.cancel();
            self.release_stream();
        })
    }

    /// Drop whichever stream halves are not in use; an in-flight operation
    /// drops its own half when it sees the shutdown.
    fn release_stream(&self) {
        if let Ok(mut reader) = self.reader.try_lock() {
            reader.take();
        }
        if let Ok(mut writer) = self.writer.try_lock() {
            writer.take();
        }
    }

    /// Classify a stream failure and close the channel.
    fn fail(&self, err: FrameError) -> ChannelError {
        let err = ChannelError::from(err);
        match &err {
            ChannelError::ProtocolViolation(cause) => {
                error!(channel = %self.name, error = %cause, "protocol violation, closing channel");
            }
            ChannelError::Disconnected => {
                debug!(channel = %self.name, "peer disconnected");
            }
            other => {
                warn!(channel = %self.name, error = %other, "stream failed, closing channel");
            }
        }
        self.close(ChannelState::RemoteClosed);
        err
    }
}

/// Closes the channel if an operation is abandoned past its point of no return.
/// The half it was using is dropped first, so the stream itself shuts down.
struct InFlight<'a, S, T>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    channel: &'a StreamChannel<S>,
    op: &'static str,
    half: &'a mut Option<T>,
    armed: bool,
}

impl<'a, S, T> InFlight<'a, S, T>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    fn new(channel: &'a StreamChannel<S>, op: &'static str, half: &'a mut Option<T>) -> Self {
        Self {
            channel,
            op,
            half,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<S, T> Drop for InFlight<'_, S, T>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    fn drop(&mut self) {
        if self.armed {
            warn!(channel = %self.channel.name, op = self.op, "abandoned mid-message, closing channel");
            self.half.take();
            self.channel.close(ChannelState::LocallyClosed);
        }
    }
}

#[async_trait]
impl<S> MessageChannel for StreamChannel<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> ChannelState {
        self.lifecycle.state()
    }

    async fn send_message(&self, message: &[u8]) -> Result<()> {
        if !self.lifecycle.is_open() {
            return Err(ChannelError::Disconnected);
        }
        if message.len() > self.config.frame.max_message_size {
            return Err(ChannelError::MessageTooLarge {
                size: message.len(),
                max: self.config.frame.max_message_size,
            });
        }

        let mut guard = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Err(ChannelError::Disconnected),
            guard = self.writer.lock() => guard,
        };
        if guard.is_none() {
            return Err(ChannelError::Disconnected);
        }

        let mut in_flight = InFlight::new(self, "send", &mut *guard);
        let result = match in_flight.half.as_mut() {
            Some(writer) => tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => None,
                result = writer.send_message(message) => Some(result),
            },
            None => None,
        };
        in_flight.disarm();

        match result {
            Some(Ok(count)) => {
                trace!(channel = %self.name, size = message.len(), frames = count, "message sent");
                Ok(())
            }
            Some(Err(err)) => {
                guard.take();
                Err(self.fail(err))
            }
            None => {
                guard.take();
                Err(ChannelError::Disconnected)
            }
        }
    }

    async fn read_message(&self, cancel: &CancellationToken) -> Result<Bytes> {
        if !self.lifecycle.is_open() {
            return Err(ChannelError::Disconnected);
        }

        let mut guard = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Err(ChannelError::Cancelled),
            _ = cancel.cancelled() => return Err(ChannelError::Cancelled),
            guard = self.reader.lock() => guard,
        };
        let Some(reader) = guard.as_mut() else {
            return Err(ChannelError::Disconnected);
        };

        let ready = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => None,
            _ = cancel.cancelled() => return Err(ChannelError::Cancelled),
            ready = reader.ready() => Some(ready),
        };
        match ready {
            Some(Ok(true)) => {}
            Some(Ok(false)) => {
                guard.take();
                return Err(self.fail(FrameError::ConnectionClosed));
            }
            Some(Err(err)) => {
                guard.take();
                return Err(self.fail(err));
            }
            None => {
                guard.take();
                return Err(ChannelError::Cancelled);
            }
        }

        // The message has started; from here only disposal interrupts.
        let mut in_flight = InFlight::new(self, "read", &mut *guard);
        let result = match in_flight.half.as_mut() {
            Some(reader) => tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => None,
                result = reader.read_message() => Some(result),
            },
            None => None,
        };
        in_flight.disarm();

        match result {
            Some(Ok(message)) => {
                trace!(channel = %self.name, size = message.len(), "message received");
                Ok(message)
            }
            Some(Err(err)) => {
                guard.take();
                Err(self.fail(err))
            }
            None => {
                guard.take();
                Err(ChannelError::Disconnected)
            }
        }
    }

    fn dispose(&self) {
        if self.close(ChannelState::LocallyClosed) {
            debug!(channel = %self.name, "channel disposed");
        }
        self.shutdown.cancel();
        self.release_stream();
    }

    fn on_disconnected(&self, handler: DisconnectHandler) -> bool {
        self.lifecycle.subscribe(handler)
    }

    async fn disconnected(&self) {
        self.lifecycle.disconnected().await;
    }
}

impl<S> Drop for StreamChannel<S> {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.lifecycle.close(ChannelState::LocallyClosed, || {});
    }
}

impl<S> std::fmt::Debug for StreamChannel<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamChannel")
            .field("name", &self.name)
            .field("state", &self.lifecycle.state())
            .finish()
    }
}
