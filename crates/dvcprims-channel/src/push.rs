use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use dvcprims_frame::{frames, Reassembler, HEADER_SIZE};
use dvcprims_transport::NativeChannel;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use crate::channel::{ChannelConfig, ChannelState, MessageChannel};
use crate::error::{ChannelError, Result};
use crate::lifecycle::{DisconnectHandler, Lifecycle};
use crate::queue::PendingReadQueue;

/// A channel fed by native receive callbacks.
///
/// The native layer calls [`on_data_received`](Self::on_data_received) once
/// per arriving frame and [`on_close`](Self::on_close) when the peer goes
/// away. Outbound frames go straight to [`NativeChannel::write`].
pub struct CallbackChannel {
    name: String,
    config: ChannelConfig,
    native: Mutex<Option<Box<dyn NativeChannel>>>,
    reassembler: Mutex<Reassembler>,
    queue: PendingReadQueue,
    lifecycle: Lifecycle,
}

impl CallbackChannel {
    pub fn new(name: impl Into<String>, native: Box<dyn NativeChannel>) -> Self {
        Self::with_config(name, native, ChannelConfig::default())
    }

    pub fn with_config(
        name: impl Into<String>,
        native: Box<dyn NativeChannel>,
        config: ChannelConfig,
    ) -> Self {
        let reassembler = Reassembler::with_config(&config.frame);
        Self {
            name: name.into(),
            config,
            native: Mutex::new(Some(native)),
            reassembler: Mutex::new(reassembler),
            queue: PendingReadQueue::new(),
            lifecycle: Lifecycle::new(),
        }
    }

    /// Native receive callback: one complete frame, header included.
    ///
    /// A framing violation is logged and closes the channel as if the peer
    /// had disconnected; it never propagates to the caller.
    pub fn on_data_received(&self, frame: &[u8]) {
        if !self.lifecycle.is_open() {
            trace!(channel = %self.name, len = frame.len(), "frame ignored on closed channel");
            return;
        }

        let result = self.reassembler.lock().push_frame(frame);
        match result {
            Ok(Some(message)) => {
                trace!(channel = %self.name, size = message.len(), "message received");
                if let Err(err) = self.queue.deliver(message) {
                    debug!(channel = %self.name, error = %err, "message dropped");
                }
            }
            Ok(None) => {}
            Err(err) => {
                error!(channel = %self.name, error = %err, "reassembly failed, closing channel");
                self.close(ChannelState::RemoteClosed);
            }
        }
    }

    /// Native close callback. Safe to call more than once.
    pub fn on_close(&self) {
        if self.close(ChannelState::RemoteClosed) {
            debug!(channel = %self.name, "channel closed by peer");
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
            self.queue.dispose();
        })
    }

    fn release_native(&self) {
        let native = self.native.lock().take();
        if let Some(native) = native {
            debug!(channel = %self.name, "releasing native channel");
            native.close();
        }
    }

    fn write_frames(&self, native: &dyn NativeChannel, message: &[u8]) -> Result<usize> {
        let max = self.config.frame.max_frame_payload;
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + message.len().min(max));
        let mut count = 0usize;
        for (header, payload) in frames(message, max)? {
            buf.clear();
            header.encode(&mut buf);
            buf.put_slice(payload);
            native.write(&buf)?;
            count += 1;
        }
        Ok(count)
    }
}

#[async_trait]
impl MessageChannel for CallbackChannel {
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

        let result = {
            // Held across every frame so concurrent sends never interleave.
            let guard = self.native.lock();
            match guard.as_deref() {
                Some(native) => self.write_frames(native, message),
                None => Err(ChannelError::Disconnected),
            }
        };

        match result {
            Ok(count) => {
                trace!(channel = %self.name, size = message.len(), frames = count, "message sent");
                Ok(())
            }
            Err(ChannelError::Disconnected) => {
                self.close(ChannelState::RemoteClosed);
                Err(ChannelError::Disconnected)
            }
            Err(err) => Err(err),
        }
    }

    async fn read_message(&self, cancel: &CancellationToken) -> Result<Bytes> {
        if !self.lifecycle.is_open() {
            return Err(ChannelError::Disconnected);
        }
        match self.queue.request_read(cancel).await {
            Err(ChannelError::Disposed) => Err(ChannelError::Disconnected),
            other => other,
        }
    }

    fn dispose(&self) {
        if self.close(ChannelState::LocallyClosed) {
            debug!(channel = %self.name, "channel disposed");
        }
        self.release_native();
    }

    fn on_disconnected(&self, handler: DisconnectHandler) -> bool {
        self.lifecycle.subscribe(handler)
    }

    async fn disconnected(&self) {
        self.lifecycle.disconnected().await;
    }
}

impl Drop for CallbackChannel {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for CallbackChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackChannel")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use dvcprims_frame::{encode_frame, FrameFlags, FrameHeader};

    use super::*;
    use crate::test_support::RecordingNative;

    fn channel() -> (Arc<CallbackChannel>, Arc<crate::test_support::NativeLog>) {
        let (native, log) = RecordingNative::boxed();
        (Arc::new(CallbackChannel::new("TEST", native)), log)
    }

    async fn wait_for_pending(channel: &CallbackChannel) {
        while channel.queue.pending_len() == 0 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn send_writes_one_native_call_per_frame() {
        let (channel, log) = channel();
        channel.send_message(&vec![7u8; 5000]).await.unwrap();

        let frames = log.frames.lock();
        let layout: Vec<(FrameHeader, usize)> = frames
            .iter()
            .map(|f| (FrameHeader::decode(f).unwrap(), f.len() - HEADER_SIZE))
            .collect();
        assert_eq!(
            layout,
            vec![
                (FrameHeader::new(5000, FrameFlags::FIRST), 1600),
                (FrameHeader::new(1600, FrameFlags::empty()), 1600),
                (FrameHeader::new(1600, FrameFlags::empty()), 1600),
                (FrameHeader::new(200, FrameFlags::LAST), 200),
            ]
        );
    }

    #[tokio::test]
    async fn frames_from_one_channel_reassemble_on_another() {
        let (sender, log) = channel();
        let (receiver, _) = channel();
        let message: Vec<u8> = (0..5000u32).map(|i| (i * 7) as u8).collect();

        sender.send_message(&message).await.unwrap();
        sender.send_message(b"second").await.unwrap();
        for frame in log.frames.lock().iter() {
            receiver.on_data_received(frame);
        }

        let token = CancellationToken::new();
        assert_eq!(receiver.read_message(&token).await.unwrap().as_ref(), message.as_slice());
        assert_eq!(receiver.read_message(&token).await.unwrap().as_ref(), b"second");
    }

    #[tokio::test]
    async fn read_waits_for_callback() {
        let (channel, _) = channel();
        let reader = {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move { channel.read_message(&CancellationToken::new()).await })
        };
        wait_for_pending(&channel).await;

        let mut frame = BytesMut::new();
        encode_frame(b"hi", FrameFlags::ONLY, 2, &mut frame).unwrap();
        channel.on_data_received(&frame);

        assert_eq!(reader.await.unwrap().unwrap().as_ref(), b"hi");
    }

    #[tokio::test]
    async fn remote_close_is_idempotent() {
        let (channel, log) = channel();
        let notified = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&notified);
        assert!(channel.on_disconnected(Box::new(move |state| {
            assert_eq!(state, ChannelState::RemoteClosed);
            counter.fetch_add(1, Ordering::SeqCst);
        })));

        let reader = {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move { channel.read_message(&CancellationToken::new()).await })
        };
        wait_for_pending(&channel).await;

        channel.on_close();
        channel.on_close();

        assert_eq!(notified.load(Ordering::SeqCst), 1);
        assert!(matches!(reader.await.unwrap(), Err(ChannelError::Cancelled)));
        assert_eq!(channel.state(), ChannelState::RemoteClosed);
        assert!(matches!(
            channel.read_message(&CancellationToken::new()).await,
            Err(ChannelError::Disconnected)
        ));
        assert!(matches!(
            channel.send_message(b"late").await,
            Err(ChannelError::Disconnected)
        ));
        assert_eq!(log.close_count(), 0);

        channel.dispose();
        assert_eq!(log.close_count(), 1);
        assert_eq!(notified.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dispose_twice_releases_once() {
        let (channel, log) = channel();
        let notified = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&notified);
        channel.on_disconnected(Box::new(move |state| {
            assert_eq!(state, ChannelState::LocallyClosed);
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let reader = {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move { channel.read_message(&CancellationToken::new()).await })
        };
        wait_for_pending(&channel).await;

        channel.dispose();
        channel.dispose();

        assert_eq!(log.close_count(), 1);
        assert_eq!(notified.load(Ordering::SeqCst), 1);
        assert!(matches!(reader.await.unwrap(), Err(ChannelError::Cancelled)));
        assert!(matches!(
            channel.read_message(&CancellationToken::new()).await,
            Err(ChannelError::Disconnected)
        ));
        channel.disconnected().await;
    }

    #[tokio::test]
    async fn protocol_violation_closes_without_panicking() {
        let (channel, _) = channel();
        let notified = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&notified);
        channel.on_disconnected(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let mut frame = BytesMut::new();
        encode_frame(b"tail", FrameFlags::LAST, 4, &mut frame).unwrap();
        channel.on_data_received(&frame);
        channel.on_data_received(&frame);

        assert_eq!(channel.state(), ChannelState::RemoteClosed);
        assert_eq!(notified.load(Ordering::SeqCst), 1);
        assert!(matches!(
            channel.read_message(&CancellationToken::new()).await,
            Err(ChannelError::Disconnected)
        ));
    }

    #[tokio::test]
    async fn cancelled_read_leaves_later_messages_intact() {
        let (channel, _) = channel();
        let token = CancellationToken::new();
        token.cancel();
        assert!(matches!(
            channel.read_message(&token).await,
            Err(ChannelError::Cancelled)
        ));

        let mut frame = BytesMut::new();
        encode_frame(b"after", FrameFlags::ONLY, 5, &mut frame).unwrap();
        channel.on_data_received(&frame);
        assert_eq!(
            channel
                .read_message(&CancellationToken::new())
                .await
                .unwrap()
                .as_ref(),
            b"after"
        );
    }

    #[tokio::test]
    async fn broken_native_write_is_disconnect() {
        let (channel, log) = channel();
        log.broken.store(true, Ordering::SeqCst);

        let err = channel.send_message(b"x").await.unwrap_err();
        assert!(matches!(err, ChannelError::Disconnected));
        assert_eq!(channel.state(), ChannelState::RemoteClosed);
    }

    #[tokio::test]
    async fn oversized_send_is_rejected_before_writing() {
        let (native, log) = RecordingNative::boxed();
        let mut config = ChannelConfig::default();
        config.frame.max_message_size = 4;
        let channel = CallbackChannel::with_config("TEST", native, config);

        let err = channel.send_message(b"12345").await.unwrap_err();
        assert!(matches!(err, ChannelError::MessageTooLarge { size: 5, max: 4 }));
        assert!(log.frames.lock().is_empty());
        assert!(channel.is_open());
    }

    #[tokio::test]
    async fn handler_may_dispose_during_remote_close() {
        let (channel, log) = channel();
        let weak = Arc::downgrade(&channel);
        channel.on_disconnected(Box::new(move |_| {
            if let Some(channel) = weak.upgrade() {
                channel.dispose();
            }
        }));

        channel.on_close();
        assert_eq!(channel.state(), ChannelState::RemoteClosed);
        assert_eq!(log.close_count(), 1);
    }

    #[test]
    fn drop_releases_native_handle() {
        let (native, log) = RecordingNative::boxed();
        drop(CallbackChannel::new("TEST", native));
        assert_eq!(log.close_count(), 1);
    }
}
