use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::{Mutex, ReentrantMutex};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::channel::ChannelState;

/// Callback run once when a channel leaves [`ChannelState::Open`].
pub type DisconnectHandler = Box<dyn FnOnce(ChannelState) + Send + 'static>;

/// Open/closed state plus the one-shot disconnect notification.
///
/// The transition and teardown run under a reentrant gate, so a concurrent
/// `close` returns only once teardown is done. Handlers run after the gate is
/// released: the call that closed the channel returns once every handler has
/// finished, and a handler may close or dispose the channel from any thread.
pub(crate) struct Lifecycle {
    state: AtomicU8,
    gate: ReentrantMutex<()>,
    handlers: Mutex<Vec<DisconnectHandler>>,
    disconnected: CancellationToken,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(ChannelState::Open as u8),
            gate: ReentrantMutex::new(()),
            handlers: Mutex::new(Vec::new()),
            disconnected: CancellationToken::new(),
        }
    }

    pub(crate) fn state(&self) -> ChannelState {
        ChannelState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn is_open(&self) -> bool {
        self.state() == ChannelState::Open
    }

    /// Leave `Open` for `to`, run `teardown`, then notify.
    ///
    /// Returns `false` without doing anything if the channel was not open.
    pub(crate) fn close(&self, to: ChannelState, teardown: impl FnOnce()) -> bool {
        let gate = self.gate.lock();
        if self
            .state
            .compare_exchange(
                ChannelState::Open as u8,
                to as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return false;
        }

        debug!(state = ?to, "channel closing");
        teardown();
        self.disconnected.cancel();
        let handlers = std::mem::take(&mut *self.handlers.lock());
        drop(gate);

        for handler in handlers {
            handler(to);
        }
        true
    }

    /// Register `handler`. Returns `false` if the channel is already closed,
    /// in which case the handler is dropped without running.
    pub(crate) fn subscribe(&self, handler: DisconnectHandler) -> bool {
        let mut handlers = self.handlers.lock();
        if !self.is_open() {
            return false;
        }
        handlers.push(handler);
        true
    }

    /// Resolves once the channel has left `Open`.
    pub(crate) async fn disconnected(&self) {
        self.disconnected.cancelled().await;
    }

    pub(crate) fn disconnect_token(&self) -> CancellationToken {
        self.disconnected.clone()
    }
}
