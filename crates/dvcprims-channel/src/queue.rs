use std::collections::VecDeque;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::{ChannelError, Result};

/// Matches "next message" requests against messages that arrive before or
/// after anyone asks for them.
///
/// One lock guards both the buffered messages and the pending reads. A pending
/// read is completed only after it has been removed from the queue under that
/// lock, and the completion itself happens outside it, so each read resolves
/// exactly once and no consumer code runs while the lock is held.
#[derive(Default)]
pub struct PendingReadQueue {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    buffered: VecDeque<Bytes>,
    pending: VecDeque<PendingRead>,
    next_id: u64,
    disposed: bool,
}

struct PendingRead {
    id: u64,
    slot: oneshot::Sender<Bytes>,
}

impl PendingReadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the next message.
    ///
    /// A buffered message is returned without suspending. Otherwise the read
    /// waits for [`deliver`](Self::deliver), for `cancel`, or for
    /// [`dispose`](Self::dispose); the last two end it with
    /// [`ChannelError::Cancelled`]. Dropping the returned future withdraws
    /// the read; a message already handed to it goes back to the front of
    /// the buffer.
    pub async fn request_read(&self, cancel: &CancellationToken) -> Result<Bytes> {
        let (id, slot) = {
            let mut inner = self.inner.lock();
            if inner.disposed {
                return Err(ChannelError::Disposed);
            }
            if let Some(message) = inner.buffered.pop_front() {
                return Ok(message);
            }
            if cancel.is_cancelled() {
                return Err(ChannelError::Cancelled);
            }
            let id = inner.next_id;
            inner.next_id += 1;
            let (tx, rx) = oneshot::channel();
            inner.pending.push_back(PendingRead { id, slot: tx });
            (id, rx)
        };

        let mut withdraw = Withdraw {
            queue: self,
            id,
            slot,
            armed: true,
        };

        let result = tokio::select! {
            biased;
            delivered = &mut withdraw.slot => delivered.map_err(|_| ChannelError::Cancelled),
            _ = cancel.cancelled() => {
                if self.remove(id) {
                    trace!(id, "pending read cancelled");
                    Err(ChannelError::Cancelled)
                } else {
                    // Already claimed by `deliver` or `dispose`; take its outcome.
                    (&mut withdraw.slot).await.map_err(|_| ChannelError::Cancelled)
                }
            }
        };
        withdraw.armed = false;
        result
    }

    /// Hand `message` to the oldest pending read, or buffer it.
    ///
    /// Fails with [`ChannelError::Disposed`] once the queue is disposed; the
    /// message is dropped.
    pub fn deliver(&self, message: Bytes) -> Result<()> {
        let mut message = message;
        loop {
            let waiter = {
                let mut inner = self.inner.lock();
                if inner.disposed {
                    return Err(ChannelError::Disposed);
                }
                match inner.pending.pop_front() {
                    Some(waiter) => waiter,
                    None => {
                        inner.buffered.push_back(message);
                        return Ok(());
                    }
                }
            };

            match waiter.slot.send(message) {
                Ok(()) => return Ok(()),
                // The reader went away between removal and completion.
                Err(returned) => message = returned,
            }
        }
    }

    /// Cancel every pending read and reject all later calls.
    ///
    /// Returns `false` if the queue was already disposed.
    pub fn dispose(&self) -> bool {
        let (pending, buffered) = {
            let mut inner = self.inner.lock();
            if inner.disposed {
                return false;
            }
            inner.disposed = true;
            (
                std::mem::take(&mut inner.pending),
                std::mem::take(&mut inner.buffered),
            )
        };
        trace!(
            pending = pending.len(),
            dropped = buffered.len(),
            "pending-read queue disposed"
        );
        // Dropping each sender completes its read as cancelled.
        drop(pending);
        true
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.lock().disposed
    }

    /// Messages waiting for a reader.
    pub fn buffered_len(&self) -> usize {
        self.inner.lock().buffered.len()
    }

    /// Reads waiting for a message.
    pub fn pending_len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    fn remove(&self, id: u64) -> bool {
        let removed = {
            let mut inner = self.inner.lock();
            inner
                .pending
                .iter()
                .position(|read| read.id == id)
                .and_then(|index| inner.pending.remove(index))
        };
        removed.is_some()
    }

    /// Put back a message whose reader went away after it was handed over.
    fn requeue(&self, message: Bytes) {
        let mut inner = self.inner.lock();
        if inner.disposed {
            return;
        }
        inner.buffered.push_front(message);
    }
}

/// Withdraws an abandoned read. A message already sent to it goes back to the
/// front of the queue.
struct Withdraw<'a> {
    queue: &'a PendingReadQueue,
    id: u64,
    slot: oneshot::Receiver<Bytes>,
    armed: bool,
}

impl Drop for Withdraw<'_> {
    fn drop(&mut self) {
        if !self.armed || self.queue.remove(self.id) {
            return;
        }
        // `deliver` claimed this read. If its send has not landed yet, the
        // send fails once `slot` drops and `deliver` retries elsewhere.
        self.slot.close();
        if let Ok(message) = self.slot.try_recv() {
            trace!(id = self.id, "abandoned read returned its message");
            self.queue.requeue(message);
        }
    }
}
