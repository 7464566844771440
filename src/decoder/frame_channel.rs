//! Single-slot hand-off between the frame producer and the render side
//!
//! The channel holds at most one item. `send` blocks while the slot is
//! occupied, which bounds decoding to one frame ahead of the consumer.
//! Receivers can poll (`try_recv`), block (`recv_blocking`) or await
//! (`recv`).
//!
//! Two ways to end a channel:
//! - `close()` is the shutdown signal. Any queued item is passed to the
//!   disposer, blocked senders get their item back in a [`SendError`] and
//!   blocked receivers see [`RecvError`].
//! - `seal()` marks end of stream. A queued item is still delivered, then
//!   receivers see [`RecvError`].

use parking_lot::{Condvar, Mutex};
use std::fmt;
use tokio::sync::Notify;

/// Returned by `send` on a closed or sealed channel; carries the rejected item
pub struct SendError<T>(pub T);

impl<T> fmt::Debug for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SendError(..)")
    }
}

impl<T> fmt::Display for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("sending on a closed frame channel")
    }
}

/// No item will ever arrive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecvError;

impl fmt::Display for RecvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("receiving on a closed frame channel")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryRecvError {
    /// Nothing queued right now
    Empty,
    /// Closed, or sealed and drained
    Closed,
}

struct ChannelState<T> {
    slot: Option<T>,
    sealed: bool,
    closed: bool,
}

/// Capacity-1 channel with a disposal hook for undelivered items
pub struct FrameChannel<T> {
    state: Mutex<ChannelState<T>>,
    /// Signalled when the slot empties or the channel ends
    space_available: Condvar,
    /// Signalled when an item arrives or the channel ends
    item_available: Condvar,
    /// Async counterpart of `item_available`
    item_notify: Notify,
    disposer: Box<dyn Fn(T) + Send + Sync>,
}

impl<T> FrameChannel<T> {
    /// Create an open channel. `disposer` receives every item that is still
    /// queued when the channel is closed or dropped.
    pub fn new(disposer: impl Fn(T) + Send + Sync + 'static) -> Self {
        Self {
            state: Mutex::new(ChannelState {
                slot: None,
                sealed: false,
                closed: false,
            }),
            space_available: Condvar::new(),
            item_available: Condvar::new(),
            item_notify: Notify::new(),
            disposer: Box::new(disposer),
        }
    }

    /// Enqueue an item, blocking while the slot is occupied
    pub fn send(&self, item: T) -> Result<(), SendError<T>> {
        self.enqueue(item, false)
    }

    /// Enqueue the final item and seal the channel in one step
    pub fn send_last(&self, item: T) -> Result<(), SendError<T>> {
        self.enqueue(item, true)
    }

    fn enqueue(&self, item: T, seal: bool) -> Result<(), SendError<T>> {
        let mut state = self.state.lock();
        while state.slot.is_some() && !state.closed && !state.sealed {
            self.space_available.wait(&mut state);
        }
        if state.closed || state.sealed {
            return Err(SendError(item));
        }
        state.slot = Some(item);
        state.sealed = seal;
        drop(state);

        self.item_available.notify_one();
        self.item_notify.notify_one();
        Ok(())
    }

    /// Take the queued item without blocking
    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        let mut state = self.state.lock();
        self.take(&mut state)
    }

    /// Block the calling thread until an item arrives or the channel ends
    pub fn recv_blocking(&self) -> Result<T, RecvError> {
        let mut state = self.state.lock();
        loop {
            match self.take(&mut state) {
                Ok(item) => return Ok(item),
                Err(TryRecvError::Closed) => return Err(RecvError),
                Err(TryRecvError::Empty) => self.item_available.wait(&mut state),
            }
        }
    }

    /// Wait asynchronously until an item arrives or the channel ends
    pub async fn recv(&self) -> Result<T, RecvError> {
        loop {
            let notified = self.item_notify.notified();
            tokio::pin!(notified);
            // Register before checking so a send in between is not missed.
            notified.as_mut().enable();

            match self.try_recv() {
                Ok(item) => return Ok(item),
                Err(TryRecvError::Closed) => return Err(RecvError),
                Err(TryRecvError::Empty) => notified.await,
            }
        }
    }

    fn take(&self, state: &mut ChannelState<T>) -> Result<T, TryRecvError> {
        if state.closed {
            return Err(TryRecvError::Closed);
        }
        match state.slot.take() {
            Some(item) => {
                self.space_available.notify_one();
                Ok(item)
            }
            None if state.sealed => Err(TryRecvError::Closed),
            None => Err(TryRecvError::Empty),
        }
    }

    /// Mark end of stream. The queued item, if any, stays deliverable.
    pub fn seal(&self) {
        let mut state = self.state.lock();
        if state.sealed || state.closed {
            return;
        }
        state.sealed = true;
        drop(state);
        self.wake_all();
    }

    /// Shut the channel down, disposing of any queued item. Idempotent.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        let leftover = state.slot.take();
        drop(state);

        self.wake_all();
        if let Some(item) = leftover {
            log::debug!("Disposing undelivered item on close");
            (self.disposer)(item);
        }
    }

    /// Route an item through the disposer
    pub fn dispose(&self, item: T) {
        (self.disposer)(item);
    }

    /// Nothing queued and nothing more will be sent
    pub fn is_drained(&self) -> bool {
        let state = self.state.lock();
        state.closed || (state.sealed && state.slot.is_none())
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of queued items (0 or 1)
    pub fn len(&self) -> usize {
        usize::from(self.state.lock().slot.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn wake_all(&self) {
        self.space_available.notify_all();
        self.item_available.notify_all();
        self.item_notify.notify_waiters();
    }
}

impl<T> Drop for FrameChannel<T> {
    fn drop(&mut self) {
        if let Some(item) = self.state.get_mut().slot.take() {
            (self.disposer)(item);
        }
    }
}
