use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use crate::event::SourceId;

/// A source's private work queue.
///
/// Appended to only by the dispatcher, drained only by the owning consumer.
pub(crate) struct SourceQueue<T> {
    items: Mutex<VecDeque<T>>,
}

impl<T> SourceQueue<T> {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            items: Mutex::new(VecDeque::new()),
        })
    }

    pub(crate) fn push(&self, item: T) {
        self.items.lock().push_back(item);
    }

    fn drain(&self) -> Vec<T> {
        let mut items = self.items.lock();
        items.drain(..).collect()
    }
}

/// Registry-side half of a registration: the shared queue plus the wake
/// sender. Dropping it disconnects the consumer's receiver, so a blocked
/// [`SourceHandle::wait_for_wake`] unblocks once the source is removed.
pub(crate) struct SourceParts<T> {
    queue: Arc<SourceQueue<T>>,
    wake: Sender<()>,
}

impl<T> SourceParts<T> {
    pub(crate) fn deliver(&self, item: T) {
        self.queue.push(item);
    }

    /// Signals the consumer that its queue has new items.
    ///
    /// The channel holds at most one pending wake; signalling while one is
    /// already pending is a no-op, which coalesces bursts.
    pub(crate) fn wake(&self) {
        let _ = self.wake.try_send(());
    }
}

/// Consumer side of a registered source, returned by [`Registry::add`].
///
/// The expected consumer loop is: block on [`wait_for_wake`], then
/// [`drain_queue`] and process the returned batch locally. A wake with an
/// empty queue is legal (two events can coalesce into one wake that a
/// previous drain already consumed), as is a single wake covering many
/// items.
///
/// [`Registry::add`]: crate::Registry::add
/// [`wait_for_wake`]: SourceHandle::wait_for_wake
/// [`drain_queue`]: SourceHandle::drain_queue
pub struct SourceHandle<T> {
    id: SourceId,
    queue: Arc<SourceQueue<T>>,
    wake_rx: Receiver<()>,
}

impl<T> SourceHandle<T> {
    pub fn id(&self) -> SourceId {
        self.id
    }

    /// Blocks until the dispatcher signals new work.
    ///
    /// Returns `false` once the source has been removed from the registry
    /// and no wake is pending, which is the consumer's cue to exit its loop.
    pub fn wait_for_wake(&self) -> bool {
        self.wake_rx.recv().is_ok()
    }

    /// Like [`wait_for_wake`](Self::wait_for_wake) with an upper bound on
    /// the wait. Returns `true` only if a wake arrived.
    pub fn wait_for_wake_timeout(&self, timeout: Duration) -> bool {
        match self.wake_rx.recv_timeout(timeout) {
            Ok(()) => true,
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Removes and returns everything currently queued, oldest first.
    pub fn drain_queue(&self) -> Vec<T> {
        self.queue.drain()
    }

    /// Whether the source has been removed from the registry.
    pub fn is_removed(&self) -> bool {
        // the registry entry holds the only other reference to the queue
        Arc::strong_count(&self.queue) == 1
    }
}

pub(crate) fn new_source<T>(id: SourceId) -> (SourceParts<T>, SourceHandle<T>) {
    let queue = SourceQueue::new();
    let (wake_tx, wake_rx) = bounded(1);

    let parts = SourceParts {
        queue: queue.clone(),
        wake: wake_tx,
    };
    let handle = SourceHandle { id, queue, wake_rx };
    (parts, handle)
}
