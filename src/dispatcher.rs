use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use mio::{Events, Interest, Poll, Token, Waker};
use std::collections::HashSet;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, trace, warn};

use crate::adapter::EventSource;
use crate::error::Error;
use crate::event::EventStatus;
use crate::registry::{Config, Shared};

const ADAPTER: Token = Token(0);
const STOP: Token = Token(usize::MAX);

/// Registry-held handle to the running dispatcher thread.
///
/// The stop flag is per dispatcher, not the registry-wide `running` flag: a
/// stale thread from a just-emptied period must not keep polling because a
/// concurrent re-registration flipped `running` back on.
pub(crate) struct DispatcherHandle {
    active: Arc<AtomicBool>,
    waker: Waker,
    exit_rx: Receiver<()>,
    thread: JoinHandle<()>,
}

impl DispatcherHandle {
    /// Requests the stop and waits for the dispatcher thread to exit.
    ///
    /// The waker interrupts the bounded poll wait so the stop is seen
    /// immediately rather than at the next timeout. Exceeding `grace` leaves
    /// the thread detached and is reported as fatal.
    pub(crate) fn stop(self, grace: Duration) -> Result<(), Error> {
        self.active.store(false, Ordering::Release);
        let _ = self.waker.wake();
        match self.exit_rx.recv_timeout(grace) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                let _ = self.thread.join();
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => Err(Error::ShutdownTimeout(grace)),
        }
    }
}

/// Registers the adapter's pollable handle and spawns the dispatch loop.
///
/// Called under the registry lock on the empty-to-non-empty transition, so
/// at most one dispatcher thread exists at a time.
pub(crate) fn start<A>(
    mut adapter: A,
    shared: Arc<Shared<A::Item>>,
    config: &Config,
) -> io::Result<DispatcherHandle>
where
    A: EventSource + 'static,
    A::Item: 'static,
{
    let poll = Poll::new()?;
    let waker = Waker::new(poll.registry(), STOP)?;
    poll.registry()
        .register(adapter.pollable(), ADAPTER, Interest::READABLE)?;

    let (exit_tx, exit_rx) = bounded(1);
    let active = Arc::new(AtomicBool::new(true));
    let poll_timeout = config.poll_timeout;
    let events_capacity = config.events_capacity;

    let thread = {
        let active = active.clone();
        thread::Builder::new()
            .name("camlink-dispatcher".into())
            .spawn(move || {
                run(adapter, shared, poll, active, poll_timeout, events_capacity);
                let _ = exit_tx.send(());
            })?
    };

    Ok(DispatcherHandle {
        active,
        waker,
        exit_rx,
        thread,
    })
}

fn run<A: EventSource>(
    mut adapter: A,
    shared: Arc<Shared<A::Item>>,
    mut poll: Poll,
    active: Arc<AtomicBool>,
    poll_timeout: Duration,
    events_capacity: usize,
) {
    debug!("dispatcher started");
    let mut events = Events::with_capacity(events_capacity);

    while active.load(Ordering::Acquire) {
        if let Err(err) = poll.poll(&mut events, Some(poll_timeout)) {
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            warn!(error = %err, "poll failed");
            thread::sleep(poll_timeout);
            continue;
        }

        // a stop requested mid-wait takes effect before any further routing
        if !active.load(Ordering::Acquire) {
            break;
        }

        if events.iter().any(|event| event.token() == ADAPTER) {
            dispatch_cycle(&mut adapter, &shared);
        }
    }

    let _ = poll.registry().deregister(adapter.pollable());
    // sole place the shared adapter resource is released
    drop(adapter);
    debug!("dispatcher stopped");
}

/// Drains everything the adapter has ready and routes it.
///
/// Runs under the registry lock so a concurrent `remove` cannot delete a
/// destination mid-dispatch. Queue locks are only ever taken nested inside
/// the registry lock, one at a time.
fn dispatch_cycle<A: EventSource>(adapter: &mut A, shared: &Shared<A::Item>) {
    let inner = shared.inner.lock();
    let flush = *shared.flush.lock();

    let drained = match adapter.drain_ready() {
        Ok(drained) => drained,
        Err(err) => {
            warn!(error = %err, "event drain failed, cycle abandoned");
            return;
        }
    };

    let mut touched = HashSet::new();
    for event in drained {
        if event.status != EventStatus::Complete {
            trace!(source = event.source.0, status = ?event.status, "event dropped");
            continue;
        }
        if let (Some(active), Some(tag)) = (flush, event.flush) {
            if active == tag {
                trace!(source = event.source.0, "event suppressed by active flush");
                continue;
            }
        }
        match inner.entries.get(&event.source) {
            Some(entry) => {
                entry.deliver(event.payload);
                touched.insert(event.source);
            }
            // raced a remove, or the adapter reported an id never registered
            None => trace!(source = event.source.0, "event for unknown source dropped"),
        }
    }

    // one wake per destination per cycle, however many events it received
    for id in touched {
        if let Some(entry) = inner.entries.get(&id) {
            entry.wake();
        }
    }
}
