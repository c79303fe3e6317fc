use mio::net::UnixStream;
use parking_lot::Mutex;
use std::io::{self, Read, Write};
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::adapter::EventSource;
use crate::event::CompletionEvent;

/// Scriptable stand-in for the hardware event source.
///
/// Tests inject events through [`MockState`]; readiness is signalled by
/// writing a byte across a socket pair, exactly like an event fd would.
/// The factory hands the registry a fresh adapter (and a fresh pair) per
/// dispatcher start, so restart behavior is observable.
pub(crate) struct MockState {
    tx: Mutex<Option<UnixStream>>,
    pending: Mutex<Vec<CompletionEvent<u32>>>,
    fail_next_drain: AtomicBool,
    fail_next_start: AtomicBool,
    starts: AtomicUsize,
    live: AtomicUsize,
}

impl MockState {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            tx: Mutex::new(None),
            pending: Mutex::new(Vec::new()),
            fail_next_drain: AtomicBool::new(false),
            fail_next_start: AtomicBool::new(false),
            starts: AtomicUsize::new(0),
            live: AtomicUsize::new(0),
        })
    }

    pub(crate) fn factory(
        self: &Arc<Self>,
    ) -> impl FnMut() -> io::Result<MockAdapter> + Send + 'static {
        let state = self.clone();
        move || {
            if state.fail_next_start.swap(false, Ordering::SeqCst) {
                return Err(io::Error::new(io::ErrorKind::Other, "injected start failure"));
            }
            let (rx, tx) = UnixStream::pair()?;
            *state.tx.lock() = Some(tx);
            state.starts.fetch_add(1, Ordering::SeqCst);
            state.live.fetch_add(1, Ordering::SeqCst);
            Ok(MockAdapter {
                rx,
                state: state.clone(),
            })
        }
    }

    /// Queues events and signals readiness, all visible to one drain.
    pub(crate) fn inject(&self, events: Vec<CompletionEvent<u32>>) {
        self.pending.lock().extend(events);
        self.signal();
    }

    fn signal(&self) {
        if let Some(tx) = self.tx.lock().as_mut() {
            let _ = tx.write(&[0]);
        }
    }

    /// The next drain fails once, leaving queued events for the drain after.
    pub(crate) fn fail_next_drain(&self) {
        self.fail_next_drain.store(true, Ordering::SeqCst);
        self.signal();
    }

    pub(crate) fn fail_next_start(&self) {
        self.fail_next_start.store(true, Ordering::SeqCst);
    }

    pub(crate) fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub(crate) fn adapter_alive(&self) -> bool {
        self.live.load(Ordering::SeqCst) > 0
    }
}

pub(crate) struct MockAdapter {
    rx: UnixStream,
    state: Arc<MockState>,
}

impl EventSource for MockAdapter {
    type Item = u32;

    fn pollable(&mut self) -> &mut dyn mio::event::Source {
        &mut self.rx
    }

    fn drain_ready(&mut self) -> io::Result<Vec<CompletionEvent<u32>>> {
        // consume the readiness bytes first so the next signal re-arms
        let mut buf = [0u8; 16];
        loop {
            match self.rx.read(&mut buf) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }

        if self.state.fail_next_drain.swap(false, Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "injected drain failure"));
        }
        Ok(mem::take(&mut *self.state.pending.lock()))
    }
}

impl Drop for MockAdapter {
    fn drop(&mut self) {
        self.state.live.fetch_sub(1, Ordering::SeqCst);
    }
}
