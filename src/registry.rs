use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::adapter::EventSource;
use crate::dispatcher::{self, DispatcherHandle};
use crate::error::Error;
use crate::event::{FlushTag, SourceId};
use crate::source::{self, SourceHandle, SourceParts};

const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(200);
const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);
const DEFAULT_EVENTS_CAPACITY: usize = 64;

/// Configures and creates a [`Registry`].
pub struct Builder {
    poll_timeout: Duration,
    shutdown_grace: Duration,
    events_capacity: usize,
}

impl Builder {
    pub const fn new() -> Self {
        Self {
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            events_capacity: DEFAULT_EVENTS_CAPACITY,
        }
    }

    /// Upper bound on one poll wait. Also bounds how long a stop request can
    /// go unnoticed when the waker fails, and therefore the worst-case
    /// latency of removing the last source.
    pub fn poll_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.poll_timeout = timeout;
        self
    }

    /// How long `remove` of the last source waits for the dispatcher thread
    /// to exit before giving up with [`Error::ShutdownTimeout`].
    pub fn shutdown_grace(&mut self, grace: Duration) -> &mut Self {
        self.shutdown_grace = grace;
        self
    }

    /// Capacity of the readiness event buffer handed to the poller.
    pub fn events_capacity(&mut self, capacity: usize) -> &mut Self {
        self.events_capacity = capacity;
        self
    }

    /// Finishes the builder. `factory` constructs the shared adapter; it is
    /// invoked once per empty-to-non-empty transition of the registry.
    pub fn build<A, F>(&self, factory: F) -> Registry<A>
    where
        A: EventSource + 'static,
        F: FnMut() -> io::Result<A> + Send + 'static,
    {
        Registry {
            shared: Arc::new(Shared {
                running: AtomicBool::new(false),
                flush: Mutex::new(None),
                inner: Mutex::new(Inner {
                    entries: HashMap::new(),
                    dispatcher: None,
                }),
            }),
            factory: Mutex::new(Box::new(factory)),
            config: Config {
                poll_timeout: self.poll_timeout,
                shutdown_grace: self.shutdown_grace,
                events_capacity: self.events_capacity,
            },
        }
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) struct Config {
    pub(crate) poll_timeout: Duration,
    pub(crate) shutdown_grace: Duration,
    pub(crate) events_capacity: usize,
}

/// State shared between the registry front end and the dispatcher thread.
pub(crate) struct Shared<T> {
    /// True iff the registry is non-empty. Written only under the `inner`
    /// lock.
    pub(crate) running: AtomicBool,
    /// Active flush suppression tag, if a flush is in progress.
    pub(crate) flush: Mutex<Option<FlushTag>>,
    pub(crate) inner: Mutex<Inner<T>>,
}

pub(crate) struct Inner<T> {
    pub(crate) entries: HashMap<SourceId, SourceParts<T>>,
    pub(crate) dispatcher: Option<DispatcherHandle>,
}

/// The shared source registry: tracks active sources and drives the
/// dispatcher's start/stop lifecycle.
///
/// Registering the first source spawns the dispatcher thread; removing the
/// last one stops it and blocks until the thread has fully exited, so no
/// poller outlives the registration that kept it alive. Pass the registry
/// (e.g. behind an `Arc`) to everything that registers sources; it is not a
/// global.
pub struct Registry<A: EventSource> {
    shared: Arc<Shared<A::Item>>,
    #[allow(clippy::type_complexity)]
    factory: Mutex<Box<dyn FnMut() -> io::Result<A> + Send>>,
    config: Config,
}

impl<A> Registry<A>
where
    A: EventSource + 'static,
    A::Item: 'static,
{
    /// A registry with default timing; see [`Builder`] to tune it.
    pub fn new<F>(factory: F) -> Self
    where
        F: FnMut() -> io::Result<A> + Send + 'static,
    {
        Builder::new().build(factory)
    }

    /// Registers a source and returns the consumer-facing handle for it.
    ///
    /// If this is the first registration, the adapter is created and the
    /// dispatcher thread started before the registry lock is released, so
    /// the dispatcher can never observe an event for an id that was not yet
    /// registered.
    pub fn add(&self, id: SourceId) -> Result<SourceHandle<A::Item>, Error> {
        let mut inner = self.shared.inner.lock();
        if inner.entries.contains_key(&id) {
            return Err(Error::DuplicateSource(id));
        }

        let (parts, handle) = source::new_source(id);
        inner.entries.insert(id, parts);

        if inner.dispatcher.is_none() {
            let adapter = {
                let mut factory = self.factory.lock();
                (*factory)()
            };
            let adapter = match adapter {
                Ok(adapter) => adapter,
                Err(err) => {
                    inner.entries.remove(&id);
                    return Err(err.into());
                }
            };
            match dispatcher::start(adapter, self.shared.clone(), &self.config) {
                Ok(dispatcher) => {
                    inner.dispatcher = Some(dispatcher);
                    self.shared.running.store(true, Ordering::Release);
                }
                Err(err) => {
                    inner.entries.remove(&id);
                    return Err(err.into());
                }
            }
        }

        debug!(source = id.0, "source registered");
        Ok(handle)
    }

    /// Deregisters a source.
    ///
    /// For the last remaining source this blocks until the dispatcher thread
    /// has observed the stop and fully exited, dropping the adapter on the
    /// way out. After it returns, no further wake is delivered to anyone.
    pub fn remove(&self, id: SourceId) -> Result<(), Error> {
        let stopped = {
            let mut inner = self.shared.inner.lock();
            if inner.entries.remove(&id).is_none() {
                return Err(Error::UnknownSource(id));
            }
            if inner.entries.is_empty() {
                self.shared.running.store(false, Ordering::Release);
                inner.dispatcher.take()
            } else {
                None
            }
        };

        debug!(source = id.0, "source removed");
        match stopped {
            Some(dispatcher) => dispatcher.stop(self.config.shutdown_grace),
            None => Ok(()),
        }
    }

    /// Starts suppressing events tagged with `tag` until the returned guard
    /// is dropped. One flush at a time; a nested call replaces the tag.
    pub fn begin_flush(&self, tag: FlushTag) -> FlushGuard<'_> {
        *self.shared.flush.lock() = Some(tag);
        FlushGuard {
            slot: &self.shared.flush,
        }
    }

    /// True iff at least one source is registered (and therefore the
    /// dispatcher thread is running).
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.shared.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<A: EventSource> Drop for Registry<A> {
    fn drop(&mut self) {
        let stopped = {
            let mut inner = self.shared.inner.lock();
            self.shared.running.store(false, Ordering::Release);
            inner.entries.clear();
            inner.dispatcher.take()
        };
        if let Some(dispatcher) = stopped {
            let _ = dispatcher.stop(self.config.shutdown_grace);
        }
    }
}

/// Scoped flush suppression; clears the active tag on drop.
pub struct FlushGuard<'a> {
    slot: &'a Mutex<Option<FlushTag>>,
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        *self.slot.lock() = None;
    }
}
