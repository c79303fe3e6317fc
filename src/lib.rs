//! Single-poller, multi-consumer completion event dispatch.
//!
//! One background thread multiplexes completion events arriving from any
//! number of independently registered sources (cameras), routes each event to
//! the private queue of the source that produced it, and wakes that source's
//! consumer through an out-of-band channel. The poller starts when the first
//! source registers and stops, with a blocking join, when the last one is
//! removed.
//!
//! The hardware side sits behind [`EventSource`]: a pollable handle plus a
//! non-blocking "drain everything ready now" call. Consumers interact only
//! through their [`SourceHandle`] and never contend with each other.

#![forbid(unsafe_code)]

mod adapter;
mod dispatcher;
mod error;
mod event;
mod registry;
mod source;

#[cfg(test)]
pub(crate) mod test_util;

pub use adapter::EventSource;
pub use error::Error;
pub use event::{CompletionEvent, EventStatus, FlushTag, SourceId};
pub use registry::{Builder, FlushGuard, Registry};
pub use source::SourceHandle;
