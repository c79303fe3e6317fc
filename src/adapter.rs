use crate::event::CompletionEvent;
use std::io;

/// Boundary to the shared hardware event source.
///
/// One adapter instance exists per running dispatcher: it is created when the
/// first source registers, moved into the dispatcher thread, and dropped
/// there when the dispatcher exits after the last source is removed. It is
/// never reused across restarts.
pub trait EventSource: Send {
    /// Work item handed to a source's queue for each delivered event.
    type Item: Send;

    /// Handle registered with the dispatcher's poll for read readiness.
    ///
    /// Must refer to the same underlying descriptor for the adapter's whole
    /// lifetime. Hardware stacks exposing a raw event fd can wrap it in
    /// `mio::unix::SourceFd`.
    fn pollable(&mut self) -> &mut dyn mio::event::Source;

    /// Returns every event ready right now, without blocking.
    ///
    /// Called by the dispatcher whenever the pollable handle reports
    /// readable. An error abandons the current dispatch cycle but never
    /// stops the dispatcher.
    fn drain_ready(&mut self) -> io::Result<Vec<CompletionEvent<Self::Item>>>;
}
