use crate::event::SourceId;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by registry lifecycle operations.
///
/// Dispatcher-internal failures (a bad drain, a malformed event) never show
/// up here: they degrade delivery for the affected cycle and nothing else.
#[derive(Debug, Error)]
pub enum Error {
    /// The id is already registered.
    #[error("source {0} is already registered")]
    DuplicateSource(SourceId),

    /// The id is not currently registered.
    #[error("source {0} is not registered")]
    UnknownSource(SourceId),

    /// The dispatcher thread did not exit within the shutdown grace period.
    ///
    /// Should not happen with a well-behaved adapter; the thread is left
    /// detached and the caller has to treat the process as wedged.
    #[error("dispatcher did not stop within {0:?}")]
    ShutdownTimeout(Duration),

    /// Creating the adapter or the poller failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}
