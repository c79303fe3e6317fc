use core::fmt;

/// Identifies a registered source. Unique while the source stays registered.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct SourceId(pub u64);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u64> for SourceId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Terminal status the hardware reported for a completion event.
///
/// Only [`EventStatus::Complete`] events are delivered; everything else is
/// dropped without notifying the consumer.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum EventStatus {
    Complete,
    Error,
    Cancelled,
}

/// Marker carried by events belonging to an in-progress flush.
///
/// While a flush is active (see [`Registry::begin_flush`]), events tagged
/// with the active value are suppressed instead of delivered.
///
/// [`Registry::begin_flush`]: crate::Registry::begin_flush
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct FlushTag(pub u64);

/// A single completion reported by the adapter.
///
/// Consumed exactly once by the dispatcher: either converted into a work item
/// (the `payload`) appended to the destination's queue, or dropped.
#[derive(Debug)]
pub struct CompletionEvent<T> {
    pub source: SourceId,
    pub status: EventStatus,
    pub flush: Option<FlushTag>,
    pub payload: T,
}

impl<T> CompletionEvent<T> {
    /// A successful, untagged completion.
    pub fn complete(source: SourceId, payload: T) -> Self {
        Self {
            source,
            status: EventStatus::Complete,
            flush: None,
            payload,
        }
    }
}
