//! Structured operation events.
//!
//! The original tool accumulated human-readable log lines on the engine
//! object itself; here progress is pushed through a caller-supplied sink so
//! that concurrent operations on different files need no shared mutable
//! state. Events are informational only and never affect security or
//! correctness.

use std::sync::Mutex;

/// A progress notification emitted during a long-running operation.
#[derive(Debug, Clone, PartialEq)]
pub enum VaultEvent {
    /// Passphrase generation progress, emitted every 1000 lines and once
    /// at completion.
    LinesGenerated { done: usize, total: usize },
    /// The payload was compressed before encryption.
    Compressed { original: u64, compressed: u64 },
    /// One secure-erase overwrite pass finished.
    ErasePass { pass: u32, total: u32 },
    /// A file was added to a directory archive.
    FileArchived { entry: String },
}

/// Receiver for [`VaultEvent`]s.
///
/// Implementations must be cheap: sinks are called from the middle of
/// encryption loops. A sink shared between threads must synchronize
/// internally (see [`MemorySink`]).
pub trait EventSink {
    fn emit(&self, event: VaultEvent);
}

/// Discards all events.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: VaultEvent) {}
}

/// Buffers events in memory, mostly useful in tests and for callers that
/// render progress after the fact.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<VaultEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drains and returns all events received so far.
    pub fn take(&self) -> Vec<VaultEvent> {
        std::mem::take(&mut *self.events.lock().expect("event sink poisoned"))
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: VaultEvent) {
        self.events.lock().expect("event sink poisoned").push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_buffers_and_drains() {
        let sink = MemorySink::new();
        sink.emit(VaultEvent::LinesGenerated { done: 1000, total: 2000 });
        sink.emit(VaultEvent::ErasePass { pass: 1, total: 3 });

        let events = sink.take();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], VaultEvent::LinesGenerated { done: 1000, total: 2000 });
        assert!(sink.take().is_empty());
    }

    #[test]
    fn null_sink_accepts_everything() {
        NullSink.emit(VaultEvent::Compressed { original: 10, compressed: 5 });
    }
}
