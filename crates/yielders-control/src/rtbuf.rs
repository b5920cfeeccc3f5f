//! Single-slot mailbox between the non-real-time and real-time contexts.
//!
//! A [`RealtimeBuffer`] holds the most recently published value as an
//! atomically swapped immutable snapshot. The writer allocates on its own
//! (non-real-time) side; the reader's load is wait-free and allocation
//! free (a reference-count bump), never observes a partial write, and
//! never blocks. A value overwritten before being read is dropped by
//! design: only the latest command matters.

use std::sync::Arc;

use arc_swap::ArcSwapOption;

/// Most-recent-value mailbox with a non-blocking, lock-free read path.
///
/// Multiple writers to one buffer must be serialized externally; reads may
/// come from any number of threads.
#[derive(Debug, Default)]
pub struct RealtimeBuffer<T> {
    slot: ArcSwapOption<T>,
}

impl<T> RealtimeBuffer<T> {
    /// Create an empty buffer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slot: ArcSwapOption::const_empty(),
        }
    }

    /// Create a buffer holding an initial value.
    #[must_use]
    pub fn with_initial(value: T) -> Self {
        Self {
            slot: ArcSwapOption::from(Some(Arc::new(value))),
        }
    }

    /// Publish a value from the non-real-time side, atomically replacing
    /// the held snapshot. The previous snapshot is dropped once its last
    /// reader releases it.
    pub fn write(&self, value: T) {
        self.slot.store(Some(Arc::new(value)));
    }

    /// Read the most recently completed write from the real-time side.
    ///
    /// Wait-free and allocation free; returns `None` when nothing has been
    /// published yet (or after [`clear`](Self::clear)).
    #[must_use]
    pub fn read(&self) -> Option<Arc<T>> {
        self.slot.load_full()
    }

    /// Empty the slot.
    pub fn clear(&self) {
        self.slot.store(None);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
