//! Fixed-capacity ring buffer of events, used as an immutable value.

use std::num::NonZeroUsize;
use std::sync::Arc;

use crate::event::Event;

/// A fixed-capacity buffer that overwrites its oldest event once full.
///
/// Every operation returns a new buffer and leaves `self` untouched. Slots
/// hold `Arc<Event>`, so a push copies pointers rather than events.
///
/// Invariants: `size <= capacity` and `write_index < capacity`.
#[derive(Debug, Clone, PartialEq)]
pub struct RingBuffer {
    slots: Vec<Option<Arc<Event>>>,
    write_index: usize,
    size: usize,
}

impl RingBuffer {
    /// Creates an empty buffer with `capacity` slots.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            slots: vec![None; capacity.get()],
            write_index: 0,
            size: 0,
        }
    }

    /// Returns a buffer with `event` written at the write index.
    ///
    /// When full, the chronologically oldest event is evicted.
    #[must_use]
    pub fn push(&self, event: impl Into<Arc<Event>>) -> Self {
        let capacity = self.capacity();
        let mut slots = self.slots.clone();
        slots[self.write_index] = Some(event.into());
        Self {
            slots,
            write_index: (self.write_index + 1) % capacity,
            size: (self.size + 1).min(capacity),
        }
    }

    /// Retained events, oldest first.
    pub fn to_vec(&self) -> Vec<Arc<Event>> {
        let (tail, head) = if self.size < self.capacity() {
            (&self.slots[..self.size], &[][..])
        } else {
            let (head, tail) = self.slots.split_at(self.write_index);
            (tail, head)
        };
        tail.iter().chain(head).flatten().cloned().collect()
    }

    /// Returns an empty buffer with the same capacity.
    #[must_use]
    pub fn cleared(&self) -> Self {
        Self {
            slots: vec![None; self.slots.len()],
            write_index: 0,
            size: 0,
        }
    }

    pub const fn len(&self) -> usize {
        self.size
    }

    pub const fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub const fn write_index(&self) -> usize {
        self.write_index
    }
}
