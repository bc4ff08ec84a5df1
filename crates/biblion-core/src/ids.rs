//! Prefixed sequential id generation.
//!
//! Ids look like `B001`, `M014`, `T1203`: a one-letter entity prefix and a
//! numeric suffix, zero-padded to three digits and growing naturally beyond
//! 999. Counters are seeded from the store's highest existing suffix on
//! every resync, so ids survive restarts and external writes without
//! collisions.

use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonically increasing id sequence for one entity kind.
#[derive(Debug)]
pub struct IdSequence {
    prefix: char,
    next: AtomicU64,
}

impl IdSequence {
    pub fn new(prefix: char) -> Self {
        Self {
            prefix,
            next: AtomicU64::new(1),
        }
    }

    /// Re-seed so the next id comes after the given highest existing suffix.
    /// Never moves the counter backwards.
    pub fn seed(&self, max_existing: u64) {
        self.next.fetch_max(max_existing + 1, Ordering::SeqCst);
    }

    /// Produce the next id.
    pub fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        format!("{}{:03}", self.prefix, n)
    }
}

/// The three sequences used by the coordinator.
#[derive(Debug)]
pub struct IdRegistry {
    pub books: IdSequence,
    pub members: IdSequence,
    pub transactions: IdSequence,
}

impl IdRegistry {
    pub fn new() -> Self {
        Self {
            books: IdSequence::new('B'),
            members: IdSequence::new('M'),
            transactions: IdSequence::new('T'),
        }
    }
}

impl Default for IdRegistry {
    fn default() -> Self {
        Self::new()
    }
}
