//! Shared counter for consumer-side accounting

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Concurrency-safe accumulator
///
/// Clones share the same cell, so a counter can be handed to every consumer
/// (typically captured by the page processor) and read by the caller once
/// the traversal has finished. Updates are single atomic read-modify-write
/// operations and are never lost.
#[derive(Debug, Clone, Default)]
pub struct SharedCounter {
    value: Arc<AtomicI64>,
}

impl SharedCounter {
    /// Create a counter starting at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one and return the new value
    pub fn increment(&self) -> i64 {
        self.add(1)
    }

    /// Subtract one and return the new value
    pub fn decrement(&self) -> i64 {
        self.add(-1)
    }

    /// Add `delta` and return the new value
    pub fn add(&self, delta: i64) -> i64 {
        self.value.fetch_add(delta, Ordering::AcqRel) + delta
    }

    /// Current value
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Acquire)
    }
}
