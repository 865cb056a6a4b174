//! Lock-free progress counters.
//!
//! A reader that observes a value published with [`AtomicCounter::write`] or
//! one of the read-modify-write operations also observes every memory write
//! the publishing thread made before it (release on write, acquire on read).
//! Slot data written before the counter moves is therefore visible to any
//! thread that sees the new count.
use std::sync::atomic::{AtomicI32, Ordering, fence};

#[derive(Debug, Default)]
pub struct AtomicCounter(AtomicI32);

impl AtomicCounter {
    pub const fn new(v: i32) -> Self {
        Self(AtomicI32::new(v))
    }

    #[inline]
    pub fn read(&self) -> i32 {
        self.0.load(Ordering::Acquire)
    }

    #[inline]
    pub fn write(&self, v: i32) {
        self.0.store(v, Ordering::Release);
    }

    /// Add one and return the new value (wraps on overflow).
    #[inline]
    pub fn increment(&self) -> i32 {
        self.0.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
    }

    /// Subtract one and return the new value (wraps on overflow).
    #[inline]
    pub fn decrement(&self) -> i32 {
        self.0.fetch_sub(1, Ordering::AcqRel).wrapping_sub(1)
    }

    /// Full sequentially-consistent fence.
    #[inline]
    pub fn memory_fence(&self) {
        fence(Ordering::SeqCst);
    }
}
