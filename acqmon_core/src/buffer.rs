//! Fixed-capacity sample storage written by exactly one worker thread.

use std::sync::atomic::{AtomicU64, Ordering};

/// Slots hold `f64` bit patterns in atomics so readers never block and never
/// observe a torn value. Cross-slot ordering comes from the session's
/// `last_index` counter, which is published after the slot write.
#[derive(Debug)]
pub struct SampleBuffer {
    slots: Box<[AtomicU64]>,
}

impl SampleBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| AtomicU64::new(0f64.to_bits())).collect(),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<f64> {
        self.slots
            .get(index)
            .map(|s| f64::from_bits(s.load(Ordering::Relaxed)))
    }

    /// Copy of the first `len` slots (clamped to capacity).
    pub fn prefix(&self, len: usize) -> Vec<f64> {
        self.slots[..len.min(self.slots.len())]
            .iter()
            .map(|s| f64::from_bits(s.load(Ordering::Relaxed)))
            .collect()
    }

    /// Copy of every slot.
    pub fn snapshot(&self) -> Vec<f64> {
        self.prefix(self.slots.len())
    }

    pub(crate) fn set(&self, index: usize, value: f64) {
        if let Some(s) = self.slots.get(index) {
            s.store(value.to_bits(), Ordering::Relaxed);
        }
    }

    pub(crate) fn zero(&self) {
        for s in self.slots.iter() {
            s.store(0f64.to_bits(), Ordering::Relaxed);
        }
    }
}
