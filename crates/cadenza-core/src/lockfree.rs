//! Lock-free primitives shared between the audio thread and control threads.

use std::sync::atomic::Ordering;

use atomic_float::AtomicF64;

/// Cache-line aligned atomic f64.
#[derive(Debug)]
#[repr(align(64))]
pub struct AtomicValue {
    value: AtomicF64,
}

impl AtomicValue {
    pub fn new(value: f64) -> Self {
        Self {
            value: AtomicF64::new(value),
        }
    }

    #[inline]
    pub fn get(&self) -> f64 {
        self.value.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set(&self, value: f64) {
        self.value.store(value, Ordering::Release);
    }

    #[inline]
    pub fn swap(&self, value: f64) -> f64 {
        self.value.swap(value, Ordering::AcqRel)
    }
}

impl Clone for AtomicValue {
    fn clone(&self) -> Self {
        Self::new(self.get())
    }
}

impl Default for AtomicValue {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// Per-parameter shadow copies, readable from any thread without touching the audio thread.
///
/// The table has a fixed length; a patch swap publishes a new table instead of resizing.
#[derive(Debug, Default)]
pub struct ShadowValues {
    values: Box<[AtomicValue]>,
}

impl ShadowValues {
    pub fn new(initial: impl IntoIterator<Item = f64>) -> Self {
        Self {
            values: initial.into_iter().map(AtomicValue::new).collect(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<f64> {
        self.values.get(index).map(AtomicValue::get)
    }

    /// Returns `false` if `index` is out of range.
    #[inline]
    pub fn set(&self, index: usize, value: f64) -> bool {
        match self.values.get(index) {
            Some(slot) => {
                slot.set(value);
                true
            }
            None => false,
        }
    }
}
