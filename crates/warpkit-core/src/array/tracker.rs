//! Allocation accounting for array construction sites.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Counts the arrays and elements created by the grid generator and the
/// resampler.
///
/// A tracker is passed explicitly to the sites that allocate; share one
/// across threads through an `Arc`.
#[derive(Debug, Default)]
pub struct AllocationTracker {
    allocations: AtomicUsize,
    elements: AtomicUsize,
    peak_elements: AtomicUsize,
}

impl AllocationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one allocation of `elements` values.
    pub fn record(&self, elements: usize) {
        self.allocations.fetch_add(1, Ordering::Relaxed);
        self.elements.fetch_add(elements, Ordering::Relaxed);
        self.peak_elements.fetch_max(elements, Ordering::Relaxed);
    }

    /// Number of allocations recorded so far.
    pub fn allocations(&self) -> usize {
        self.allocations.load(Ordering::Relaxed)
    }

    /// Total number of elements allocated so far.
    pub fn elements(&self) -> usize {
        self.elements.load(Ordering::Relaxed)
    }

    /// Largest single allocation, in elements.
    pub fn peak_elements(&self) -> usize {
        self.peak_elements.load(Ordering::Relaxed)
    }

    /// Forget everything recorded so far.
    pub fn reset(&self) {
        self.allocations.store(0, Ordering::Relaxed);
        self.elements.store(0, Ordering::Relaxed);
        self.peak_elements.store(0, Ordering::Relaxed);
    }
}
