//! The latest window mean, shared between the aggregator and the reporter.
//!
//! One value behind one guard. The aggregator is the only writer
//! ([`AverageWriter`] is not `Clone`); any number of [`AverageReader`]s may copy
//! it out. Both sides hold the guard only long enough to copy a
//! [`AverageSnapshot`], and never across an `.await`.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::hardware::Sample;

/// Guarded contents: the value and the window that produced it.
///
/// `window` is 0 until the first mean is published, so a reader can tell the
/// startup value apart from a real mean of 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AverageSnapshot {
    /// Latest window mean (0 at startup)
    pub value: Sample,
    /// Number of windows published so far
    pub window: u64,
}

/// The shared average before it is split into its writer and readers.
#[derive(Debug, Default)]
pub struct SharedAverage {
    cell: Arc<Mutex<AverageSnapshot>>,
}

impl SharedAverage {
    /// Create the shared value, initialised to 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Split into the single writer and a first reader.
    pub fn split(self) -> (AverageWriter, AverageReader) {
        (
            AverageWriter {
                cell: Arc::clone(&self.cell),
            },
            AverageReader { cell: self.cell },
        )
    }
}

/// Write access, owned by the aggregator.
#[derive(Debug)]
pub struct AverageWriter {
    cell: Arc<Mutex<AverageSnapshot>>,
}

impl AverageWriter {
    /// Overwrite the average with `value` and bump the window counter.
    pub fn publish(&mut self, value: Sample) -> AverageSnapshot {
        let mut guard = self.cell.lock();
        guard.value = value;
        guard.window += 1;
        *guard
    }

    /// Another read handle on the same value.
    pub fn reader(&self) -> AverageReader {
        AverageReader {
            cell: Arc::clone(&self.cell),
        }
    }
}

/// Read-only access, used by the reporter.
#[derive(Debug, Clone)]
pub struct AverageReader {
    cell: Arc<Mutex<AverageSnapshot>>,
}

impl AverageReader {
    /// Copy the current snapshot; the guard is released before returning.
    pub fn read(&self) -> AverageSnapshot {
        *self.cell.lock()
    }

    /// Copy only the value.
    pub fn value(&self) -> Sample {
        self.read().value
    }
}
