//! Sample source capability
//!
//! The pipeline needs exactly one thing from the sensor driver: a synchronous
//! "read one value, may fail" operation. Unlike the async capability traits used
//! for lab instruments, [`SampleSource::read`] is called from the sampler's timer
//! tick, which must never suspend, so the trait is deliberately synchronous.
//!
//! # Contract
//! - `read` returns promptly, without blocking or allocating
//! - A returned error is final for the pipeline; callers do not retry
//! - Values are in the source's native unit (°C for the thermometers here)

use crate::error::SensorError;

/// A single scalar reading.
pub type Sample = f32;

/// Capability: single-value synchronous reads
pub trait SampleSource: Send {
    /// Read one sample
    ///
    /// # Returns
    /// - Ok(sample) on a successful read
    /// - Err(SensorError) if the driver could not produce a trustworthy value
    fn read(&mut self) -> Result<Sample, SensorError>;

    /// Human-readable name used in log events
    fn name(&self) -> &str {
        "sensor"
    }
}

impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn read(&mut self) -> Result<Sample, SensorError> {
        (**self).read()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
