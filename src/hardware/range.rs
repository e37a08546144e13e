//! Operating-range guard for sample sources.

use crate::error::SensorError;
use crate::hardware::capabilities::{Sample, SampleSource};

/// Inclusive operating range of a sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OperatingRange {
    /// Lowest trustworthy reading
    pub min: Sample,
    /// Highest trustworthy reading
    pub max: Sample,
}

impl OperatingRange {
    /// Create a range; `min` must be below `max`.
    pub fn new(min: Sample, max: Sample) -> Self {
        Self { min, max }
    }

    /// Whether `value` lies inside the range. NaN never does.
    pub fn contains(&self, value: Sample) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Wraps a source and turns out-of-range readings into errors.
///
/// A thermometer that reports 300 °C is broken, not hot; the pipeline treats
/// such a value exactly like a failed read.
pub struct RangeChecked<S> {
    inner: S,
    range: OperatingRange,
}

impl<S: SampleSource> RangeChecked<S> {
    /// Guard `inner` with `range`.
    pub fn new(inner: S, range: OperatingRange) -> Self {
        Self { inner, range }
    }
}

impl<S: SampleSource> SampleSource for RangeChecked<S> {
    fn read(&mut self) -> Result<Sample, SensorError> {
        let value = self.inner.read()?;
        if self.range.contains(value) {
            Ok(value)
        } else {
            Err(SensorError::OutOfRange {
                value,
                min: self.range.min,
                max: self.range.max,
            })
        }
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::ReplaySource;

    #[test]
    fn passes_values_inside_range() {
        let mut source = RangeChecked::new(
            ReplaySource::new(vec![10.0, 25.0, 50.0]),
            OperatingRange::new(10.0, 50.0),
        );
        assert_eq!(source.read(), Ok(10.0));
        assert_eq!(source.read(), Ok(25.0));
        assert_eq!(source.read(), Ok(50.0));
    }

    #[test]
    fn rejects_values_outside_range() {
        let mut source = RangeChecked::new(
            ReplaySource::new(vec![9.5]),
            OperatingRange::new(10.0, 50.0),
        );
        assert_eq!(
            source.read(),
            Err(SensorError::OutOfRange {
                value: 9.5,
                min: 10.0,
                max: 50.0
            })
        );
    }

    #[test]
    fn nan_is_out_of_range() {
        assert!(!OperatingRange::new(10.0, 50.0).contains(f32::NAN));
    }
}
