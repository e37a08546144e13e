//! Mock Sample Sources
//!
//! Simulated sensors for running the pipeline without hardware.
//!
//! # Available Mocks
//!
//! - `MockThermometer` - baseline temperature plus bounded, seeded noise
//! - `ReplaySource` - cycles through a fixed list of readings
//!
//! Both support fault injection with `fail_after`, which makes the read after
//! the n-th successful one fail, so the fatal-error path can be exercised.
//! Neither allocates on the read path.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::SensorError;
use crate::hardware::capabilities::{Sample, SampleSource};

// =============================================================================
// MockThermometer - Simulated Temperature Sensor
// =============================================================================

/// Mock temperature sensor
///
/// Simulates an on-die temperature sensor with:
/// - Configurable baseline (°C)
/// - Uniform noise in `[-noise, +noise]`
/// - Deterministic output for a given seed
///
/// # Example
///
/// ```
/// use sensor_pipeline::hardware::{MockThermometer, SampleSource};
///
/// let mut sensor = MockThermometer::new(24.0, 0.5, 7);
/// let reading = sensor.read().unwrap();
/// assert!((reading - 24.0).abs() <= 0.5);
/// ```
pub struct MockThermometer {
    baseline: Sample,
    noise: Sample,
    rng: StdRng,
    reads: u64,
    fail_after: Option<u64>,
}

impl MockThermometer {
    /// Create a new mock thermometer
    ///
    /// # Arguments
    /// * `baseline` - Centre temperature in °C
    /// * `noise` - Peak noise amplitude in °C
    /// * `seed` - RNG seed
    pub fn new(baseline: Sample, noise: Sample, seed: u64) -> Self {
        Self {
            baseline,
            noise: noise.abs(),
            rng: StdRng::seed_from_u64(seed),
            reads: 0,
            fail_after: None,
        }
    }

    /// Fail every read after `reads` successful ones
    pub fn with_fail_after(mut self, reads: u64) -> Self {
        self.fail_after = Some(reads);
        self
    }

    /// Number of successful reads so far
    pub fn reads(&self) -> u64 {
        self.reads
    }
}

impl SampleSource for MockThermometer {
    fn read(&mut self) -> Result<Sample, SensorError> {
        if self.fail_after.is_some_and(|limit| self.reads >= limit) {
            return Err(SensorError::ReadFailed(format!(
                "mock thermometer stopped responding after {} reads",
                self.reads
            )));
        }

        let offset = if self.noise > 0.0 {
            self.rng.gen_range(-self.noise..=self.noise)
        } else {
            0.0
        };
        self.reads += 1;
        Ok(self.baseline + offset)
    }

    fn name(&self) -> &str {
        "mock_thermometer"
    }
}

// =============================================================================
// ReplaySource - Recorded Readings
// =============================================================================

/// Replays a fixed sequence of readings
///
/// By default the sequence repeats forever. `once()` makes the source fail
/// with [`SensorError::Exhausted`] at the end of the list instead.
pub struct ReplaySource {
    values: Vec<Sample>,
    cursor: usize,
    reads: u64,
    cycle: bool,
    fail_after: Option<u64>,
}

impl ReplaySource {
    /// Create a looping replay of `values`
    pub fn new(values: Vec<Sample>) -> Self {
        Self {
            values,
            cursor: 0,
            reads: 0,
            cycle: true,
            fail_after: None,
        }
    }

    /// Stop at the end of the list instead of looping
    pub fn once(mut self) -> Self {
        self.cycle = false;
        self
    }

    /// Fail every read after `reads` successful ones
    pub fn with_fail_after(mut self, reads: u64) -> Self {
        self.fail_after = Some(reads);
        self
    }

    /// Number of successful reads so far
    pub fn reads(&self) -> u64 {
        self.reads
    }
}

impl SampleSource for ReplaySource {
    fn read(&mut self) -> Result<Sample, SensorError> {
        if self.fail_after.is_some_and(|limit| self.reads >= limit) {
            return Err(SensorError::ReadFailed(format!(
                "replay fault injected after {} reads",
                self.reads
            )));
        }
        if self.cursor >= self.values.len() {
            if !self.cycle || self.values.is_empty() {
                return Err(SensorError::Exhausted(self.reads));
            }
            self.cursor = 0;
        }

        let value = self.values[self.cursor];
        self.cursor += 1;
        self.reads += 1;
        Ok(value)
    }

    fn name(&self) -> &str {
        "replay"
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
