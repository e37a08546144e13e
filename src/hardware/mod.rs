//! Sample sources
//!
//! The sensor driver is an external collaborator; this module only defines the
//! boundary ([`SampleSource`]) plus the simulated sources used when no hardware
//! is attached.

pub mod capabilities;
pub mod mock;
pub mod range;

pub use capabilities::{Sample, SampleSource};
pub use mock::{MockThermometer, ReplaySource};
pub use range::{OperatingRange, RangeChecked};

use crate::config::{SensorConfig, SensorKind};

/// Build the configured sample source, guarded by its operating range.
pub fn source_from_config(config: &SensorConfig) -> Box<dyn SampleSource> {
    let range = OperatingRange::new(config.min_celsius, config.max_celsius);
    match config.kind {
        SensorKind::Mock => {
            let mut sensor =
                MockThermometer::new(config.baseline_celsius, config.noise_celsius, config.seed);
            if let Some(limit) = config.fail_after {
                sensor = sensor.with_fail_after(limit);
            }
            Box::new(RangeChecked::new(sensor, range))
        }
        SensorKind::Replay => {
            let mut source = ReplaySource::new(config.values.clone());
            if let Some(limit) = config.fail_after {
                source = source.with_fail_after(limit);
            }
            Box::new(RangeChecked::new(source, range))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SensorError;

    #[test]
    fn builds_replay_source_with_range_guard() {
        let config = SensorConfig {
            kind: SensorKind::Replay,
            values: vec![20.0, 60.0],
            ..Default::default()
        };
        let mut source = source_from_config(&config);
        assert_eq!(source.name(), "replay");
        assert_eq!(source.read(), Ok(20.0));
        assert!(matches!(source.read(), Err(SensorError::OutOfRange { .. })));
    }

    #[test]
    fn builds_mock_source_with_fault_injection() {
        let config = SensorConfig {
            fail_after: Some(1),
            ..Default::default()
        };
        let mut source = source_from_config(&config);
        assert!(source.read().is_ok());
        assert!(matches!(source.read(), Err(SensorError::ReadFailed(_))));
    }
}
