//! Pipeline configuration using Figment
//!
//! Configuration is loaded from:
//! 1. `config/pipeline.toml` (base configuration)
//! 2. Environment variables prefixed with `SENSOR_PIPELINE_`, nested keys split
//!    on a double underscore
//!
//! Every field has a default matching the reference firmware (250 ms sampling,
//! 10-sample buffers, 7 s reporting), so an empty file is a valid configuration.
//! The configuration is read once at startup; nothing reloads it afterwards.
//!
//! # Example
//! ```no_run
//! use sensor_pipeline::config::PipelineConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // SENSOR_PIPELINE_SAMPLING__BUFFER_CAPACITY=16 overrides the file value
//! let config = PipelineConfig::load()?;
//! config.validate()?;
//! println!("Sampling every {:?}", config.sampling.period);
//! # Ok(())
//! # }
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{AppResult, PipelineError};
use crate::logging::OutputFormat;
use crate::pipeline::{BufferId, MeanDivisor};

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/pipeline.toml";

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "SENSOR_PIPELINE_";

/// Largest buffer capacity accepted by validation.
pub const MAX_BUFFER_CAPACITY: usize = 4096;

/// Top-level pipeline configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Sampler timing and buffer geometry
    pub sampling: SamplingConfig,
    /// Sample source selection
    pub sensor: SensorConfig,
    /// Aggregator wait behaviour
    pub aggregator: AggregatorConfig,
    /// Reporter cadence and sink
    pub reporter: ReporterConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format
    pub log_format: OutputFormat,
    /// Delay between process start and pipeline bring-up
    #[serde(with = "humantime_serde")]
    pub startup_delay: Duration,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "Sensor Pipeline".to_string(),
            log_level: "info".to_string(),
            log_format: OutputFormat::Pretty,
            startup_delay: Duration::ZERO,
        }
    }
}

/// Sampler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Timer period between two sensor reads
    #[serde(with = "humantime_serde")]
    pub period: Duration,
    /// Samples per buffer (N)
    pub buffer_capacity: usize,
    /// Buffer that receives the first sample
    pub initial_buffer: BufferId,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(250),
            buffer_capacity: 10,
            initial_buffer: BufferId::A,
        }
    }
}

/// Kind of sample source to build at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    /// Simulated thermometer with bounded noise
    Mock,
    /// Replays `values` in a loop
    Replay,
}

/// Sample source configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Source implementation
    pub kind: SensorKind,
    /// Lower bound of the operating range (°C)
    pub min_celsius: f32,
    /// Upper bound of the operating range (°C)
    pub max_celsius: f32,
    /// Centre value of the mock thermometer (°C)
    pub baseline_celsius: f32,
    /// Peak noise amplitude of the mock thermometer (°C)
    pub noise_celsius: f32,
    /// RNG seed for the mock thermometer
    pub seed: u64,
    /// Values cycled through by the replay source
    pub values: Vec<f32>,
    /// Fail the read after this many successful readings (fault injection)
    pub fail_after: Option<u64>,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            kind: SensorKind::Mock,
            min_celsius: 10.0,
            max_celsius: 50.0,
            baseline_celsius: 24.0,
            noise_celsius: 0.5,
            seed: 0x5EED,
            values: Vec::new(),
            fail_after: None,
        }
    }
}

/// Aggregator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Bounded wait for a full-buffer notification
    #[serde(with = "humantime_serde")]
    pub wait_timeout: Duration,
    /// Extra sleep after a wait that timed out
    #[serde(with = "humantime_serde")]
    pub idle_backoff: Duration,
    /// Divisor used for the window mean
    pub divisor: MeanDivisor,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            wait_timeout: Duration::from_millis(250),
            idle_backoff: Duration::ZERO,
            divisor: MeanDivisor::Capacity,
        }
    }
}

/// Where reports are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// One line per report on standard output
    Stdout,
    /// One `tracing` event per report
    Log,
}

/// Reporter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReporterConfig {
    /// Time between two reports
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Announce the upcoming report this long before it is emitted (0 disables)
    #[serde(with = "humantime_serde")]
    pub pre_announce: Duration,
    /// Output sink
    pub sink: SinkKind,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(7000),
            pre_announce: Duration::from_millis(2000),
            sink: SinkKind::Stdout,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from `config/pipeline.toml` and environment variables
    ///
    /// Example override: `SENSOR_PIPELINE_APPLICATION__LOG_LEVEL=debug`
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        Ok(Self::figment(path).extract()?)
    }

    /// Layered provider: file, then environment. Absent keys take the serde defaults.
    pub fn figment<P: AsRef<Path>>(path: P) -> Figment {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(invalid(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let sampling = &self.sampling;
        if sampling.period.is_zero() {
            return Err(invalid("sampling.period must be greater than zero"));
        }
        if sampling.buffer_capacity == 0 || sampling.buffer_capacity > MAX_BUFFER_CAPACITY {
            return Err(invalid(format!(
                "Invalid buffer_capacity {}. Must be 1-{}",
                sampling.buffer_capacity, MAX_BUFFER_CAPACITY
            )));
        }

        let sensor = &self.sensor;
        if !(sensor.min_celsius < sensor.max_celsius) {
            return Err(invalid(format!(
                "Invalid sensor range [{}, {}]",
                sensor.min_celsius, sensor.max_celsius
            )));
        }
        match sensor.kind {
            SensorKind::Mock => {
                let lo = sensor.baseline_celsius - sensor.noise_celsius.abs();
                let hi = sensor.baseline_celsius + sensor.noise_celsius.abs();
                if lo < sensor.min_celsius || hi > sensor.max_celsius {
                    return Err(invalid(format!(
                        "Mock baseline {} ± {} leaves the operating range [{}, {}]",
                        sensor.baseline_celsius,
                        sensor.noise_celsius,
                        sensor.min_celsius,
                        sensor.max_celsius
                    )));
                }
            }
            SensorKind::Replay => {
                if sensor.values.is_empty() {
                    return Err(invalid("sensor.values must not be empty for a replay source"));
                }
            }
        }

        if self.reporter.interval.is_zero() {
            return Err(invalid("reporter.interval must be greater than zero"));
        }
        if self.reporter.pre_announce >= self.reporter.interval {
            return Err(invalid(format!(
                "reporter.pre_announce ({:?}) must be shorter than reporter.interval ({:?})",
                self.reporter.pre_announce, self.reporter.interval
            )));
        }

        // A notification ends the wait at once, so only a backoff that starts
        // just before a buffer fills delays the drain. It must fit in one refill.
        let refill = self.refill_time();
        if self.aggregator.idle_backoff > refill {
            return Err(invalid(format!(
                "aggregator.idle_backoff {:?} exceeds buffer refill time {:?} (period × capacity)",
                self.aggregator.idle_backoff, refill
            )));
        }

        Ok(())
    }

    /// Time the producer needs to fill one buffer.
    pub fn refill_time(&self) -> Duration {
        let n = u32::try_from(self.sampling.buffer_capacity).unwrap_or(u32::MAX);
        self.sampling.period.saturating_mul(n)
    }
}

fn invalid(msg: impl Into<String>) -> PipelineError {
    PipelineError::Configuration(msg.into())
}
