//! Custom error types for the pipeline.
//!
//! This module defines the primary error type, `PipelineError`, for the whole crate.
//! Using the `thiserror` crate, it provides a centralized way to handle the few
//! things that can go wrong in the sampling core, from configuration issues to a
//! sensor that stops answering.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: Wraps errors from `figment`, typically file parsing or type
//!   mismatches in `config/pipeline.toml` or the environment.
//! - **`Configuration`**: Semantic errors that pass parsing but are logically
//!   wrong, e.g. a sampling period too short for the aggregator to keep up.
//! - **`Sensor`**: The sample source could not produce a value. Always fatal.
//! - **`DrainActiveBuffer`**: The consumer tried to drain the buffer the producer
//!   is currently filling.
//! - **`Sink`**: The report sink rejected a line.
//! - **`Task`**: A pipeline task panicked or was cancelled.
//!
//! `SensorError` is kept separate because sources live behind a trait and
//! should not need to know about the rest of the pipeline.

use crate::pipeline::BufferId;
use thiserror::Error;

/// Convenience alias for results using the pipeline error type.
pub type AppResult<T> = std::result::Result<T, PipelineError>;

/// Failure reported by a [`SampleSource`](crate::hardware::SampleSource).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SensorError {
    /// The driver could not produce a reading.
    #[error("Sensor read failed: {0}")]
    ReadFailed(String),

    /// The driver produced a value outside its operating range.
    #[error("Reading {value} outside operating range [{min}, {max}]")]
    OutOfRange {
        /// Raw reading
        value: f32,
        /// Lower bound of the operating range
        min: f32,
        /// Upper bound of the operating range
        max: f32,
    },

    /// A replay source ran out of recorded values.
    #[error("Replay source exhausted after {0} readings")]
    Exhausted(u64),
}

/// Error type shared by every pipeline component.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Configuration file or environment could not be parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration parsed but is not usable.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// The sample source failed.
    #[error(transparent)]
    Sensor(#[from] SensorError),

    /// Drain requested for the buffer the producer is filling.
    #[error("Buffer {0} is still active and cannot be drained")]
    DrainActiveBuffer(BufferId),

    /// The report sink rejected a report.
    #[error("Report sink error: {0}")]
    Sink(String),

    /// A pipeline task panicked or was cancelled.
    #[error("Pipeline task failed: {0}")]
    Task(String),

    /// The tracing subscriber could not be installed.
    #[error("Logging initialization failed: {0}")]
    Logging(String),
}

impl From<figment::Error> for PipelineError {
    fn from(value: figment::Error) -> Self {
        PipelineError::Config(Box::new(value))
    }
}

impl From<tokio::task::JoinError> for PipelineError {
    fn from(value: tokio::task::JoinError) -> Self {
        PipelineError::Task(value.to_string())
    }
}

impl PipelineError {
    /// Whether this error must stop the whole pipeline.
    ///
    /// Sensor failures are fatal by policy: a fabricated temperature is worse
    /// than no temperature. Draining the active buffer is a local protocol
    /// violation that the aggregator counts and skips.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, PipelineError::DrainActiveBuffer(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensor_error_converts_and_is_fatal() {
        let err: PipelineError = SensorError::ReadFailed("i2c nack".into()).into();
        assert!(err.is_fatal());
        assert_eq!(err.to_string(), "Sensor read failed: i2c nack");
    }

    #[test]
    fn drain_of_active_buffer_is_recoverable() {
        let err = PipelineError::DrainActiveBuffer(BufferId::A);
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("Buffer A"));
    }

    #[test]
    fn out_of_range_message_names_bounds() {
        let err = SensorError::OutOfRange {
            value: 80.0,
            min: 10.0,
            max: 50.0,
        };
        let msg = err.to_string();
        assert!(msg.contains("80"));
        assert!(msg.contains("[10, 50]"));
    }
}
