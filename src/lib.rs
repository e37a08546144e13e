//! # Sensor Pipeline Core Library
//!
//! A periodic sensor-sampling pipeline. A clock-driven sampler reads one value
//! per tick into a pair of alternating buffers; when a buffer fills, it is handed
//! to an aggregator through a single-slot, overwrite-on-write notification and the
//! sampler continues in the other buffer without waiting. The aggregator publishes
//! each buffer's mean into a guarded shared value that a reporter prints on its
//! own schedule.
//!
//! ## Crate Structure
//!
//! - **`config`**: Figment-based configuration (`config/pipeline.toml` plus
//!   `SENSOR_PIPELINE_*` environment overrides) and its validation, including the
//!   timing check that the aggregator can keep up with the sampler.
//! - **`error`**: The `PipelineError` and `SensorError` enums and `AppResult`.
//! - **`hardware`**: The `SampleSource` capability and the simulated sources
//!   (mock thermometer, replay) with an operating-range guard.
//! - **`logging`**: `tracing-subscriber` setup.
//! - **`pipeline`**: The alternating buffers, notification channel, shared
//!   average, the three tasks, and the `Pipeline` that wires them together.

pub mod config;
pub mod error;
pub mod hardware;
pub mod logging;
pub mod pipeline;

pub use error::{AppResult, PipelineError, SensorError};
pub use pipeline::{Pipeline, PipelineHandle};
