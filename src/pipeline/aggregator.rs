//! Aggregator task: drains full buffers and publishes their mean.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::AggregatorConfig;
use crate::error::PipelineError;
use crate::hardware::Sample;
use crate::pipeline::buffer::{BufferId, BufferReader};
use crate::pipeline::shared::AverageWriter;
use crate::pipeline::stats::PipelineStats;

/// Denominator of the window mean.
///
/// The reference firmware divides by the configured capacity, which skews the
/// mean towards zero whenever a drain returns fewer than N samples. `Drained`
/// divides by the number of samples actually drained instead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeanDivisor {
    /// Divide by the buffer capacity N
    #[default]
    Capacity,
    /// Divide by the number of drained samples
    Drained,
}

/// Mean of one drained window.
///
/// Returns `None` for an empty window; there is nothing to publish. Sums are
/// accumulated in `f64`.
pub fn window_mean(samples: &[Sample], capacity: usize, divisor: MeanDivisor) -> Option<Sample> {
    if samples.is_empty() {
        return None;
    }
    let denominator = match divisor {
        MeanDivisor::Capacity => capacity,
        MeanDivisor::Drained => samples.len(),
    };
    if denominator == 0 {
        return None;
    }
    let sum: f64 = samples.iter().copied().map(f64::from).sum();
    Some((sum / denominator as f64) as Sample)
}

/// What one aggregator iteration did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepOutcome {
    /// A buffer was drained and its mean published
    Published {
        /// Drained buffer
        buffer: BufferId,
        /// Published mean
        mean: Sample,
        /// Samples drained
        drained: usize,
        /// Window number assigned by the shared average
        window: u64,
    },
    /// The notified buffer held no samples
    Empty(BufferId),
    /// The notified buffer had already become active again
    Rejected(BufferId),
    /// No notification before the timeout
    Idle,
}

/// Consumer task state.
pub struct Aggregator {
    reader: BufferReader,
    average: AverageWriter,
    wait_timeout: Duration,
    idle_backoff: Duration,
    divisor: MeanDivisor,
    scratch: Vec<Sample>,
    stats: Arc<PipelineStats>,
}

impl Aggregator {
    /// Create an aggregator owning the drain side and the average writer.
    pub fn new(
        reader: BufferReader,
        average: AverageWriter,
        config: &AggregatorConfig,
        stats: Arc<PipelineStats>,
    ) -> Self {
        let scratch = Vec::with_capacity(reader.capacity());
        Self {
            reader,
            average,
            wait_timeout: config.wait_timeout,
            idle_backoff: config.idle_backoff,
            divisor: config.divisor,
            scratch,
            stats,
        }
    }

    /// Wait for one notification (bounded) and handle it.
    pub async fn step(&mut self) -> StepOutcome {
        match self.reader.wait_full(self.wait_timeout).await {
            Some(buffer) => self.process(buffer),
            None => {
                self.stats.record_idle();
                if !self.idle_backoff.is_zero() {
                    tokio::time::sleep(self.idle_backoff).await;
                }
                StepOutcome::Idle
            }
        }
    }

    /// Drain `buffer`, compute its mean and publish it.
    pub fn process(&mut self, buffer: BufferId) -> StepOutcome {
        let drained = match self.reader.drain_into(buffer, &mut self.scratch) {
            Ok(n) => n,
            Err(PipelineError::DrainActiveBuffer(id)) => {
                self.stats.record_drain_rejected();
                warn!(buffer = %id, "Notified buffer is active again, skipping drain (overrun)");
                return StepOutcome::Rejected(id);
            }
            Err(e) => {
                // drain_into has no other failure mode
                warn!(buffer = %buffer, error = %e, "Drain failed");
                return StepOutcome::Rejected(buffer);
            }
        };

        let capacity = self.reader.capacity();
        let Some(mean) = window_mean(&self.scratch, capacity, self.divisor) else {
            self.stats.record_empty_drain();
            debug!(buffer = %buffer, "Notified buffer was empty");
            return StepOutcome::Empty(buffer);
        };

        if drained < capacity {
            warn!(
                buffer = %buffer,
                drained,
                capacity,
                divisor = ?self.divisor,
                "Partial window drained"
            );
        }

        let snapshot = self.average.publish(mean);
        self.stats.record_window();
        debug!(buffer = %buffer, drained, mean, window = snapshot.window, "Drained buffer");

        StepOutcome::Published {
            buffer,
            mean,
            drained,
            window: snapshot.window,
        }
    }

    /// Run until the task is aborted.
    pub async fn run(mut self) {
        info!(
            timeout_ms = self.wait_timeout.as_millis() as u64,
            divisor = ?self.divisor,
            "Aggregator started"
        );
        loop {
            self.step().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::buffer::{AlternatingBuffer, BufferWriter, PushOutcome};
    use crate::pipeline::shared::{AverageReader, SharedAverage};

    fn setup(
        capacity: usize,
        divisor: MeanDivisor,
    ) -> (BufferWriter, Aggregator, AverageReader, Arc<PipelineStats>) {
        let (writer, reader) = AlternatingBuffer::split(capacity, BufferId::A);
        let (avg_writer, avg_reader) = SharedAverage::new().split();
        let stats = Arc::new(PipelineStats::new());
        let config = AggregatorConfig {
            wait_timeout: Duration::from_millis(20),
            idle_backoff: Duration::ZERO,
            divisor,
        };
        let aggregator = Aggregator::new(reader, avg_writer, &config, Arc::clone(&stats));
        (writer, aggregator, avg_reader, stats)
    }

    fn fill_and_hand_off(writer: &mut BufferWriter, values: &[Sample]) {
        for &v in values {
            if let PushOutcome::BecameFull(id) = writer.push_active(v) {
                writer.swap_and_notify(id);
            }
        }
    }

    #[test]
    fn mean_of_full_window() {
        let samples: Vec<Sample> = (1..=10).map(|v| v as Sample).collect();
        let mean = window_mean(&samples, 10, MeanDivisor::Capacity).unwrap();
        assert!((mean - 5.5).abs() < 1e-6);
        assert_eq!(window_mean(&samples, 10, MeanDivisor::Drained), Some(mean));
    }

    #[test]
    fn partial_window_divisor_choice() {
        let samples = [4.0, 4.0, 4.0, 4.0, 4.0];
        // capacity divisor skews low
        assert_eq!(window_mean(&samples, 10, MeanDivisor::Capacity), Some(2.0));
        assert_eq!(window_mean(&samples, 10, MeanDivisor::Drained), Some(4.0));
    }

    #[test]
    fn empty_window_has_no_mean() {
        assert_eq!(window_mean(&[], 10, MeanDivisor::Capacity), None);
        assert_eq!(window_mean(&[], 10, MeanDivisor::Drained), None);
    }

    #[tokio::test]
    async fn publishes_mean_of_one_through_ten() {
        let (mut writer, mut aggregator, average, stats) = setup(10, MeanDivisor::Capacity);
        let values: Vec<Sample> = (1..=10).map(|v| v as Sample).collect();
        fill_and_hand_off(&mut writer, &values);

        let outcome = aggregator.step().await;
        assert_eq!(
            outcome,
            StepOutcome::Published {
                buffer: BufferId::A,
                mean: 5.5,
                drained: 10,
                window: 1,
            }
        );
        assert_eq!(average.value(), 5.5);
        assert_eq!(stats.snapshot().windows_published, 1);
    }

    #[tokio::test]
    async fn idles_without_notification() {
        let (_writer, mut aggregator, average, stats) = setup(4, MeanDivisor::Capacity);
        assert_eq!(aggregator.step().await, StepOutcome::Idle);
        assert_eq!(average.read().window, 0);
        assert_eq!(stats.snapshot().idle_wakeups, 1);
    }

    #[tokio::test]
    async fn alternates_between_buffers() {
        let (mut writer, mut aggregator, average, _stats) = setup(2, MeanDivisor::Capacity);

        fill_and_hand_off(&mut writer, &[1.0, 3.0]);
        assert!(matches!(
            aggregator.step().await,
            StepOutcome::Published { buffer: BufferId::A, .. }
        ));
        assert_eq!(average.value(), 2.0);

        fill_and_hand_off(&mut writer, &[10.0, 20.0]);
        assert!(matches!(
            aggregator.step().await,
            StepOutcome::Published { buffer: BufferId::B, .. }
        ));
        assert_eq!(average.value(), 15.0);
    }

    #[tokio::test]
    async fn only_newest_of_two_full_events_is_drained() {
        let (mut writer, mut aggregator, average, _stats) = setup(3, MeanDivisor::Capacity);
        fill_and_hand_off(&mut writer, &[1.0, 1.0, 1.0]);
        fill_and_hand_off(&mut writer, &[7.0, 8.0, 9.0]);

        let outcome = aggregator.step().await;
        assert!(matches!(
            outcome,
            StepOutcome::Published { buffer: BufferId::B, drained: 3, .. }
        ));
        assert_eq!(average.value(), 8.0);
        // nothing else pending
        assert_eq!(aggregator.step().await, StepOutcome::Idle);
    }

    #[test]
    fn notification_for_active_buffer_is_rejected() {
        let (mut writer, mut aggregator, average, stats) = setup(2, MeanDivisor::Capacity);
        writer.push_active(1.0);

        assert_eq!(aggregator.process(BufferId::A), StepOutcome::Rejected(BufferId::A));
        assert_eq!(stats.snapshot().drains_rejected, 1);
        assert_eq!(average.read().window, 0);
    }

    #[test]
    fn empty_buffer_publishes_nothing() {
        let (_writer, mut aggregator, average, stats) = setup(2, MeanDivisor::Capacity);
        assert_eq!(aggregator.process(BufferId::B), StepOutcome::Empty(BufferId::B));
        assert_eq!(stats.snapshot().empty_drains, 1);
        assert_eq!(average.read().window, 0);
    }
}
