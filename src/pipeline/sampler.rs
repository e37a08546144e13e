//! Sampler: the clock-driven producer.
//!
//! [`Sampler::tick`] is the whole producer step. It is synchronous and never
//! waits on the consumer: it reads one value, appends it to the active buffer
//! and, when that buffer fills, swaps buffers and posts the notification.
//! [`Sampler::run`] only drives `tick` from a tokio interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::error::{AppResult, SensorError};
use crate::hardware::SampleSource;
use crate::pipeline::buffer::{BufferWriter, FillState, Handoff, PushOutcome};
use crate::pipeline::stats::PipelineStats;

/// What one tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Sample stored; the active buffer still has room
    Accepted,
    /// Sample stored, buffer handed to the aggregator
    Filled(Handoff),
    /// Sample read but not stored
    Dropped,
}

/// Producer task state: the sample source plus write access to the buffers.
pub struct Sampler<S> {
    source: S,
    writer: BufferWriter,
    stats: Arc<PipelineStats>,
}

impl<S: SampleSource> Sampler<S> {
    /// Create a sampler owning `source` and the producer half of the buffers.
    pub fn new(source: S, writer: BufferWriter, stats: Arc<PipelineStats>) -> Self {
        Self {
            source,
            writer,
            stats,
        }
    }

    /// Which buffer is being filled.
    pub fn state(&self) -> FillState {
        self.writer.state()
    }

    /// One timer tick.
    ///
    /// A read failure is returned as-is and nothing is pushed for that tick.
    pub fn tick(&mut self) -> Result<TickOutcome, SensorError> {
        self.stats.record_tick();
        let sample = self.source.read()?;

        let outcome = self.writer.push_active(sample);
        let late = self.writer.take_late_reclaimed();
        if late > 0 {
            self.stats.record_overrun(late);
            warn!(
                buffer = %self.writer.active(),
                discarded = late,
                "Buffer overrun: stale window cleared on first push"
            );
        }

        match outcome {
            PushOutcome::Accepted => {
                self.stats.record_accepted();
                Ok(TickOutcome::Accepted)
            }
            PushOutcome::BecameFull(full) => {
                self.stats.record_accepted();
                let handoff = self.writer.swap_and_notify(full);
                self.stats.record_filled();
                debug!(
                    buffer = %handoff.full,
                    next = %handoff.now_active,
                    "Buffer full, handed to aggregator"
                );

                if let Some(lost) = handoff.overwritten {
                    self.stats.record_notification_overwritten();
                    warn!(
                        lost = %lost,
                        newest = %handoff.full,
                        "Aggregator had not read the previous notification, it was replaced"
                    );
                }
                if handoff.is_overrun() {
                    self.stats.record_overrun(handoff.reclaimed);
                    warn!(
                        buffer = %handoff.now_active,
                        discarded = handoff.reclaimed,
                        "Buffer overrun: reactivated before it was drained"
                    );
                }
                Ok(TickOutcome::Filled(handoff))
            }
            PushOutcome::Dropped => {
                self.stats.record_dropped();
                warn!(
                    buffer = %self.writer.active(),
                    sample,
                    "Active buffer unavailable, sample dropped"
                );
                Ok(TickOutcome::Dropped)
            }
        }
    }

    /// Tick every `period` until the source fails.
    ///
    /// Ticks that could not run on time are skipped rather than replayed in
    /// a burst.
    pub async fn run(mut self, period: Duration) -> AppResult<()> {
        info!(
            source = self.source.name(),
            period_ms = period.as_millis() as u64,
            capacity = self.writer.capacity(),
            state = ?self.state(),
            "Sampler started"
        );

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if let Err(e) = self.tick() {
                error!(source = self.source.name(), error = %e, "Sensor read failed, stopping sampler");
                return Err(e.into());
            }
        }
    }

    /// Give the source back, e.g. to inspect a mock after a test.
    pub fn into_source(self) -> S {
        self.source
    }
}
