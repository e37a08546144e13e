//! The sampling pipeline.
//!
//! ```text
//! SampleSource ──tick──▶ Sampler ──push──▶ AlternatingBuffer ──drain──▶ Aggregator
//!                                    │                                      │
//!                                    └──── NotificationChannel ────────────┘
//!                                                                           ▼
//!                                           Reporter ◀──read── SharedAverage
//! ```
//!
//! [`Pipeline::new`] allocates everything once and hands each component exactly
//! the access it needs: the sampler gets the buffer writer, the aggregator the
//! buffer reader plus the average writer, the reporter an average reader.
//! [`Pipeline::spawn`] starts the three tasks and returns a [`PipelineHandle`].

pub mod aggregator;
pub mod buffer;
pub mod notify;
pub mod reporter;
pub mod sampler;
pub mod shared;
pub mod stats;

pub use aggregator::{window_mean, Aggregator, MeanDivisor, StepOutcome};
pub use buffer::{
    AlternatingBuffer, BufferId, BufferReader, BufferWriter, FillState, Handoff, PushOutcome,
};
pub use notify::NotificationChannel;
pub use reporter::{
    AverageReport, CollectingSink, ReportSink, Reporter, TracingSink, WriterSink,
};
pub use sampler::{Sampler, TickOutcome};
pub use shared::{AverageReader, AverageSnapshot, AverageWriter, SharedAverage};
pub use stats::{PipelineStats, StatsSnapshot};

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{error, info};

use crate::config::{PipelineConfig, SinkKind};
use crate::error::AppResult;
use crate::hardware::{self, SampleSource};

/// Fully wired pipeline, not yet running.
pub struct Pipeline<S, K> {
    sampler: Sampler<S>,
    aggregator: Aggregator,
    reporter: Reporter<K>,
    period: Duration,
    average: AverageReader,
    stats: Arc<PipelineStats>,
}

impl Pipeline<Box<dyn SampleSource>, Box<dyn ReportSink>> {
    /// Validate `config` and build the source and sink it names.
    pub fn from_config(config: &PipelineConfig) -> AppResult<Self> {
        config.validate()?;
        let source = hardware::source_from_config(&config.sensor);
        Ok(Self::new(config, source, sink_from_config(config.reporter.sink)))
    }
}

impl<S, K> Pipeline<S, K>
where
    S: SampleSource + 'static,
    K: ReportSink + 'static,
{
    /// Allocate the buffers and shared state and wire the three components.
    ///
    /// `config` is expected to be validated already.
    pub fn new(config: &PipelineConfig, source: S, sink: K) -> Self {
        let stats = Arc::new(PipelineStats::new());
        let (writer, reader) = AlternatingBuffer::split(
            config.sampling.buffer_capacity,
            config.sampling.initial_buffer,
        );
        let (average_writer, average) = SharedAverage::new().split();

        let sampler = Sampler::new(source, writer, Arc::clone(&stats));
        let aggregator = Aggregator::new(
            reader,
            average_writer,
            &config.aggregator,
            Arc::clone(&stats),
        );
        let reporter = Reporter::new(
            average.clone(),
            sink,
            &config.reporter,
            Arc::clone(&stats),
        );

        Self {
            sampler,
            aggregator,
            reporter,
            period: config.sampling.period,
            average,
            stats,
        }
    }

    /// Shared counters.
    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    /// Read handle on the shared average.
    pub fn average(&self) -> AverageReader {
        self.average.clone()
    }

    /// Start the three tasks on the current tokio runtime.
    ///
    /// The runtime has no task priorities; the aggregator is spawned first and
    /// the producer tick never waits on it.
    pub fn spawn(self) -> PipelineHandle {
        let Self {
            sampler,
            aggregator,
            reporter,
            period,
            average,
            stats,
        } = self;

        let mut tasks = JoinSet::new();
        tasks.spawn(async move {
            aggregator.run().await;
            ("aggregator", Ok(()))
        });
        tasks.spawn(async move { ("sampler", sampler.run(period).await) });
        tasks.spawn(async move { ("reporter", reporter.run().await) });

        info!(period_ms = period.as_millis() as u64, "Pipeline running");
        PipelineHandle {
            tasks,
            average,
            stats,
        }
    }
}

/// Sink named by the configuration.
pub fn sink_from_config(kind: SinkKind) -> Box<dyn ReportSink> {
    match kind {
        SinkKind::Stdout => Box::new(WriterSink::stdout()),
        SinkKind::Log => Box::new(TracingSink),
    }
}

/// Running pipeline.
pub struct PipelineHandle {
    tasks: JoinSet<(&'static str, AppResult<()>)>,
    average: AverageReader,
    stats: Arc<PipelineStats>,
}

impl PipelineHandle {
    /// Wait until a task fails, then stop the others.
    ///
    /// Only a fatal error ends the pipeline: the sampler stops on a sensor
    /// failure, the reporter on a sink failure. The aggregator runs until it
    /// is aborted.
    pub async fn join(&mut self) -> AppResult<()> {
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok((task, Ok(()))) => info!(task, "Pipeline task finished"),
                Ok((task, Err(e))) => {
                    error!(task, error = %e, "Pipeline task failed, stopping pipeline");
                    self.tasks.abort_all();
                    return Err(e);
                }
                Err(e) if e.is_cancelled() => {}
                Err(e) => {
                    error!(error = %e, "Pipeline task panicked, stopping pipeline");
                    self.tasks.abort_all();
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    /// Abort every task and return the final counters.
    pub async fn shutdown(mut self) -> StatsSnapshot {
        self.tasks.shutdown().await;
        let snapshot = self.stats.snapshot();
        info!(
            ticks = snapshot.ticks,
            windows = snapshot.windows_published,
            overruns = snapshot.overruns,
            notifications_overwritten = snapshot.notifications_overwritten,
            reports = snapshot.reports_emitted,
            "Pipeline stopped"
        );
        snapshot
    }

    /// Live counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Read handle on the shared average.
    pub fn average(&self) -> AverageReader {
        self.average.clone()
    }
}
