//! Reporter: periodic emission of the shared average.
//!
//! The reporter copies the latest mean out of the shared average and hands the
//! copy to a [`ReportSink`]. The guard is released before the sink is touched,
//! so a slow sink can never hold up the aggregator.
//!
//! Each reporting period is split in two. After `interval - pre_announce` the
//! sink receives an announcement, and the report follows `pre_announce` later.
//! With `pre_announce = 0` there is a single sleep of `interval`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{error, info};

use crate::config::ReporterConfig;
use crate::error::{AppResult, PipelineError};
use crate::hardware::Sample;
use crate::pipeline::shared::AverageReader;
use crate::pipeline::stats::PipelineStats;

/// One emitted report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AverageReport {
    /// 1 for the first report, then incrementing
    pub sequence: u64,
    /// Copy of the shared average
    pub average: Sample,
    /// Window that produced `average` (0 before the first window)
    pub window: u64,
    /// Whether `average` changed window since the previous report
    pub fresh: bool,
    /// When the value was copied out
    pub timestamp: DateTime<Utc>,
}

impl fmt::Display for AverageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} average temperature: {:.2} °C (window {}{})",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.average,
            self.window,
            if self.fresh { "" } else { ", unchanged" }
        )
    }
}

/// Line-oriented output for reports.
#[async_trait]
pub trait ReportSink: Send {
    /// Called `lead` before the next report. Optional.
    async fn announce(&mut self, _lead: Duration) -> AppResult<()> {
        Ok(())
    }

    /// Write one report.
    async fn emit(&mut self, report: &AverageReport) -> AppResult<()>;
}

#[async_trait]
impl<K: ReportSink + ?Sized> ReportSink for Box<K> {
    async fn announce(&mut self, lead: Duration) -> AppResult<()> {
        (**self).announce(lead).await
    }

    async fn emit(&mut self, report: &AverageReport) -> AppResult<()> {
        (**self).emit(report).await
    }
}

// =============================================================================
// Sinks
// =============================================================================

/// Writes one text line per report to any async writer.
pub struct WriterSink<W> {
    writer: W,
}

impl WriterSink<tokio::io::Stdout> {
    /// Sink on standard output.
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

impl<W: AsyncWrite + Unpin + Send> WriterSink<W> {
    /// Wrap `writer`.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Unwrap the writer.
    pub fn into_inner(self) -> W {
        self.writer
    }

    async fn write_line(&mut self, line: String) -> AppResult<()> {
        self.writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| PipelineError::Sink(e.to_string()))?;
        self.writer
            .flush()
            .await
            .map_err(|e| PipelineError::Sink(e.to_string()))
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> ReportSink for WriterSink<W> {
    async fn announce(&mut self, lead: Duration) -> AppResult<()> {
        self.write_line(format!("Next average in {lead:?}\n")).await
    }

    async fn emit(&mut self, report: &AverageReport) -> AppResult<()> {
        self.write_line(format!("{report}\n")).await
    }
}

/// Emits reports as `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl ReportSink for TracingSink {
    async fn announce(&mut self, lead: Duration) -> AppResult<()> {
        info!(lead_ms = lead.as_millis() as u64, "Average report pending");
        Ok(())
    }

    async fn emit(&mut self, report: &AverageReport) -> AppResult<()> {
        info!(
            sequence = report.sequence,
            average = report.average,
            window = report.window,
            fresh = report.fresh,
            "Average temperature"
        );
        Ok(())
    }
}

/// Keeps every report in memory. Used by tests and embedding code.
#[derive(Debug, Default, Clone)]
pub struct CollectingSink {
    reports: Arc<Mutex<Vec<AverageReport>>>,
    announcements: Arc<Mutex<Vec<Duration>>>,
}

impl CollectingSink {
    /// Create an empty sink. Clones share the same storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the reports emitted so far.
    pub fn reports(&self) -> Vec<AverageReport> {
        self.reports.lock().clone()
    }

    /// Lead times of the announcements received so far.
    pub fn announcements(&self) -> Vec<Duration> {
        self.announcements.lock().clone()
    }
}

#[async_trait]
impl ReportSink for CollectingSink {
    async fn announce(&mut self, lead: Duration) -> AppResult<()> {
        self.announcements.lock().push(lead);
        Ok(())
    }

    async fn emit(&mut self, report: &AverageReport) -> AppResult<()> {
        self.reports.lock().push(report.clone());
        Ok(())
    }
}

// =============================================================================
// Reporter
// =============================================================================

/// Reporter task state.
pub struct Reporter<K> {
    average: AverageReader,
    sink: K,
    interval: Duration,
    pre_announce: Duration,
    sequence: u64,
    last_window: u64,
    stats: Arc<PipelineStats>,
}

impl<K: ReportSink> Reporter<K> {
    /// Create a reporter with read-only access to the shared average.
    pub fn new(
        average: AverageReader,
        sink: K,
        config: &ReporterConfig,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            average,
            sink,
            interval: config.interval,
            pre_announce: config.pre_announce.min(config.interval),
            sequence: 0,
            last_window: 0,
            stats,
        }
    }

    /// Copy the average and emit it.
    pub async fn report_once(&mut self) -> AppResult<AverageReport> {
        let snapshot = self.average.read();

        self.sequence += 1;
        let report = AverageReport {
            sequence: self.sequence,
            average: snapshot.value,
            window: snapshot.window,
            fresh: snapshot.window != self.last_window,
            timestamp: Utc::now(),
        };
        self.last_window = snapshot.window;

        self.sink.emit(&report).await?;
        self.stats.record_report();
        Ok(report)
    }

    /// Sleep, announce, sleep, report; until the sink fails.
    pub async fn run(mut self) -> AppResult<()> {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            pre_announce_ms = self.pre_announce.as_millis() as u64,
            "Reporter started"
        );

        loop {
            if let Err(e) = self.cycle().await {
                error!(error = %e, "Report sink failed, stopping reporter");
                return Err(e);
            }
        }
    }

    async fn cycle(&mut self) -> AppResult<AverageReport> {
        if self.pre_announce.is_zero() {
            tokio::time::sleep(self.interval).await;
        } else {
            tokio::time::sleep(self.interval - self.pre_announce).await;
            self.sink.announce(self.pre_announce).await?;
            tokio::time::sleep(self.pre_announce).await;
        }
        self.report_once().await
    }
}
