//! End-to-end tests for the wired pipeline
//!
//! All tests run on a paused tokio clock, so a 250 ms sampling period and a
//! multi-second reporting interval finish instantly and deterministically.
//!
//! ## Test Coverage
//!
//! 1. **Steady state**: replayed samples 1..=10 reach the sink as 5.5
//! 2. **Sensor failure**: the pipeline stops with the sensor error
//! 3. **Sink failure**: the pipeline stops with the sink error
//! 4. **Shutdown**: counters are returned after the tasks are aborted
//! 5. **Configuration**: `from_config` refuses an unschedulable configuration

use std::time::Duration;

use async_trait::async_trait;
use sensor_pipeline::config::{PipelineConfig, SensorKind};
use sensor_pipeline::hardware::{MockThermometer, ReplaySource};
use sensor_pipeline::pipeline::{AverageReport, CollectingSink, ReportSink};
use sensor_pipeline::{AppResult, Pipeline, PipelineError, SensorError};

fn test_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.sampling.period = Duration::from_millis(250);
    config.sampling.buffer_capacity = 10;
    config.reporter.interval = Duration::from_secs(7);
    config.reporter.pre_announce = Duration::from_secs(2);
    config
}

fn one_to_ten() -> Vec<f32> {
    (1..=10).map(|v| v as f32).collect()
}

#[tokio::test(start_paused = true)]
async fn replayed_window_reaches_sink_as_mean() {
    let sink = CollectingSink::new();
    let pipeline = Pipeline::new(
        &test_config(),
        ReplaySource::new(one_to_ten()),
        sink.clone(),
    );
    let average = pipeline.average();
    let handle = pipeline.spawn();

    // ten ticks at 0..=2250 ms fill buffer A
    tokio::time::sleep(Duration::from_millis(2400)).await;
    assert_eq!(average.value(), 5.5);
    assert_eq!(average.read().window, 1);

    tokio::time::sleep(Duration::from_millis(4700)).await;
    assert_eq!(sink.announcements(), vec![Duration::from_secs(2)]);
    let reports = sink.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].average, 5.5);
    assert!(reports[0].fresh);

    let stats = handle.shutdown().await;
    assert!(stats.windows_published >= 2);
    assert_eq!(stats.overruns, 0);
    assert_eq!(stats.samples_dropped, 0);
    assert_eq!(stats.reports_emitted, 1);
}

#[tokio::test(start_paused = true)]
async fn sensor_failure_stops_pipeline() {
    let source = ReplaySource::new(vec![20.0, 21.0, 22.0]).once();
    let mut handle = Pipeline::new(&test_config(), source, CollectingSink::new()).spawn();

    let result = handle.join().await;
    assert!(matches!(
        result,
        Err(PipelineError::Sensor(SensorError::Exhausted(3)))
    ));

    let stats = handle.shutdown().await;
    assert_eq!(stats.samples_accepted, 3);
    // buffer never filled, nothing published
    assert_eq!(stats.windows_published, 0);
}

#[tokio::test(start_paused = true)]
async fn mock_fault_injection_is_fatal() {
    let source = MockThermometer::new(24.0, 0.5, 7).with_fail_after(25);
    let mut handle = Pipeline::new(&test_config(), source, CollectingSink::new()).spawn();

    let err = handle.join().await.unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err, PipelineError::Sensor(SensorError::ReadFailed(_))));

    let stats = handle.shutdown().await;
    assert_eq!(stats.samples_accepted, 25);
    assert_eq!(stats.buffers_filled, 2);
}

struct BrokenConsole;

#[async_trait]
impl ReportSink for BrokenConsole {
    async fn emit(&mut self, _report: &AverageReport) -> AppResult<()> {
        Err(PipelineError::Sink("broken pipe".into()))
    }
}

#[tokio::test(start_paused = true)]
async fn sink_failure_stops_pipeline() {
    let mut handle =
        Pipeline::new(&test_config(), ReplaySource::new(one_to_ten()), BrokenConsole).spawn();

    let result = handle.join().await;
    assert!(matches!(result, Err(PipelineError::Sink(_))));

    let stats = handle.shutdown().await;
    assert_eq!(stats.reports_emitted, 0);
    assert!(stats.ticks > 0);
}

#[tokio::test(start_paused = true)]
async fn shutdown_returns_counters() {
    let pipeline = Pipeline::new(
        &test_config(),
        ReplaySource::new(one_to_ten()),
        CollectingSink::new(),
    );
    let stats = pipeline.stats();
    let handle = pipeline.spawn();

    tokio::time::sleep(Duration::from_secs(1)).await;
    let live = handle.stats();
    assert!(live.ticks >= 4);

    let last = handle.shutdown().await;
    assert_eq!(last, stats.snapshot());
    assert!(last.ticks >= live.ticks);
}

#[test]
fn from_config_rejects_unschedulable_timing() {
    let mut config = test_config();
    config.sampling.period = Duration::from_millis(5);
    config.sampling.buffer_capacity = 4;
    config.aggregator.idle_backoff = Duration::from_millis(50);

    let result = Pipeline::from_config(&config);
    assert!(matches!(result, Err(PipelineError::Configuration(_))));
}

#[tokio::test(start_paused = true)]
async fn from_config_builds_replay_pipeline() {
    let mut config = test_config();
    config.sensor.kind = SensorKind::Replay;
    // the configured source is range-checked against 10..=50 °C
    config.sensor.values = (11..=20).map(|v| v as f32).collect();
    config.reporter.sink = sensor_pipeline::config::SinkKind::Log;

    let pipeline = Pipeline::from_config(&config).unwrap();
    let average = pipeline.average();
    let handle = pipeline.spawn();

    tokio::time::sleep(Duration::from_millis(2400)).await;
    assert_eq!(average.value(), 15.5);
    handle.shutdown().await;
}
