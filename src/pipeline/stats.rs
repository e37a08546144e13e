//! Pipeline counters.
//!
//! Lock-free counters shared by all three tasks. Overruns and lost
//! notifications are not errors, so counting them here is the only way they
//! become visible.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Live counters, updated with relaxed atomics.
#[derive(Debug, Default)]
pub struct PipelineStats {
    ticks: AtomicU64,
    samples_accepted: AtomicU64,
    samples_dropped: AtomicU64,
    buffers_filled: AtomicU64,
    overruns: AtomicU64,
    samples_reclaimed: AtomicU64,
    notifications_overwritten: AtomicU64,
    windows_published: AtomicU64,
    empty_drains: AtomicU64,
    drains_rejected: AtomicU64,
    idle_wakeups: AtomicU64,
    reports_emitted: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Timer ticks handled by the sampler
    pub ticks: u64,
    /// Samples stored in a buffer
    pub samples_accepted: u64,
    /// Samples read but not stored
    pub samples_dropped: u64,
    /// Buffers handed to the aggregator
    pub buffers_filled: u64,
    /// Buffers that became active again before being drained
    pub overruns: u64,
    /// Undrained samples discarded by overruns
    pub samples_reclaimed: u64,
    /// Full-buffer notifications replaced before they were read
    pub notifications_overwritten: u64,
    /// Window means written to the shared average
    pub windows_published: u64,
    /// Notifications whose buffer turned out to be empty
    pub empty_drains: u64,
    /// Notifications for a buffer that had already become active again
    pub drains_rejected: u64,
    /// Aggregator waits that timed out
    pub idle_wakeups: u64,
    /// Reports written to the sink
    pub reports_emitted: u64,
}

macro_rules! counter {
    ($($record:ident => $field:ident),* $(,)?) => {
        impl PipelineStats {
            $(
                #[doc = concat!("Increment `", stringify!($field), "`.")]
                pub fn $record(&self) {
                    self.$field.fetch_add(1, Ordering::Relaxed);
                }
            )*
        }
    };
}

counter! {
    record_tick => ticks,
    record_accepted => samples_accepted,
    record_dropped => samples_dropped,
    record_filled => buffers_filled,
    record_notification_overwritten => notifications_overwritten,
    record_window => windows_published,
    record_empty_drain => empty_drains,
    record_drain_rejected => drains_rejected,
    record_idle => idle_wakeups,
    record_report => reports_emitted,
}

impl PipelineStats {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one overrun that discarded `samples` stale samples.
    pub fn record_overrun(&self, samples: usize) {
        self.overruns.fetch_add(1, Ordering::Relaxed);
        self.samples_reclaimed
            .fetch_add(samples as u64, Ordering::Relaxed);
    }

    /// Copy the current values.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            samples_accepted: self.samples_accepted.load(Ordering::Relaxed),
            samples_dropped: self.samples_dropped.load(Ordering::Relaxed),
            buffers_filled: self.buffers_filled.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            samples_reclaimed: self.samples_reclaimed.load(Ordering::Relaxed),
            notifications_overwritten: self.notifications_overwritten.load(Ordering::Relaxed),
            windows_published: self.windows_published.load(Ordering::Relaxed),
            empty_drains: self.empty_drains.load(Ordering::Relaxed),
            drains_rejected: self.drains_rejected.load(Ordering::Relaxed),
            idle_wakeups: self.idle_wakeups.load(Ordering::Relaxed),
            reports_emitted: self.reports_emitted.load(Ordering::Relaxed),
        }
    }
}
