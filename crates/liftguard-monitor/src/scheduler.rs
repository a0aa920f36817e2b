//! Fixed-interval scheduler with skip-ahead on missed ticks.

use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

use crate::MonitorConfig;

/// Information about a fired tick, returned by
/// [`MonitorScheduler::wait_for_tick`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickInfo {
    /// Monotonically increasing tick number (starts at 1).
    pub tick: u64,
    /// `true` if the tick fired more than one interval late
    /// (the host was suspended or the runtime starved).
    pub overrun: bool,
    /// Ticks that were skipped rather than replayed.
    pub ticks_skipped: u64,
}

/// Counters describing a scheduler's history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorStats {
    /// Total ticks fired.
    pub total_ticks: u64,
    /// Total overruns detected.
    pub total_overruns: u64,
    /// Total ticks skipped.
    pub total_skipped: u64,
}

/// Fixed-interval scheduler.
///
/// A phone app is routinely frozen in the background for minutes or hours.
/// When it resumes, the monitor should run ONE check, not a burst of
/// catch-up checks, so missed ticks are always skipped and the next
/// deadline is scheduled from "now".
pub struct MonitorScheduler {
    interval: Duration,
    tick_count: u64,
    next_tick: Instant,
    stats: MonitorStats,
}

impl MonitorScheduler {
    /// Creates a scheduler from config. The first tick fires after
    /// [`MonitorConfig::initial_delay`].
    pub fn new(config: MonitorConfig) -> Self {
        let config = config.validated();
        let interval = config.interval();
        let next_tick = Instant::now() + config.initial_delay();

        debug!(
            interval_secs = interval.as_secs(),
            initial_delay_secs = config.initial_delay().as_secs(),
            "monitor scheduler created"
        );

        Self {
            interval,
            tick_count: 0,
            next_tick,
            stats: MonitorStats::default(),
        }
    }

    /// Wait until the next tick is due.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        let deadline = self.next_tick;
        time::sleep_until(deadline).await;

        let now = Instant::now();
        self.tick_count += 1;

        let late_by = now.saturating_duration_since(deadline);
        let ticks_skipped = (late_by.as_nanos() / self.interval.as_nanos()) as u64;
        let overrun = ticks_skipped > 0;
        if overrun {
            warn!(
                tick = self.tick_count,
                skipped = ticks_skipped,
                late_secs = late_by.as_secs(),
                "monitor tick late; skipping missed ticks"
            );
            self.stats.total_overruns += 1;
            self.stats.total_skipped += ticks_skipped;
        }

        // Always schedule from now, never from the missed deadline.
        self.next_tick = now + self.interval;
        self.stats.total_ticks += 1;

        trace!(tick = self.tick_count, overrun, "monitor tick fired");

        TickInfo {
            tick: self.tick_count,
            overrun,
            ticks_skipped,
        }
    }

    /// Ticks fired so far.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Time between ticks.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> &MonitorStats {
        &self.stats
    }
}
