//! Monitor configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Configuration for a periodic monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Seconds between ticks. Default: 60.
    pub interval_secs: u64,

    /// Seconds before the first tick. `None` means one full interval.
    pub initial_delay_secs: Option<u64>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            initial_delay_secs: None,
        }
    }
}

impl MonitorConfig {
    /// Shortest interval accepted. Anything lower is clamped up.
    pub const MIN_INTERVAL_SECS: u64 = 1;

    /// Longest interval or initial delay accepted (one week). Anything
    /// higher is clamped down so deadlines stay representable as an
    /// `Instant`.
    pub const MAX_INTERVAL_SECS: u64 = 7 * 24 * 60 * 60;

    /// Creates a config ticking every `interval_secs` seconds.
    pub fn with_interval(interval_secs: u64) -> Self {
        Self {
            interval_secs,
            ..Default::default()
        }
    }

    /// Clamp out-of-range values so the config is safe to use.
    ///
    /// Called automatically by [`MonitorScheduler::new`]. Rules:
    /// - `interval_secs` is raised to [`Self::MIN_INTERVAL_SECS`] (zero
    ///   would be a busy loop).
    /// - `interval_secs` and `initial_delay_secs` are capped to
    ///   [`Self::MAX_INTERVAL_SECS`].
    pub fn validated(mut self) -> Self {
        if self.interval_secs < Self::MIN_INTERVAL_SECS {
            warn!(
                interval_secs = self.interval_secs,
                min = Self::MIN_INTERVAL_SECS,
                "monitor interval below minimum; clamping"
            );
            self.interval_secs = Self::MIN_INTERVAL_SECS;
        }
        if self.interval_secs > Self::MAX_INTERVAL_SECS {
            warn!(
                interval_secs = self.interval_secs,
                max = Self::MAX_INTERVAL_SECS,
                "monitor interval above maximum; clamping"
            );
            self.interval_secs = Self::MAX_INTERVAL_SECS;
        }
        if let Some(delay) = self.initial_delay_secs.filter(|d| *d > Self::MAX_INTERVAL_SECS) {
            warn!(
                initial_delay_secs = delay,
                max = Self::MAX_INTERVAL_SECS,
                "monitor initial delay above maximum; clamping"
            );
            self.initial_delay_secs = Some(Self::MAX_INTERVAL_SECS);
        }
        self
    }

    /// Time between ticks, within the accepted range.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(
            self.interval_secs
                .clamp(Self::MIN_INTERVAL_SECS, Self::MAX_INTERVAL_SECS),
        )
    }

    /// Time until the first tick, never above the maximum interval.
    pub fn initial_delay(&self) -> Duration {
        self.initial_delay_secs
            .map(|d| Duration::from_secs(d.min(Self::MAX_INTERVAL_SECS)))
            .unwrap_or_else(|| self.interval())
    }
}
