//! Session manager configuration.

use std::time::Duration;

use liftguard_monitor::MonitorConfig;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Timing and lockout settings for a [`SessionManager`](crate::SessionManager).
///
/// Every field has a default, so a partial JSON document deserializes into
/// a complete config:
///
/// ```rust
/// use liftguard_session::SessionConfig;
///
/// let cfg: SessionConfig = serde_json::from_str(r#"{"max_failed_attempts": 5}"#).unwrap();
/// assert_eq!(cfg.max_failed_attempts, 5);
/// assert_eq!(cfg.lockout_duration_secs, 300);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Consecutive failed logins that trigger a lockout. Default: 3.
    pub max_failed_attempts: u32,

    /// How long a lockout lasts, in seconds. Default: 300.
    pub lockout_duration_secs: u64,

    /// Lead time before token expiry at which a refresh is triggered,
    /// in seconds. Default: 300.
    pub refresh_buffer_secs: u64,

    /// Seconds between background monitor checks. Default: 60.
    pub monitor_interval_secs: u64,

    /// Seconds without user activity before the session is ended.
    /// Default: 1800. 0 disables the idle timeout.
    pub idle_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_failed_attempts: 3,
            lockout_duration_secs: 300,
            refresh_buffer_secs: 300,
            monitor_interval_secs: 60,
            idle_timeout_secs: 30 * 60,
        }
    }
}

impl SessionConfig {
    /// Longest lockout window accepted (30 days). Anything higher is
    /// clamped down so the window end stays representable.
    pub const MAX_LOCKOUT_DURATION_SECS: u64 = 30 * 24 * 60 * 60;

    /// Fix out-of-range values so the config is safe to use.
    ///
    /// Called automatically when a manager is built. Rules:
    /// - `max_failed_attempts` is at least 1 (0 would lock out before the
    ///   first attempt).
    /// - `lockout_duration_secs` is at most
    ///   [`Self::MAX_LOCKOUT_DURATION_SECS`].
    /// - `monitor_interval_secs` lies within
    ///   [`MonitorConfig::MIN_INTERVAL_SECS`]..=[`MonitorConfig::MAX_INTERVAL_SECS`].
    pub fn validated(mut self) -> Self {
        if self.max_failed_attempts == 0 {
            warn!("max_failed_attempts is 0; using 1");
            self.max_failed_attempts = 1;
        }
        if self.lockout_duration_secs > Self::MAX_LOCKOUT_DURATION_SECS {
            warn!(
                duration = self.lockout_duration_secs,
                max = Self::MAX_LOCKOUT_DURATION_SECS,
                "lockout_duration_secs above maximum; clamping"
            );
            self.lockout_duration_secs = Self::MAX_LOCKOUT_DURATION_SECS;
        }
        let interval = self
            .monitor_interval_secs
            .clamp(MonitorConfig::MIN_INTERVAL_SECS, MonitorConfig::MAX_INTERVAL_SECS);
        if interval != self.monitor_interval_secs {
            warn!(
                interval = self.monitor_interval_secs,
                clamped = interval,
                "monitor_interval_secs out of range; clamping"
            );
            self.monitor_interval_secs = interval;
        }
        self
    }

    /// Lockout window length, never above the maximum.
    pub fn lockout_duration(&self) -> Duration {
        Duration::from_secs(
            self.lockout_duration_secs
                .min(Self::MAX_LOCKOUT_DURATION_SECS),
        )
    }

    /// Refresh lead time.
    pub fn refresh_buffer(&self) -> Duration {
        Duration::from_secs(self.refresh_buffer_secs)
    }

    /// Idle timeout, or `None` when disabled.
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }

    /// The monitor settings derived from this config.
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig::with_interval(self.monitor_interval_secs)
    }
}
