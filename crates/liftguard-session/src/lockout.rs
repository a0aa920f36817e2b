//! Brute-force lockout state machine.
//!
//! ```text
//!            failure (n+1 < max)
//!          ┌───────────┐
//!          ▼           │
//!   Open{n} ───────────┘
//!     │  ▲
//!     │  └──────── success / window elapsed ────────┐
//!     │ failure (n+1 == max)                         │
//!     ▼                                              │
//!   Locked{until} ── login attempts rejected ────────┘
//! ```
//!
//! The state is plain data so it can be persisted as-is; the manager owns
//! the only mutable copy.

use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::SessionConfig;

/// Failed-login bookkeeping.
///
/// Invariant: `lockout_until.is_some()` implies
/// `failed_attempts >= max_failed_attempts`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockoutState {
    /// Consecutive failed logins since the last success or reset.
    pub failed_attempts: u32,

    /// End of the current lockout window, if one is active (or elapsed but
    /// not yet reset).
    pub lockout_until: Option<SystemTime>,
}

/// What a recorded failure did to the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FailureOutcome {
    /// The counter went up; this many attempts remain before a lockout.
    Counted {
        /// Failed attempts so far.
        attempts: u32,
        /// Attempts left before the lockout triggers.
        remaining: u32,
    },
    /// This failure reached the limit and opened a lockout window.
    Locked {
        /// When the window closes.
        until: SystemTime,
    },
}

/// What [`LockoutState::reconcile`] changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Reconciliation {
    /// Nothing to fix.
    Unchanged,
    /// The window had elapsed; the state was reset.
    Expired,
    /// The window ended implausibly far in the future (the clock went
    /// backwards or the configured duration shrank) and was shortened.
    Clamped,
    /// A window existed with too few recorded attempts; the count was
    /// raised to restore the invariant.
    Repaired,
}

impl LockoutState {
    /// `true` while a lockout window is open at `now`.
    pub fn is_locked(&self, now: SystemTime) -> bool {
        matches!(self.lockout_until, Some(until) if now < until)
    }

    /// Time left in the lockout window, or `None` if not locked.
    pub fn remaining(&self, now: SystemTime) -> Option<Duration> {
        let until = self.lockout_until?;
        until.duration_since(now).ok().filter(|d| !d.is_zero())
    }

    /// Seconds left in the lockout window, rounded up. Zero if not locked.
    pub fn remaining_secs(&self, now: SystemTime) -> u64 {
        self.remaining(now).map(ceil_secs).unwrap_or(0)
    }

    /// Records a failed login at `now`.
    pub(crate) fn record_failure(
        &mut self,
        now: SystemTime,
        config: &SessionConfig,
    ) -> FailureOutcome {
        self.failed_attempts = self.failed_attempts.saturating_add(1);

        if self.failed_attempts >= config.max_failed_attempts {
            let until = now + config.lockout_duration();
            self.lockout_until = Some(until);
            FailureOutcome::Locked { until }
        } else {
            FailureOutcome::Counted {
                attempts: self.failed_attempts,
                remaining: config.max_failed_attempts - self.failed_attempts,
            }
        }
    }

    /// Back to `{0, None}`.
    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }

    /// Resets the state if its lockout window has closed by `now`.
    /// Returns `true` if it did.
    pub(crate) fn expire_if_elapsed(&mut self, now: SystemTime) -> bool {
        match self.lockout_until {
            Some(until) if now >= until => {
                self.reset();
                true
            }
            _ => false,
        }
    }

    /// Brings a state loaded from storage in line with the current clock
    /// and config.
    ///
    /// The persisted `lockout_until` is an absolute wall-clock time, so it
    /// may have been written by a clock that disagrees with this one. A
    /// window can never legitimately end more than one lockout duration
    /// after `now`; anything beyond that is clamped to `now + duration`.
    pub(crate) fn reconcile(
        &mut self,
        now: SystemTime,
        config: &SessionConfig,
    ) -> Reconciliation {
        if self.expire_if_elapsed(now) {
            return Reconciliation::Expired;
        }

        let Some(until) = self.lockout_until else {
            return Reconciliation::Unchanged;
        };

        let latest = now + config.lockout_duration();
        if until > latest {
            self.lockout_until = Some(latest);
            self.failed_attempts = self.failed_attempts.max(config.max_failed_attempts);
            return Reconciliation::Clamped;
        }

        if self.failed_attempts < config.max_failed_attempts {
            self.failed_attempts = config.max_failed_attempts;
            return Reconciliation::Repaired;
        }

        Reconciliation::Unchanged
    }
}

fn ceil_secs(d: Duration) -> u64 {
    if d.subsec_nanos() > 0 {
        d.as_secs() + 1
    } else {
        d.as_secs()
    }
}
