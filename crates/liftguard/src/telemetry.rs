//! Logging setup for hosts that don't install their own subscriber.
//!
//! liftguard itself only emits `tracing` events. Security events go to the
//! `liftguard::security` target when a
//! [`TracingEventLog`](liftguard_session::TracingEventLog) is used, so
//! `RUST_LOG=liftguard::security=info` isolates the audit trail.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::LiftguardError;

/// Installs a global `fmt` subscriber. `RUST_LOG` wins over
/// `default_filter` when set.
///
/// # Errors
/// [`LiftguardError::Telemetry`] if a global subscriber is already set.
pub fn init(default_filter: &str) -> Result<(), LiftguardError> {
    tracing_subscriber::registry()
        .with(filter(default_filter))
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
        .map_err(|e| LiftguardError::Telemetry(e.to_string()))
}

fn filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}
