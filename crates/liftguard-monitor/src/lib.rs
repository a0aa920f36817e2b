//! Cancellable periodic monitor for liftguard.
//!
//! The session manager keeps one background task alive while a user is
//! logged in. Every tick it checks whether the access token is about to
//! expire (and refreshes it ahead of time) and whether the session has gone
//! idle. This crate provides the timing half of that:
//!
//! - [`MonitorScheduler`]: a fixed-interval scheduler that skips ticks
//!   missed while the host was suspended instead of replaying them
//! - [`spawn`] / [`MonitorHandle`]: runs a job on every tick in a Tokio
//!   task that can be stopped deterministically
//!
//! # Integration
//!
//! ```ignore
//! let handle = liftguard_monitor::spawn("session-monitor", config, move |tick| {
//!     let manager = weak.clone();
//!     async move { check(manager, tick).await }
//! });
//! // ... later, on logout:
//! handle.stop().await;
//! ```

mod config;
mod scheduler;
mod task;

pub use config::MonitorConfig;
pub use scheduler::{MonitorScheduler, MonitorStats, TickInfo};
pub use task::{MonitorHandle, spawn};
