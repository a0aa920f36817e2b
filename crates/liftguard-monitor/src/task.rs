//! The background task that drives a job from a [`MonitorScheduler`].

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::{MonitorConfig, MonitorScheduler, TickInfo};

/// Handle to a running monitor task.
///
/// Dropping the handle signals cancellation too: the task notices the
/// closed channel and exits before its next tick. It never aborts a job
/// that is already running, so a job is always allowed to finish the
/// state change it started.
pub struct MonitorHandle {
    name: &'static str,
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
    jobs_run: Arc<AtomicU64>,
}

impl MonitorHandle {
    /// Ask the task to exit without waiting for it.
    ///
    /// Safe to call from inside the job itself, where awaiting
    /// [`stop`](Self::stop) would wait on the current task forever.
    pub fn cancel(&self) {
        // `send_replace` succeeds even when the receiver is already gone.
        self.cancel.send_replace(true);
    }

    /// Ask the task to exit and wait until it has.
    ///
    /// If a job is mid-run it completes first. Never call this from
    /// inside the job; use [`cancel`](Self::cancel) there.
    pub async fn stop(self) {
        self.cancel();
        match self.task.await {
            Ok(()) => tracing::debug!(monitor = self.name, "monitor stopped"),
            Err(e) if e.is_panic() => {
                tracing::error!(monitor = self.name, "monitor task panicked")
            }
            Err(_) => tracing::debug!(monitor = self.name, "monitor task aborted"),
        }
    }

    /// `true` once the task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Number of jobs that ran to completion.
    pub fn jobs_run(&self) -> u64 {
        self.jobs_run.load(Ordering::SeqCst)
    }
}

/// Spawns a Tokio task that calls `job` on every tick.
///
/// Job errors are logged and the loop carries on. The returned handle
/// stops the loop.
pub fn spawn<F, Fut, E>(name: &'static str, config: MonitorConfig, mut job: F) -> MonitorHandle
where
    F: FnMut(TickInfo) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let (cancel_tx, mut cancel_rx) = watch::channel(false);
    let jobs_run = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&jobs_run);

    let task = tokio::spawn(async move {
        let mut scheduler = MonitorScheduler::new(config);
        tracing::debug!(monitor = name, "monitor started");

        loop {
            let tick = tokio::select! {
                // Cancellation wins ties so a stopped monitor never runs
                // one extra job.
                biased;
                changed = cancel_rx.changed() => {
                    if changed.is_err() || *cancel_rx.borrow() {
                        break;
                    }
                    continue;
                }
                tick = scheduler.wait_for_tick() => tick,
            };

            if let Err(e) = job(tick.clone()).await {
                tracing::warn!(monitor = name, tick = tick.tick, error = %e, "monitor job failed");
            }
            counter.fetch_add(1, Ordering::SeqCst);

            if *cancel_rx.borrow() {
                break;
            }
        }

        tracing::debug!(
            monitor = name,
            ticks = scheduler.tick_count(),
            "monitor loop exited"
        );
    });

    MonitorHandle {
        name,
        cancel: cancel_tx,
        task,
        jobs_run,
    }
}
