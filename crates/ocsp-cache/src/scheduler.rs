//! Periodic refresh loop
//!
//! Runs a sweep every fetch interval. After a sweep with failures the next
//! sweep comes sooner: the retry delay doubles per consecutive failed sweep
//! and never exceeds the fetch interval.

use crate::config::FetchConfig;
use crate::refresh::{RefreshCoordinator, SweepReport};
use chrono::{TimeDelta, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

pub struct RefreshScheduler {
    coordinator: Arc<RefreshCoordinator>,
    interval: Duration,
    retry_delay: Duration,
}

impl RefreshScheduler {
    pub fn new(coordinator: Arc<RefreshCoordinator>, interval: Duration, retry_delay: Duration) -> Self {
        Self {
            coordinator,
            interval,
            retry_delay: retry_delay.min(interval),
        }
    }

    pub fn from_config(coordinator: Arc<RefreshCoordinator>, config: &FetchConfig) -> Self {
        Self::new(coordinator, config.fetch_interval(), config.retry_delay())
    }

    /// Delay before the next sweep
    pub fn next_delay(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures == 0 {
            return self.interval;
        }
        let factor = 2u32.saturating_pow(consecutive_failures - 1);
        self.retry_delay
            .checked_mul(factor)
            .map_or(self.interval, |delay| delay.min(self.interval))
    }

    /// Re-seed diagnostics and sweep once
    pub async fn run_once(&self) -> SweepReport {
        let now = Utc::now();
        let next = TimeDelta::from_std(self.interval)
            .ok()
            .and_then(|interval| now.checked_add_signed(interval))
            .unwrap_or(now);
        self.coordinator
            .fetcher()
            .diagnostics()
            .initialize(&self.coordinator.trust().authorities(), next);
        self.coordinator.sweep(now).await
    }

    /// Sweep until `shutdown` turns true or its sender is dropped
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "Refresh scheduler started");
        let mut consecutive_failures = 0u32;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let report = self.run_once().await;
            consecutive_failures = if report.succeeded() {
                0
            } else {
                consecutive_failures.saturating_add(1)
            };

            let delay = self.next_delay(consecutive_failures);
            debug!(
                delay_secs = delay.as_secs(),
                consecutive_failures = consecutive_failures,
                "Next refresh sweep scheduled"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Refresh scheduler stopped");
    }
}
