//! Timer-driven world tick scheduler.
//!
//! [`run_scheduler`] wraps [`EconomyEngine::process_tick`] in a loop: each
//! period it optionally queues every active user, runs one tick, then
//! sleeps. Operators can still trigger ticks by hand through the engine;
//! the scheduler only adds a clock.
//!
//! # Architecture
//!
//! [`SchedulerControl`] is shared between the loop and whoever owns the
//! process lifecycle. Stop requests are an atomic flag plus a [`Notify`]
//! that cuts the current sleep short, so the loop exits between ticks and
//! never in the middle of one.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::engine::EconomyEngine;
use crate::tick::TickReport;

/// Why the scheduler stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulerEndReason {
    /// A stop was requested.
    Stopped,
    /// The configured tick limit was reached.
    TickLimitReached,
}

/// Scheduler settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Sleep between ticks. Zero runs ticks back to back.
    pub interval: Duration,
    /// Queue every active user before each tick.
    pub enqueue_active_users: bool,
    /// Stop after this many ticks (0 = unlimited).
    pub max_ticks: u64,
}

/// Result of a scheduler run.
#[derive(Debug, Clone)]
pub struct SchedulerResult {
    /// Why the loop ended.
    pub end_reason: SchedulerEndReason,
    /// Ticks the scheduler ran.
    pub total_ticks: u64,
    /// Ticks that could not drain the queue.
    pub failed_ticks: u64,
    /// The last successful report.
    pub last_report: Option<TickReport>,
}

/// Shared stop signal for the scheduler loop.
#[derive(Debug, Default)]
pub struct SchedulerControl {
    stop_requested: AtomicBool,
    wake: Notify,
}

impl SchedulerControl {
    /// A control with no stop requested.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the loop to exit after the current tick.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    /// Whether a stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    async fn sleep(&self, interval: Duration) {
        if interval.is_zero() {
            return;
        }
        tokio::select! {
            () = tokio::time::sleep(interval) => {}
            () = self.wake.notified() => {}
        }
    }
}

/// Run ticks until stopped or the tick limit is reached.
///
/// A tick whose queue cannot be drained is logged and counted; the loop
/// carries on with the next period.
pub async fn run_scheduler(
    engine: Arc<EconomyEngine>,
    config: SchedulerConfig,
    control: Arc<SchedulerControl>,
) -> SchedulerResult {
    let mut result = SchedulerResult {
        end_reason: SchedulerEndReason::Stopped,
        total_ticks: 0,
        failed_ticks: 0,
        last_report: None,
    };

    info!(
        interval_ms = u64::try_from(config.interval.as_millis()).unwrap_or(u64::MAX),
        enqueue_active_users = config.enqueue_active_users,
        max_ticks = config.max_ticks,
        "Tick scheduler starting"
    );

    loop {
        if control.is_stop_requested() {
            info!(total_ticks = result.total_ticks, "Tick scheduler stop requested");
            result.end_reason = SchedulerEndReason::Stopped;
            return result;
        }

        if config.enqueue_active_users {
            if let Err(error) = engine.enqueue_active_users().await {
                warn!(kind = %error.kind(), %error, "Failed to enqueue active users");
            }
        }

        match engine.process_tick().await {
            Ok(report) => result.last_report = Some(report),
            Err(error) => {
                warn!(kind = %error.kind(), %error, "World tick failed");
                result.failed_ticks = result.failed_ticks.saturating_add(1);
            }
        }
        result.total_ticks = result.total_ticks.saturating_add(1);

        if config.max_ticks > 0 && result.total_ticks >= config.max_ticks {
            info!(total_ticks = result.total_ticks, "Tick limit reached");
            result.end_reason = SchedulerEndReason::TickLimitReached;
            return result;
        }

        control.sleep(config.interval).await;
    }
}
