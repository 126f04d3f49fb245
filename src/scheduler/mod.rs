//! Job scheduling: the daily rebalance and periodic portfolio reports.
//!
//! Times are wall-clock local time. Each job is a spawned task that sleeps
//! until its next fire time; stopping the scheduler aborts them.

use crate::error::{RebalanceError, Result};
use crate::strategy::{PortfolioSummary, RebalanceExecutor, RebalanceReport};
use chrono::{Duration as ChronoDuration, Local, NaiveDateTime, NaiveTime, Timelike};
use rust_decimal_macros::dec;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const MINUTES_PER_DAY: u32 = 24 * 60;

/// A time of day, parsed from `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyTime(NaiveTime);

impl DailyTime {
    pub fn new(hour: u32, minute: u32) -> Result<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0)
            .map(Self)
            .ok_or_else(|| {
                RebalanceError::Configuration(format!("invalid time of day {}:{}", hour, minute))
            })
    }

    pub fn hour(&self) -> u32 {
        self.0.hour()
    }

    pub fn minute(&self) -> u32 {
        self.0.minute()
    }

    /// Next occurrence strictly after `now`.
    pub fn next_after(&self, now: NaiveDateTime) -> NaiveDateTime {
        let today = now.date().and_time(self.0);
        if today > now {
            today
        } else {
            today + ChronoDuration::days(1)
        }
    }
}

impl FromStr for DailyTime {
    type Err = RebalanceError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || RebalanceError::Configuration(format!("expected HH:MM, got '{}'", s));

        let (hour, minute) = s.trim().split_once(':').ok_or_else(invalid)?;
        let hour: u32 = hour.parse().map_err(|_| invalid())?;
        let minute: u32 = minute.parse().map_err(|_| invalid())?;

        Self::new(hour, minute).map_err(|_| invalid())
    }
}

impl fmt::Display for DailyTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

/// Next multiple of `interval_minutes` after local midnight, strictly after `now`.
pub fn next_report_boundary(now: NaiveDateTime, interval_minutes: u32) -> NaiveDateTime {
    let interval = interval_minutes.clamp(1, MINUTES_PER_DAY);
    let elapsed = now.hour() * 60 + now.minute();
    let next = (elapsed / interval + 1) * interval;

    now.date().and_time(NaiveTime::MIN) + ChronoDuration::minutes(i64::from(next))
}

fn sleep_duration_until(target: NaiveDateTime) -> Duration {
    (target - Local::now().naive_local())
        .to_std()
        .unwrap_or_default()
}

/// A running background job.
#[derive(Debug)]
pub struct ScheduledJob {
    pub name: String,
    handle: JoinHandle<()>,
}

impl ScheduledJob {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Owns the rebalance and reporting jobs for one executor.
pub struct TradingScheduler {
    executor: Arc<RebalanceExecutor>,
    jobs: Vec<ScheduledJob>,
}

impl TradingScheduler {
    pub fn new(executor: Arc<RebalanceExecutor>) -> Self {
        Self {
            executor,
            jobs: Vec::new(),
        }
    }

    /// Rebalance once a day at `at`.
    pub fn schedule_rebalancing(&mut self, at: DailyTime) {
        self.spawn_job(
            format!("daily-rebalance@{}", at),
            move || {
                let next = at.next_after(Local::now().naive_local());
                debug!(%next, "Next scheduled rebalance");
                sleep_duration_until(next)
            },
            run_scheduled_rebalance,
        );
    }

    /// Log a portfolio summary every `interval_minutes`, aligned to midnight.
    pub fn schedule_reporting(&mut self, interval_minutes: u32) {
        self.spawn_job(
            format!("report-every-{}m", interval_minutes),
            move || {
                sleep_duration_until(next_report_boundary(
                    Local::now().naive_local(),
                    interval_minutes,
                ))
            },
            run_scheduled_report,
        );
    }

    /// Spawn a loop that sleeps for `next_delay()` and then runs `tick`.
    /// A tick never ends the loop; its failures are logged inside it.
    fn spawn_job<D, T, F>(&mut self, name: String, next_delay: D, tick: T)
    where
        D: Fn() -> Duration + Send + 'static,
        T: Fn(Arc<RebalanceExecutor>) -> F + Send + 'static,
        F: Future<Output = ()> + Send + 'static,
    {
        let executor = self.executor.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(next_delay()).await;
                tick(executor.clone()).await;
            }
        });

        self.push_job(name, handle);
    }

    fn push_job(&mut self, name: String, handle: JoinHandle<()>) {
        info!(job = %name, "Job scheduled");
        self.jobs.push(ScheduledJob { name, handle });
    }

    /// Manual rebalance through the same in-flight gate as the daily job.
    pub async fn trigger_rebalance(&self) -> Result<RebalanceReport> {
        info!("Manual rebalance triggered");
        self.executor.execute_rebalance().await
    }

    pub async fn portfolio_status(&self) -> Result<PortfolioSummary> {
        self.executor.manager().portfolio_summary().await
    }

    /// Abort every job and forget it.
    pub fn stop_all(&mut self) {
        for job in self.jobs.drain(..) {
            job.handle.abort();
            info!(job = %job.name, "Job stopped");
        }
    }

    pub fn active_schedules(&self) -> Vec<&str> {
        self.jobs.iter().map(|j| j.name.as_str()).collect()
    }
}

impl Drop for TradingScheduler {
    fn drop(&mut self) {
        for job in &self.jobs {
            job.handle.abort();
        }
    }
}

async fn run_scheduled_rebalance(executor: Arc<RebalanceExecutor>) {
    info!("⏰ [SCHEDULE] Running scheduled portfolio rebalancing");
    match executor.execute_rebalance().await {
        Ok(report) => info!(
            executed = report.trades.len(),
            skipped = report.skipped.len(),
            "✅ [SCHEDULE] Scheduled rebalancing finished"
        ),
        Err(RebalanceError::RebalanceInProgress) => {
            warn!("[SCHEDULE] Skipping scheduled rebalancing, a run is already in progress")
        }
        Err(e) => error!(error = %e, "❌ [SCHEDULE] Scheduled rebalancing failed"),
    }
}

async fn run_scheduled_report(executor: Arc<RebalanceExecutor>) {
    match executor.manager().portfolio_summary().await {
        Ok(summary) => log_summary(&summary),
        Err(e) => error!(error = %e, "❌ [REPORT] Portfolio report failed"),
    }
}

/// Emit a portfolio summary at info level.
pub fn log_summary(summary: &PortfolioSummary) {
    info!(
        total_value = %summary.total_value.round_dp(2),
        rebalance_needed = summary.rebalance_needed,
        max_drift = %(summary.max_drift() * dec!(100)).round_dp(2),
        "📊 [REPORT] Portfolio summary"
    );
    for p in &summary.positions {
        info!(
            "   {}: {} @ ${} = ${} | {:.2}% (target {:.2}%){}",
            p.symbol,
            p.balance,
            p.price,
            p.value.round_dp(2),
            p.current_weight * dec!(100),
            p.target_weight * dec!(100),
            if p.needs_rebalancing { " ⚠️" } else { "" }
        );
    }
}
