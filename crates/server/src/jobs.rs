use std::time::Duration;

use chrono::{Local, NaiveDateTime, NaiveTime, TimeDelta};
use controller::Controller;
use tokio::{
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::{error, info};

/// Runs a reconciliation pass every `period`. A slow pass delays the next one
/// instead of piling up.
pub fn spawn_reconcile_loop(controller: Controller, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match controller.reconcile(false).await {
                Ok(report) if report.dispatched > 0 || report.failed > 0 => info!(
                    dispatched = report.dispatched,
                    unchanged = report.unchanged,
                    skipped = report.skipped,
                    failed = report.failed,
                    "jobs: reconcile tick"
                ),
                Ok(_) => {}
                Err(error) => error!(%error, "jobs: reconcile tick failed"),
            }
        }
    })
}

/// Resets offsets and overrides once a day at `hour` local time.
pub fn spawn_daily_reset(controller: Controller, hour: u32) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let wait = until_next_run(Local::now().naive_local(), hour);
            info!(hour, wait_seconds = wait.as_secs(), "jobs: daily reset scheduled");
            time::sleep(wait).await;
            match controller.reset_daily_offsets_and_overrides().await {
                Ok(report) => info!(
                    offsets_reset = report.offsets_reset,
                    overrides_reset = report.overrides_reset,
                    "jobs: daily reset done"
                ),
                Err(error) => error!(%error, "jobs: daily reset failed"),
            }
        }
    })
}

/// Time from `now` until the next `hour:00:00`, strictly in the future.
pub fn until_next_run(now: NaiveDateTime, hour: u32) -> Duration {
    let at = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or_default();
    let mut next = now.date().and_time(at);
    if next <= now {
        next += TimeDelta::days(1);
    }
    (next - now).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
#[path = "tests/jobs_tests.rs"]
mod tests;
