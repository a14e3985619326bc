use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info};

use crate::jobs::Jobs;

const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Seconds until the next multiple of `interval_secs`, so scans line up on
/// wall-clock boundaries (for a 60s interval, the top of each minute).
pub fn get_start_delay(now_ts: i64, interval_secs: u64) -> u64 {
    let interval_secs = interval_secs.max(1);
    let elapsed = now_ts.rem_euclid(interval_secs as i64) as u64;
    if elapsed == 0 {
        0
    } else {
        interval_secs - elapsed
    }
}

/// Worker-mode loop: due-reminder scans on `scan_interval`, maintenance once
/// a day. Runs until the surrounding task is cancelled.
pub async fn run(jobs: Jobs, now_ts: i64, scan_interval: Duration) {
    let delay = get_start_delay(now_ts, scan_interval.as_secs());
    info!(delay_secs = delay, interval = ?scan_interval, "job scheduler started");

    let mut scans = interval_at(Instant::now() + Duration::from_secs(delay), scan_interval);
    scans.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut maintenance = interval_at(Instant::now() + MAINTENANCE_INTERVAL, MAINTENANCE_INTERVAL);
    maintenance.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = scans.tick() => {
                if let Err(err) = jobs.run_due_notifications().await {
                    error!(error = ?err, "due reminder scan failed");
                }
            }
            _ = maintenance.tick() => {
                if let Err(err) = jobs.run_device_cleanup().await {
                    error!(error = ?err, "device cleanup failed");
                }
                if let Err(err) = jobs.run_sync_retention().await {
                    error!(error = ?err, "sync retention failed");
                }
            }
        }
    }
}
