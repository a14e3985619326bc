pub mod device_cleanup;
pub mod due_reminders;
pub mod scheduler;
pub mod sync_retention;

use anyhow::{anyhow, Result};
use std::future::Future;
use std::time::Duration;

use device_cleanup::DeviceCleanupJob;
use due_reminders::{DueReminderScanner, ScanReport};
use sync_retention::SyncRetentionJob;

/// Entry points shared by the cron endpoints and the worker loop.
#[derive(Clone)]
pub struct Jobs {
    pub scanner: DueReminderScanner,
    pub device_cleanup: DeviceCleanupJob,
    pub sync_retention: SyncRetentionJob,
    timeout: Duration,
}

impl Jobs {
    pub fn new(
        scanner: DueReminderScanner,
        device_cleanup: DeviceCleanupJob,
        sync_retention: SyncRetentionJob,
        timeout: Duration,
    ) -> Self {
        Self {
            scanner,
            device_cleanup,
            sync_retention,
            timeout,
        }
    }

    /// The scanner enforces its own deadline and reports partial progress.
    pub async fn run_due_notifications(&self) -> Result<ScanReport> {
        self.scanner.run().await
    }

    pub async fn run_device_cleanup(&self) -> Result<u64> {
        with_deadline("device_cleanup", self.timeout, self.device_cleanup.run()).await
    }

    pub async fn run_sync_retention(&self) -> Result<u64> {
        with_deadline("sync_retention", self.timeout, self.sync_retention.run()).await
    }
}

async fn with_deadline<T>(
    name: &str,
    timeout: Duration,
    job: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(timeout, job)
        .await
        .map_err(|_| anyhow!("{} exceeded {:?}", name, timeout))?
}
