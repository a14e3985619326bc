use anyhow::Result;
use std::sync::Arc;
use time::Duration;
use tracing::info;

use crate::infra::clock::Clock;
use crate::infra::repos::DeviceRepo;

/// Drops devices that have not checked in for `stale_after`.
#[derive(Clone)]
pub struct DeviceCleanupJob {
    devices: Arc<dyn DeviceRepo>,
    clock: Arc<dyn Clock>,
    stale_after: Duration,
}

impl DeviceCleanupJob {
    pub fn new(devices: Arc<dyn DeviceRepo>, clock: Arc<dyn Clock>, stale_days: i64) -> Self {
        Self {
            devices,
            clock,
            stale_after: Duration::days(stale_days),
        }
    }

    pub async fn run(&self) -> Result<u64> {
        let cutoff = self.clock.now() - self.stale_after;
        let removed = self.devices.delete_stale(cutoff).await?;
        info!(removed, cutoff = %cutoff, "stale devices removed");
        Ok(removed)
    }
}
