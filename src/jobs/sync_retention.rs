use anyhow::Result;
use std::sync::Arc;
use time::Duration;
use tracing::info;

use crate::app::sync_log::SyncLog;
use crate::infra::clock::Clock;

/// Reclaims sync events past the retention horizon. Clients that stay
/// offline longer than that fall back to a full fetch.
#[derive(Clone)]
pub struct SyncRetentionJob {
    sync_log: SyncLog,
    clock: Arc<dyn Clock>,
    retention: Duration,
}

impl SyncRetentionJob {
    pub fn new(sync_log: SyncLog, clock: Arc<dyn Clock>, retention_days: i64) -> Self {
        Self {
            sync_log,
            clock,
            retention: Duration::days(retention_days),
        }
    }

    pub async fn run(&self) -> Result<u64> {
        let cutoff = self.clock.now() - self.retention;
        let removed = self.sync_log.sweep(cutoff).await?;
        info!(removed, cutoff = %cutoff, "old sync events removed");
        Ok(removed)
    }
}
