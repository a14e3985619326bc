use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};
use tracing::{error, warn};

/// Detached fire-and-forget work (cross-device pushes, sync pings).
/// At most `concurrency` tasks run at once; each is cut off after `timeout`.
/// Failures only reach the log.
#[derive(Clone)]
pub struct BackgroundTasks {
    permits: Arc<Semaphore>,
    timeout: Duration,
    in_flight: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl BackgroundTasks {
    pub fn new(concurrency: usize, timeout: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            timeout,
            in_flight: Arc::new(AtomicUsize::new(0)),
            idle: Arc::new(Notify::new()),
        }
    }

    pub fn spawn<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let tasks = self.clone();

        tokio::spawn(async move {
            match tasks.permits.clone().acquire_owned().await {
                Ok(_permit) => match tokio::time::timeout(tasks.timeout, task).await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => warn!(task = name, error = ?err, "background task failed"),
                    Err(_) => warn!(task = name, timeout = ?tasks.timeout, "background task timed out"),
                },
                Err(err) => error!(task = name, error = %err, "background pool closed"),
            }

            if tasks.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
                tasks.idle.notify_waiters();
            }
        });
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Resolves once nothing is queued or running. Used on shutdown and in tests.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}
