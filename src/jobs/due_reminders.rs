use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::app::dispatcher::NotificationDispatcher;
use crate::domain::notification::{
    Alert, NotificationKind, NotificationPayload, ALARM_CATEGORY, DEFAULT_SOUND, REMINDER_CATEGORY,
};
use crate::domain::reminder::Reminder;
use crate::infra::clock::Clock;
use crate::infra::repos::ReminderRepo;

/// Upper bound on reminders handled per scan; the rest wait for the next tick.
pub const DUE_BATCH_LIMIT: i64 = 500;

#[derive(Debug, Default, Clone, Serialize)]
pub struct ScanReport {
    pub processed: usize,
    /// Reminders notified on at least one device (or with no device to notify).
    pub sent: usize,
    pub failed: usize,
    /// Claimed by an overlapping scan, or changed since the due query ran.
    pub skipped: usize,
    /// Left for the next scan because the deadline passed.
    pub deferred: usize,
}

enum Outcome {
    Sent,
    Skipped,
    Failed,
}

/// Finds due reminders and notifies them at most once per due time.
///
/// Each reminder is claimed by setting `notification_sent_at` before anything
/// is sent. The claim re-checks that the reminder is still active, unclaimed
/// and due at the time the query saw, so overlapping scans never both
/// dispatch it and a reminder snoozed, completed or deleted in between is
/// skipped. The payload is built from the claimed row. The claim is released
/// when every attempted device fails, which makes the next scan the retry.
#[derive(Clone)]
pub struct DueReminderScanner {
    reminders: Arc<dyn ReminderRepo>,
    dispatcher: NotificationDispatcher,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl DueReminderScanner {
    pub fn new(
        reminders: Arc<dyn ReminderRepo>,
        dispatcher: NotificationDispatcher,
        clock: Arc<dyn Clock>,
        timeout: Duration,
    ) -> Self {
        Self {
            reminders,
            dispatcher,
            clock,
            timeout,
        }
    }

    pub async fn run(&self) -> Result<ScanReport> {
        self.run_at(self.clock.now()).await
    }

    pub async fn run_at(&self, now: OffsetDateTime) -> Result<ScanReport> {
        let deadline = Instant::now() + self.timeout;
        let due = self
            .reminders
            .find_due_for_notification(now, DUE_BATCH_LIMIT)
            .await?;

        let mut report = ScanReport::default();
        for (index, reminder) in due.iter().enumerate() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                report.deferred = due.len() - index;
                warn!(deferred = report.deferred, "scan deadline reached");
                break;
            }

            report.processed += 1;
            match tokio::time::timeout(remaining, self.notify(reminder, now)).await {
                Ok(Ok(Outcome::Sent)) => report.sent += 1,
                Ok(Ok(Outcome::Skipped)) => report.skipped += 1,
                Ok(Ok(Outcome::Failed)) => report.failed += 1,
                Ok(Err(err)) => {
                    report.failed += 1;
                    error!(error = ?err, reminder_id = %reminder.id, "failed to notify reminder");
                }
                Err(_) => {
                    // outcome unknown; hand it back to the next scan
                    report.failed += 1;
                    report.deferred = due.len() - index - 1;
                    self.release(reminder).await;
                    warn!(reminder_id = %reminder.id, deferred = report.deferred, "scan deadline reached mid-dispatch");
                    break;
                }
            }
        }

        info!(
            due = due.len(),
            sent = report.sent,
            failed = report.failed,
            skipped = report.skipped,
            deferred = report.deferred,
            "due reminder scan finished"
        );
        Ok(report)
    }

    async fn notify(&self, reminder: &Reminder, now: OffsetDateTime) -> Result<Outcome> {
        let Some(due_at) = reminder.due_at else {
            return Ok(Outcome::Skipped);
        };
        let Some(claimed) = self
            .reminders
            .claim_notification(reminder.id, due_at, now)
            .await?
        else {
            return Ok(Outcome::Skipped);
        };

        let payload = build_payload(&claimed);
        match self.dispatcher.deliver_to_user(claimed.user_id, &payload).await {
            Ok(delivery) if delivery.all_failed() => {
                warn!(
                    reminder_id = %claimed.id,
                    attempted = delivery.attempted,
                    "every device failed, will retry next scan"
                );
                self.release(&claimed).await;
                Ok(Outcome::Failed)
            }
            Ok(_) => Ok(Outcome::Sent),
            Err(err) => {
                self.release(&claimed).await;
                Err(err.into())
            }
        }
    }

    async fn release(&self, reminder: &Reminder) {
        let Some(due_at) = reminder.due_at else {
            return;
        };
        if let Err(err) = self.reminders.release_notification(reminder.id, due_at).await {
            error!(error = ?err, reminder_id = %reminder.id, "failed to release notification claim");
        }
    }
}

pub fn build_payload(reminder: &Reminder) -> NotificationPayload {
    let alert = Alert {
        title: reminder.title.clone(),
        body: reminder.notes.clone(),
        sound: reminder
            .sound_id
            .clone()
            .unwrap_or_else(|| DEFAULT_SOUND.to_string()),
        badge: None,
        category: Some(
            if reminder.is_alarm {
                ALARM_CATEGORY
            } else {
                REMINDER_CATEGORY
            }
            .to_string(),
        ),
    };

    let kind = if reminder.is_alarm {
        NotificationKind::AlarmDue {
            reminder_id: reminder.id,
            due_at: reminder.due_at,
            sound_id: reminder.sound_id.clone(),
            notes: reminder.notes.clone(),
        }
    } else {
        NotificationKind::ReminderDue {
            reminder_id: reminder.id,
            due_at: reminder.due_at,
            sound_id: reminder.sound_id.clone(),
            notes: reminder.notes.clone(),
        }
    };

    NotificationPayload::alert(alert, kind)
}
