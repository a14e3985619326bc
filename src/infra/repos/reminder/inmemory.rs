use anyhow::Result;
use std::sync::{Mutex, MutexGuard};
use time::OffsetDateTime;
use uuid::Uuid;

use super::ReminderRepo;
use crate::domain::reminder::{Reminder, ReminderStatus};

struct StoredReminder {
    reminder: Reminder,
    deleted_at: Option<OffsetDateTime>,
}

impl StoredReminder {
    fn live(&self) -> Option<&Reminder> {
        match self.deleted_at {
            Some(_) => None,
            None => Some(&self.reminder),
        }
    }
}

pub struct InMemoryReminderRepo {
    reminders: Mutex<Vec<StoredReminder>>,
}

impl InMemoryReminderRepo {
    pub fn new() -> Self {
        Self {
            reminders: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<StoredReminder>> {
        self.reminders
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for InMemoryReminderRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ReminderRepo for InMemoryReminderRepo {
    async fn insert(&self, reminder: &Reminder) -> Result<()> {
        self.lock().push(StoredReminder {
            reminder: reminder.clone(),
            deleted_at: None,
        });
        Ok(())
    }

    async fn find(&self, user_id: Uuid, reminder_id: Uuid) -> Result<Option<Reminder>> {
        Ok(self
            .lock()
            .iter()
            .filter_map(StoredReminder::live)
            .find(|r| r.id == reminder_id && r.user_id == user_id)
            .cloned())
    }

    async fn find_by_local_id(&self, user_id: Uuid, local_id: &str) -> Result<Option<Reminder>> {
        Ok(self
            .lock()
            .iter()
            .filter_map(StoredReminder::live)
            .find(|r| r.user_id == user_id && r.local_id.as_deref() == Some(local_id))
            .cloned())
    }

    async fn list(&self, user_id: Uuid, status: Option<ReminderStatus>) -> Result<Vec<Reminder>> {
        let mut reminders: Vec<Reminder> = self
            .lock()
            .iter()
            .filter_map(StoredReminder::live)
            .filter(|r| r.user_id == user_id && status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        // undated reminders sort last
        reminders.sort_by_key(|r| (r.due_at.is_none(), r.due_at, r.created_at));
        Ok(reminders)
    }

    async fn list_in_list(&self, user_id: Uuid, list_id: Uuid) -> Result<Vec<Reminder>> {
        Ok(self
            .lock()
            .iter()
            .filter_map(StoredReminder::live)
            .filter(|r| r.user_id == user_id && r.list_id == Some(list_id))
            .cloned()
            .collect())
    }

    async fn open_counts_by_list(&self, user_id: Uuid) -> Result<Vec<(Uuid, i64)>> {
        let mut counts: Vec<(Uuid, i64)> = Vec::new();
        let reminders = self.lock();
        let open = reminders.iter().filter_map(StoredReminder::live).filter(|r| {
            r.user_id == user_id
                && matches!(r.status, ReminderStatus::Active | ReminderStatus::Snoozed)
        });
        for list_id in open.filter_map(|r| r.list_id) {
            match counts.iter_mut().find(|(id, _)| *id == list_id) {
                Some((_, count)) => *count += 1,
                None => counts.push((list_id, 1)),
            }
        }
        Ok(counts)
    }

    async fn update(&self, reminder: &Reminder, expected_version: i32, rearm: bool) -> Result<bool> {
        let mut reminders = self.lock();
        let stored = reminders.iter_mut().find(|stored| {
            stored.deleted_at.is_none()
                && stored.reminder.id == reminder.id
                && stored.reminder.version == expected_version
        });

        match stored {
            Some(stored) => {
                let notification_sent_at = if rearm {
                    None
                } else {
                    stored.reminder.notification_sent_at
                };
                stored.reminder = reminder.clone();
                stored.reminder.notification_sent_at = notification_sent_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn soft_delete(
        &self,
        user_id: Uuid,
        reminder_id: Uuid,
        device_id: Option<Uuid>,
        now: OffsetDateTime,
    ) -> Result<Option<Reminder>> {
        let mut reminders = self.lock();
        let stored = reminders.iter_mut().find(|stored| {
            stored.deleted_at.is_none()
                && stored.reminder.id == reminder_id
                && stored.reminder.user_id == user_id
        });

        Ok(stored.map(|stored| {
            stored.deleted_at = Some(now);
            stored.reminder.touch(device_id, now);
            stored.reminder.clone()
        }))
    }

    async fn find_due_for_notification(&self, now: OffsetDateTime, limit: i64) -> Result<Vec<Reminder>> {
        let mut due: Vec<Reminder> = self
            .lock()
            .iter()
            .filter_map(StoredReminder::live)
            .filter(|r| r.is_due_for_notification(now))
            .cloned()
            .collect();
        due.sort_by_key(|r| r.due_at);
        due.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(due)
    }

    async fn claim_notification(
        &self,
        reminder_id: Uuid,
        due_at: OffsetDateTime,
        at: OffsetDateTime,
    ) -> Result<Option<Reminder>> {
        let mut reminders = self.lock();
        let stored = reminders.iter_mut().find(|stored| {
            stored.deleted_at.is_none()
                && stored.reminder.id == reminder_id
                && stored.reminder.due_at == Some(due_at)
                && stored.reminder.is_due_for_notification(at)
        });

        Ok(stored.map(|stored| {
            stored.reminder.notification_sent_at = Some(at);
            stored.reminder.clone()
        }))
    }

    async fn release_notification(&self, reminder_id: Uuid, due_at: OffsetDateTime) -> Result<()> {
        let mut reminders = self.lock();
        if let Some(stored) = reminders.iter_mut().find(|stored| {
            stored.reminder.id == reminder_id && stored.reminder.due_at == Some(due_at)
        }) {
            stored.reminder.notification_sent_at = None;
        }
        Ok(())
    }
}
