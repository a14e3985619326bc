use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use tracing::{debug, info};
use uuid::Uuid;

use crate::app::error::ServiceError;
use crate::app::hub::PubSubHub;
use crate::app::propagation::ActionPropagator;
use crate::app::sync_log::SyncLog;
use crate::domain::live::{ChangeAction, LiveEvent};
use crate::domain::notification::CrossDeviceAction;
use crate::domain::reminder::{validate_title, NewReminder, Reminder, ReminderPatch, ReminderStatus};
use crate::domain::sync_event::{EntityType, NewSyncEvent, SyncAction};
use crate::infra::clock::Clock;
use crate::infra::repos::{ReminderListRepo, ReminderRepo};

pub const MIN_SNOOZE_MINUTES: i64 = 1;
pub const MAX_SNOOZE_MINUTES: i64 = 1440;
const MAX_WRITE_ATTEMPTS: usize = 3;

/// Who is acting: the user, and the device the request came from when known.
#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub user_id: Uuid,
    pub device_id: Option<Uuid>,
}

/// Reminder mutations. Each one writes the store, appends to the sync log,
/// broadcasts to live subscribers and queues pushes for the other devices,
/// in that order.
#[derive(Clone)]
pub struct ReminderService {
    reminders: Arc<dyn ReminderRepo>,
    lists: Arc<dyn ReminderListRepo>,
    sync_log: SyncLog,
    hub: Arc<PubSubHub>,
    propagator: ActionPropagator,
    clock: Arc<dyn Clock>,
}

impl ReminderService {
    pub fn new(
        reminders: Arc<dyn ReminderRepo>,
        lists: Arc<dyn ReminderListRepo>,
        sync_log: SyncLog,
        hub: Arc<PubSubHub>,
        propagator: ActionPropagator,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            reminders,
            lists,
            sync_log,
            hub,
            propagator,
            clock,
        }
    }

    pub async fn create(&self, actor: Actor, mut input: NewReminder) -> Result<Reminder, ServiceError> {
        validate_title(&input.title).map_err(ServiceError::invalid)?;
        input.title = input.title.trim().to_string();
        if let Some(list_id) = input.list_id {
            self.check_list(actor.user_id, list_id).await?;
        }

        if let Some(local_id) = input.local_id.as_deref() {
            if let Some(existing) = self
                .reminders
                .find_by_local_id(actor.user_id, local_id)
                .await?
            {
                debug!(reminder_id = %existing.id, local_id, "create replayed, returning existing reminder");
                return Ok(existing);
            }
        }

        let reminder = Reminder::new(actor.user_id, input, actor.device_id, self.clock.now());
        self.reminders.insert(&reminder).await?;
        info!(user_id = %actor.user_id, reminder_id = %reminder.id, "reminder created");

        self.after_change(actor, &reminder, SyncAction::Create, ChangeAction::Created, None)
            .await;
        Ok(reminder)
    }

    pub async fn get(&self, user_id: Uuid, reminder_id: Uuid) -> Result<Option<Reminder>, ServiceError> {
        Ok(self.reminders.find(user_id, reminder_id).await?)
    }

    pub async fn list(
        &self,
        user_id: Uuid,
        status: Option<ReminderStatus>,
    ) -> Result<Vec<Reminder>, ServiceError> {
        Ok(self.reminders.list(user_id, status).await?)
    }

    pub async fn update(
        &self,
        actor: Actor,
        reminder_id: Uuid,
        patch: ReminderPatch,
    ) -> Result<Option<Reminder>, ServiceError> {
        if let Some(title) = patch.title.as_deref() {
            validate_title(title).map_err(ServiceError::invalid)?;
        }
        if let Some(Some(list_id)) = patch.list_id {
            self.check_list(actor.user_id, list_id).await?;
        }

        let updated = self
            .mutate(actor, reminder_id, |reminder, now| {
                let mut patch = patch.clone();
                patch.title = patch.title.map(|title| title.trim().to_string());
                let rearm = patch.apply(reminder);
                match reminder.status {
                    ReminderStatus::Completed if reminder.completed_at.is_none() => {
                        reminder.completed_at = Some(now);
                    }
                    ReminderStatus::Completed => {}
                    _ => reminder.completed_at = None,
                }
                rearm
            })
            .await?;

        if let Some(reminder) = &updated {
            self.after_change(actor, reminder, SyncAction::Update, ChangeAction::Updated, None)
                .await;
        }
        Ok(updated)
    }

    pub async fn snooze(
        &self,
        actor: Actor,
        reminder_id: Uuid,
        minutes: i64,
    ) -> Result<Option<Reminder>, ServiceError> {
        if !(MIN_SNOOZE_MINUTES..=MAX_SNOOZE_MINUTES).contains(&minutes) {
            return Err(ServiceError::invalid("snooze minutes must be between 1 and 1440"));
        }

        let snoozed = self
            .mutate(actor, reminder_id, |reminder, now| {
                reminder.snooze_until(now + Duration::minutes(minutes));
                true
            })
            .await?;

        if let Some(reminder) = &snoozed {
            self.after_change(
                actor,
                reminder,
                SyncAction::Update,
                ChangeAction::Updated,
                Some(CrossDeviceAction::Snooze),
            )
            .await;
        }
        Ok(snoozed)
    }

    pub async fn complete(&self, actor: Actor, reminder_id: Uuid) -> Result<Option<Reminder>, ServiceError> {
        let completed = self
            .mutate(actor, reminder_id, |reminder, now| {
                reminder.complete(now);
                false
            })
            .await?;

        if let Some(reminder) = &completed {
            self.after_change(
                actor,
                reminder,
                SyncAction::Update,
                ChangeAction::Updated,
                Some(CrossDeviceAction::Complete),
            )
            .await;
        }
        Ok(completed)
    }

    pub async fn dismiss(&self, actor: Actor, reminder_id: Uuid) -> Result<Option<Reminder>, ServiceError> {
        let dismissed = self
            .mutate(actor, reminder_id, |reminder, _| {
                reminder.dismiss();
                false
            })
            .await?;

        if let Some(reminder) = &dismissed {
            self.after_change(
                actor,
                reminder,
                SyncAction::Update,
                ChangeAction::Updated,
                Some(CrossDeviceAction::Dismiss),
            )
            .await;
        }
        Ok(dismissed)
    }

    pub async fn delete(&self, actor: Actor, reminder_id: Uuid) -> Result<bool, ServiceError> {
        let deleted = self
            .reminders
            .soft_delete(actor.user_id, reminder_id, actor.device_id, self.clock.now())
            .await?;

        match deleted {
            Some(reminder) => {
                info!(user_id = %actor.user_id, reminder_id = %reminder.id, "reminder deleted");
                self.after_change(
                    actor,
                    &reminder,
                    SyncAction::Delete,
                    ChangeAction::Deleted,
                    Some(CrossDeviceAction::Delete),
                )
                .await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn check_list(&self, user_id: Uuid, list_id: Uuid) -> Result<(), ServiceError> {
        match self.lists.find(user_id, list_id).await? {
            Some(_) => Ok(()),
            None => Err(ServiceError::invalid("unknown list_id")),
        }
    }

    /// Read-modify-write guarded by the version column. `change` returns
    /// whether the notification guard must be reset.
    async fn mutate<F>(
        &self,
        actor: Actor,
        reminder_id: Uuid,
        mut change: F,
    ) -> Result<Option<Reminder>, ServiceError>
    where
        F: FnMut(&mut Reminder, OffsetDateTime) -> bool,
    {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let Some(mut reminder) = self.reminders.find(actor.user_id, reminder_id).await? else {
                return Ok(None);
            };
            let expected_version = reminder.version;
            let now = self.clock.now();
            let rearm = change(&mut reminder, now);
            reminder.touch(actor.device_id, now);

            if self.reminders.update(&reminder, expected_version, rearm).await? {
                return Ok(Some(reminder));
            }
            debug!(reminder_id = %reminder_id, attempt, "reminder version moved, retrying");
        }

        Err(ServiceError::Conflict(
            "reminder was modified concurrently, retry".to_string(),
        ))
    }

    async fn after_change(
        &self,
        actor: Actor,
        reminder: &Reminder,
        sync_action: SyncAction,
        change: ChangeAction,
        cross_device: Option<CrossDeviceAction>,
    ) {
        let snapshot = serde_json::to_value(reminder).unwrap_or(serde_json::Value::Null);
        self.sync_log
            .record_or_log(NewSyncEvent {
                user_id: actor.user_id,
                entity_type: EntityType::Reminder,
                entity_id: reminder.id,
                action: sync_action,
                payload: snapshot,
                device_id: actor.device_id,
            })
            .await;

        let event = LiveEvent::for_reminder(change, reminder, actor.device_id, self.clock.now());
        let delivered = self.hub.broadcast_to_user(actor.user_id, &event);
        debug!(user_id = %actor.user_id, delivered, "live event broadcast");

        if let Some(action) = cross_device {
            self.propagator
                .propagate(actor.user_id, actor.device_id, reminder.id, action);
        }
        self.propagator.request_sync(actor.user_id, actor.device_id);
    }
}
