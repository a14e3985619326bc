use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::app::error::ServiceError;
use crate::app::hub::PubSubHub;
use crate::app::propagation::ActionPropagator;
use crate::app::reminders::Actor;
use crate::app::sync_log::SyncLog;
use crate::domain::live::{ChangeAction, LiveEvent};
use crate::domain::reminder_list::{
    validate_color_hex, validate_name, NewReminderList, ReminderList, ReminderListPatch,
    ReminderListSummary,
};
use crate::domain::sync_event::{EntityType, NewSyncEvent, SyncAction};
use crate::infra::clock::Clock;
use crate::infra::repos::{ReminderListRepo, ReminderRepo};

/// List mutations follow the same path as reminder ones: store, sync log,
/// live feed, then a sync ping to the user's other devices. Lists are not
/// cross-device actions, so no alert-style push is sent.
#[derive(Clone)]
pub struct ReminderListService {
    lists: Arc<dyn ReminderListRepo>,
    reminders: Arc<dyn ReminderRepo>,
    sync_log: SyncLog,
    hub: Arc<PubSubHub>,
    propagator: ActionPropagator,
    clock: Arc<dyn Clock>,
}

impl ReminderListService {
    pub fn new(
        lists: Arc<dyn ReminderListRepo>,
        reminders: Arc<dyn ReminderRepo>,
        sync_log: SyncLog,
        hub: Arc<PubSubHub>,
        propagator: ActionPropagator,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            lists,
            reminders,
            sync_log,
            hub,
            propagator,
            clock,
        }
    }

    pub async fn create(&self, actor: Actor, mut input: NewReminderList) -> Result<ReminderList, ServiceError> {
        validate_name(&input.name).map_err(ServiceError::invalid)?;
        if let Some(color) = input.color_hex.as_deref() {
            validate_color_hex(color).map_err(ServiceError::invalid)?;
        }
        input.name = input.name.trim().to_string();

        let sort_order = i32::try_from(self.lists.count(actor.user_id).await?).unwrap_or(i32::MAX);
        let list = ReminderList::new(actor.user_id, input, sort_order, self.clock.now());
        self.lists.insert(&list).await?;
        info!(user_id = %actor.user_id, list_id = %list.id, "reminder list created");

        self.after_change(actor, &list, SyncAction::Create, ChangeAction::Created).await;
        Ok(list)
    }

    pub async fn get(&self, user_id: Uuid, list_id: Uuid) -> Result<Option<ReminderListSummary>, ServiceError> {
        let Some(list) = self.lists.find(user_id, list_id).await? else {
            return Ok(None);
        };
        let counts = self.open_counts(user_id).await?;
        Ok(Some(summarize(list, &counts)))
    }

    /// All lists of the user, creating the default one on first call.
    pub async fn list(&self, actor: Actor) -> Result<Vec<ReminderListSummary>, ServiceError> {
        self.ensure_default(actor).await?;
        let lists = self.lists.list(actor.user_id).await?;
        let counts = self.open_counts(actor.user_id).await?;
        Ok(lists
            .into_iter()
            .map(|list| summarize(list, &counts))
            .collect())
    }

    pub async fn ensure_default(&self, actor: Actor) -> Result<ReminderList, ServiceError> {
        if let Some(list) = self.lists.find_default(actor.user_id).await? {
            return Ok(list);
        }

        let list = ReminderList::default_for(actor.user_id, self.clock.now());
        if self.lists.insert_default(&list).await? {
            info!(user_id = %actor.user_id, list_id = %list.id, "default list created");
            self.after_change(actor, &list, SyncAction::Create, ChangeAction::Created).await;
            return Ok(list);
        }

        // lost the race to a concurrent first listing
        self.lists
            .find_default(actor.user_id)
            .await?
            .ok_or_else(|| ServiceError::Conflict("default list is being created, retry".to_string()))
    }

    pub async fn update(
        &self,
        actor: Actor,
        list_id: Uuid,
        mut patch: ReminderListPatch,
    ) -> Result<Option<ReminderList>, ServiceError> {
        if let Some(name) = patch.name.as_deref() {
            validate_name(name).map_err(ServiceError::invalid)?;
        }
        if let Some(color) = patch.color_hex.as_deref() {
            validate_color_hex(color).map_err(ServiceError::invalid)?;
        }
        patch.name = patch.name.map(|name| name.trim().to_string());

        let Some(mut list) = self.lists.find(actor.user_id, list_id).await? else {
            return Ok(None);
        };
        patch.apply(&mut list);
        list.updated_at = self.clock.now();
        if !self.lists.update(&list).await? {
            return Ok(None);
        }
        self.after_change(actor, &list, SyncAction::Update, ChangeAction::Updated).await;
        Ok(Some(list))
    }

    /// Deletes the list and every reminder filed under it.
    pub async fn delete(&self, actor: Actor, list_id: Uuid) -> Result<bool, ServiceError> {
        let Some(list) = self.lists.find(actor.user_id, list_id).await? else {
            return Ok(false);
        };
        if list.is_default {
            return Err(ServiceError::invalid("the default list cannot be deleted"));
        }

        let now = self.clock.now();
        let Some(list) = self.lists.soft_delete(actor.user_id, list_id, now).await? else {
            return Ok(false);
        };

        let mut cascaded = 0;
        for reminder in self.reminders.list_in_list(actor.user_id, list_id).await? {
            let Some(deleted) = self
                .reminders
                .soft_delete(actor.user_id, reminder.id, actor.device_id, now)
                .await?
            else {
                continue;
            };
            self.sync_log
                .record_or_log(NewSyncEvent {
                    user_id: actor.user_id,
                    entity_type: EntityType::Reminder,
                    entity_id: deleted.id,
                    action: SyncAction::Delete,
                    payload: serde_json::to_value(&deleted).unwrap_or(serde_json::Value::Null),
                    device_id: actor.device_id,
                })
                .await;
            let event = LiveEvent::for_reminder(ChangeAction::Deleted, &deleted, actor.device_id, now);
            self.hub.broadcast_to_user(actor.user_id, &event);
            cascaded += 1;
        }
        info!(user_id = %actor.user_id, list_id = %list.id, cascaded, "reminder list deleted");
        self.after_change(actor, &list, SyncAction::Delete, ChangeAction::Deleted).await;
        Ok(true)
    }

    /// Assigns `sort_order` by position. Every id must name one of the
    /// user's lists; lists left out keep their order.
    pub async fn reorder(
        &self,
        actor: Actor,
        list_ids: Vec<Uuid>,
    ) -> Result<Vec<ReminderListSummary>, ServiceError> {
        let mut lists = Vec::with_capacity(list_ids.len());
        for list_id in &list_ids {
            match self.lists.find(actor.user_id, *list_id).await? {
                Some(list) => lists.push(list),
                None => return Err(ServiceError::invalid(format!("unknown list_id {}", list_id))),
            }
        }

        let now = self.clock.now();
        for (position, mut list) in lists.into_iter().enumerate() {
            let sort_order = i32::try_from(position).unwrap_or(i32::MAX);
            if list.sort_order == sort_order {
                continue;
            }
            list.sort_order = sort_order;
            list.updated_at = now;
            if self.lists.update(&list).await? {
                self.after_change(actor, &list, SyncAction::Update, ChangeAction::Updated).await;
            }
        }

        self.list(actor).await
    }

    async fn open_counts(&self, user_id: Uuid) -> Result<HashMap<Uuid, i64>, ServiceError> {
        Ok(self
            .reminders
            .open_counts_by_list(user_id)
            .await?
            .into_iter()
            .collect())
    }

    async fn after_change(&self, actor: Actor, list: &ReminderList, action: SyncAction, change: ChangeAction) {
        self.sync_log
            .record_or_log(NewSyncEvent {
                user_id: actor.user_id,
                entity_type: EntityType::ReminderList,
                entity_id: list.id,
                action,
                payload: serde_json::to_value(list).unwrap_or(serde_json::Value::Null),
                device_id: actor.device_id,
            })
            .await;

        let event = LiveEvent::for_list(change, list, actor.device_id, self.clock.now());
        let delivered = self.hub.broadcast_to_user(actor.user_id, &event);
        debug!(user_id = %actor.user_id, list_id = %list.id, delivered, "list change broadcast");
        self.propagator.request_sync(actor.user_id, actor.device_id);
    }
}

fn summarize(list: ReminderList, counts: &HashMap<Uuid, i64>) -> ReminderListSummary {
    let reminder_count = counts.get(&list.id).copied().unwrap_or(0);
    ReminderListSummary {
        list,
        reminder_count,
    }
}
