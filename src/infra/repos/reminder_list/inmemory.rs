use anyhow::Result;
use std::sync::{Mutex, MutexGuard};
use time::OffsetDateTime;
use uuid::Uuid;

use super::ReminderListRepo;
use crate::domain::reminder_list::ReminderList;

struct StoredList {
    list: ReminderList,
    deleted_at: Option<OffsetDateTime>,
}

impl StoredList {
    fn live(&self) -> Option<&ReminderList> {
        match self.deleted_at {
            Some(_) => None,
            None => Some(&self.list),
        }
    }
}

pub struct InMemoryReminderListRepo {
    lists: Mutex<Vec<StoredList>>,
}

impl InMemoryReminderListRepo {
    pub fn new() -> Self {
        Self {
            lists: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<StoredList>> {
        self.lists
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for InMemoryReminderListRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ReminderListRepo for InMemoryReminderListRepo {
    async fn insert(&self, list: &ReminderList) -> Result<()> {
        self.lock().push(StoredList {
            list: list.clone(),
            deleted_at: None,
        });
        Ok(())
    }

    async fn insert_default(&self, list: &ReminderList) -> Result<bool> {
        let mut lists = self.lock();
        let exists = lists
            .iter()
            .filter_map(StoredList::live)
            .any(|l| l.user_id == list.user_id && l.is_default);
        if exists {
            return Ok(false);
        }
        lists.push(StoredList {
            list: list.clone(),
            deleted_at: None,
        });
        Ok(true)
    }

    async fn find(&self, user_id: Uuid, list_id: Uuid) -> Result<Option<ReminderList>> {
        Ok(self
            .lock()
            .iter()
            .filter_map(StoredList::live)
            .find(|l| l.id == list_id && l.user_id == user_id)
            .cloned())
    }

    async fn find_default(&self, user_id: Uuid) -> Result<Option<ReminderList>> {
        Ok(self
            .lock()
            .iter()
            .filter_map(StoredList::live)
            .find(|l| l.user_id == user_id && l.is_default)
            .cloned())
    }

    async fn list(&self, user_id: Uuid) -> Result<Vec<ReminderList>> {
        let mut lists: Vec<ReminderList> = self
            .lock()
            .iter()
            .filter_map(StoredList::live)
            .filter(|l| l.user_id == user_id)
            .cloned()
            .collect();
        lists.sort_by_key(|l| (l.sort_order, l.created_at));
        Ok(lists)
    }

    async fn count(&self, user_id: Uuid) -> Result<i64> {
        let count = self
            .lock()
            .iter()
            .filter_map(StoredList::live)
            .filter(|l| l.user_id == user_id)
            .count();
        Ok(i64::try_from(count)?)
    }

    async fn update(&self, list: &ReminderList) -> Result<bool> {
        let mut lists = self.lock();
        let stored = lists.iter_mut().find(|stored| {
            stored.deleted_at.is_none()
                && stored.list.id == list.id
                && stored.list.user_id == list.user_id
        });
        match stored {
            Some(stored) => {
                let is_default = stored.list.is_default;
                stored.list = list.clone();
                stored.list.is_default = is_default;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn soft_delete(&self, user_id: Uuid, list_id: Uuid, now: OffsetDateTime) -> Result<Option<ReminderList>> {
        let mut lists = self.lock();
        let stored = lists.iter_mut().find(|stored| {
            stored.deleted_at.is_none()
                && !stored.list.is_default
                && stored.list.id == list_id
                && stored.list.user_id == user_id
        });
        Ok(stored.map(|stored| {
            stored.deleted_at = Some(now);
            stored.list.updated_at = now;
            stored.list.clone()
        }))
    }
}
