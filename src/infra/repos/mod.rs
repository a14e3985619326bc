mod device;
mod reminder;
mod reminder_list;
mod sync_event;

pub use device::{DeviceRepo, InMemoryDeviceRepo, PostgresDeviceRepo};
pub use reminder::{InMemoryReminderRepo, PostgresReminderRepo, ReminderRepo};
pub use reminder_list::{InMemoryReminderListRepo, PostgresReminderListRepo, ReminderListRepo};
pub use sync_event::{InMemorySyncEventRepo, PostgresSyncEventRepo, SyncEventRepo};

use std::sync::Arc;

use crate::infra::db::Db;

#[derive(Clone)]
pub struct Repos {
    pub reminders: Arc<dyn ReminderRepo>,
    pub lists: Arc<dyn ReminderListRepo>,
    pub devices: Arc<dyn DeviceRepo>,
    pub sync_events: Arc<dyn SyncEventRepo>,
    /// Backing pool, absent for the in-memory set.
    pub db: Option<Db>,
}

impl Repos {
    pub async fn ping(&self) -> anyhow::Result<()> {
        match &self.db {
            Some(db) => db.ping().await,
            None => Ok(()),
        }
    }

    pub fn create_postgres(db: Db) -> Self {
        Self {
            reminders: Arc::new(PostgresReminderRepo::new(db.clone())),
            lists: Arc::new(PostgresReminderListRepo::new(db.clone())),
            devices: Arc::new(PostgresDeviceRepo::new(db.clone())),
            sync_events: Arc::new(PostgresSyncEventRepo::new(db.clone())),
            db: Some(db),
        }
    }

    pub fn create_inmemory() -> Self {
        Self {
            reminders: Arc::new(InMemoryReminderRepo::new()),
            lists: Arc::new(InMemoryReminderListRepo::new()),
            devices: Arc::new(InMemoryDeviceRepo::new()),
            sync_events: Arc::new(InMemorySyncEventRepo::new()),
            db: None,
        }
    }
}
