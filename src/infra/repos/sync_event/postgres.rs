use anyhow::{anyhow, Result};
use sqlx::postgres::PgRow;
use sqlx::Row;
use time::OffsetDateTime;
use uuid::Uuid;

use super::SyncEventRepo;
use crate::domain::sync_event::{ChangePage, EntityType, NewSyncEvent, SyncAction, SyncEvent};
use crate::infra::db::Db;

pub struct PostgresSyncEventRepo {
    db: Db,
}

impl PostgresSyncEventRepo {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

fn event_from_row(row: &PgRow) -> Result<SyncEvent> {
    let entity_type: String = row.get("entity_type");
    let action: String = row.get("action");

    Ok(SyncEvent {
        id: row.get("id"),
        user_id: row.get("user_id"),
        entity_type: EntityType::from_db(&entity_type)
            .ok_or_else(|| anyhow!("unknown entity type: {}", entity_type))?,
        entity_id: row.get("entity_id"),
        action: SyncAction::from_db(&action)
            .ok_or_else(|| anyhow!("unknown sync action: {}", action))?,
        payload: row.get("payload"),
        device_id: row.get("device_id"),
        created_at: row.get("created_at"),
    })
}

#[async_trait::async_trait]
impl SyncEventRepo for PostgresSyncEventRepo {
    async fn append(&self, event: &NewSyncEvent) -> Result<SyncEvent> {
        // clock_timestamp() differs per statement, unlike now() inside a transaction
        let row = sqlx::query(
            "INSERT INTO sync_events (id, user_id, entity_type, entity_id, action, payload, device_id, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, clock_timestamp()) \
             RETURNING id, user_id, entity_type, entity_id, action, payload, device_id, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(event.user_id)
        .bind(event.entity_type.as_db())
        .bind(event.entity_id)
        .bind(event.action.as_db())
        .bind(&event.payload)
        .bind(event.device_id)
        .fetch_one(self.db.pool())
        .await?;

        event_from_row(&row)
    }

    async fn changes_since(&self, user_id: Uuid, since: OffsetDateTime, limit: usize) -> Result<ChangePage> {
        let rows = sqlx::query(
            "SELECT id, user_id, entity_type, entity_id, action, payload, device_id, created_at \
             FROM sync_events \
             WHERE user_id = $1 AND created_at > $2 \
             ORDER BY created_at ASC \
             LIMIT $3",
        )
        .bind(user_id)
        .bind(since)
        .bind((limit + 1) as i64)
        .fetch_all(self.db.pool())
        .await?;

        let events = rows.iter().map(event_from_row).collect::<Result<Vec<_>>>()?;
        Ok(ChangePage::from_overfetch(events, limit))
    }

    async fn delete_older_than(&self, before: OffsetDateTime) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sync_events WHERE created_at < $1")
            .bind(before)
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected())
    }

    async fn latest_event_time(&self, user_id: Uuid) -> Result<Option<OffsetDateTime>> {
        let latest: Option<OffsetDateTime> =
            sqlx::query_scalar("SELECT MAX(created_at) FROM sync_events WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(self.db.pool())
                .await?;
        Ok(latest)
    }
}
