use anyhow::Result;
use sqlx::postgres::PgRow;
use sqlx::Row;
use time::OffsetDateTime;
use uuid::Uuid;

use super::ReminderListRepo;
use crate::domain::reminder_list::ReminderList;
use crate::infra::db::Db;

const LIST_COLUMNS: &str =
    "id, user_id, name, color_hex, icon_name, sort_order, is_default, created_at, updated_at";

pub struct PostgresReminderListRepo {
    db: Db,
}

impl PostgresReminderListRepo {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

fn list_from_row(row: &PgRow) -> ReminderList {
    ReminderList {
        id: row.get("id"),
        user_id: row.get("user_id"),
        name: row.get("name"),
        color_hex: row.get("color_hex"),
        icon_name: row.get("icon_name"),
        sort_order: row.get("sort_order"),
        is_default: row.get("is_default"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[async_trait::async_trait]
impl ReminderListRepo for PostgresReminderListRepo {
    async fn insert(&self, list: &ReminderList) -> Result<()> {
        sqlx::query(
            "INSERT INTO reminder_lists \
             (id, user_id, name, color_hex, icon_name, sort_order, is_default, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(list.id)
        .bind(list.user_id)
        .bind(&list.name)
        .bind(&list.color_hex)
        .bind(&list.icon_name)
        .bind(list.sort_order)
        .bind(list.is_default)
        .bind(list.created_at)
        .bind(list.updated_at)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    async fn insert_default(&self, list: &ReminderList) -> Result<bool> {
        // reminder_lists_one_default_idx arbitrates concurrent first listings
        let result = sqlx::query(
            "INSERT INTO reminder_lists \
             (id, user_id, name, color_hex, icon_name, sort_order, is_default, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, true, $7, $8) \
             ON CONFLICT (user_id) WHERE is_default AND deleted_at IS NULL DO NOTHING",
        )
        .bind(list.id)
        .bind(list.user_id)
        .bind(&list.name)
        .bind(&list.color_hex)
        .bind(&list.icon_name)
        .bind(list.sort_order)
        .bind(list.created_at)
        .bind(list.updated_at)
        .execute(self.db.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find(&self, user_id: Uuid, list_id: Uuid) -> Result<Option<ReminderList>> {
        let sql = format!(
            "SELECT {} FROM reminder_lists WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL",
            LIST_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(list_id)
            .bind(user_id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(row.as_ref().map(list_from_row))
    }

    async fn find_default(&self, user_id: Uuid) -> Result<Option<ReminderList>> {
        let sql = format!(
            "SELECT {} FROM reminder_lists \
             WHERE user_id = $1 AND is_default AND deleted_at IS NULL",
            LIST_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(user_id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(row.as_ref().map(list_from_row))
    }

    async fn list(&self, user_id: Uuid) -> Result<Vec<ReminderList>> {
        let sql = format!(
            "SELECT {} FROM reminder_lists \
             WHERE user_id = $1 AND deleted_at IS NULL \
             ORDER BY sort_order ASC, created_at ASC",
            LIST_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .fetch_all(self.db.pool())
            .await?;
        Ok(rows.iter().map(list_from_row).collect())
    }

    async fn count(&self, user_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM reminder_lists WHERE user_id = $1 AND deleted_at IS NULL",
        )
        .bind(user_id)
        .fetch_one(self.db.pool())
        .await?;
        Ok(count)
    }

    async fn update(&self, list: &ReminderList) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE reminder_lists \
             SET name = $3, color_hex = $4, icon_name = $5, sort_order = $6, updated_at = $7 \
             WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL",
        )
        .bind(list.id)
        .bind(list.user_id)
        .bind(&list.name)
        .bind(&list.color_hex)
        .bind(&list.icon_name)
        .bind(list.sort_order)
        .bind(list.updated_at)
        .execute(self.db.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn soft_delete(&self, user_id: Uuid, list_id: Uuid, now: OffsetDateTime) -> Result<Option<ReminderList>> {
        let sql = format!(
            "UPDATE reminder_lists SET deleted_at = $3, updated_at = $3 \
             WHERE id = $1 AND user_id = $2 AND NOT is_default AND deleted_at IS NULL \
             RETURNING {}",
            LIST_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(list_id)
            .bind(user_id)
            .bind(now)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(row.as_ref().map(list_from_row))
    }
}
