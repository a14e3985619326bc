use anyhow::{anyhow, Result};
use sqlx::postgres::PgRow;
use sqlx::Row;
use time::OffsetDateTime;
use uuid::Uuid;

use super::ReminderRepo;
use crate::domain::reminder::{Reminder, ReminderStatus};
use crate::infra::db::Db;

const REMINDER_COLUMNS: &str = "id, user_id, list_id, title, notes, due_at, all_day, status, \
     completed_at, notification_sent_at, snooze_count, is_alarm, sound_id, local_id, version, \
     last_modified_by, created_at, updated_at";

pub struct PostgresReminderRepo {
    db: Db,
}

impl PostgresReminderRepo {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

fn reminder_from_row(row: &PgRow) -> Result<Reminder> {
    let status: String = row.get("status");
    let status = ReminderStatus::from_db(&status)
        .ok_or_else(|| anyhow!("unknown reminder status: {}", status))?;

    Ok(Reminder {
        id: row.get("id"),
        user_id: row.get("user_id"),
        list_id: row.get("list_id"),
        title: row.get("title"),
        notes: row.get("notes"),
        due_at: row.get("due_at"),
        all_day: row.get("all_day"),
        status,
        completed_at: row.get("completed_at"),
        notification_sent_at: row.get("notification_sent_at"),
        snooze_count: row.get("snooze_count"),
        is_alarm: row.get("is_alarm"),
        sound_id: row.get("sound_id"),
        local_id: row.get("local_id"),
        version: row.get("version"),
        last_modified_by: row.get("last_modified_by"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait::async_trait]
impl ReminderRepo for PostgresReminderRepo {
    async fn insert(&self, reminder: &Reminder) -> Result<()> {
        sqlx::query(
            "INSERT INTO reminders \
             (id, user_id, list_id, title, notes, due_at, all_day, status, completed_at, \
              notification_sent_at, snooze_count, is_alarm, sound_id, local_id, version, \
              last_modified_by, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)",
        )
        .bind(reminder.id)
        .bind(reminder.user_id)
        .bind(reminder.list_id)
        .bind(&reminder.title)
        .bind(&reminder.notes)
        .bind(reminder.due_at)
        .bind(reminder.all_day)
        .bind(reminder.status.as_db())
        .bind(reminder.completed_at)
        .bind(reminder.notification_sent_at)
        .bind(reminder.snooze_count)
        .bind(reminder.is_alarm)
        .bind(&reminder.sound_id)
        .bind(&reminder.local_id)
        .bind(reminder.version)
        .bind(reminder.last_modified_by)
        .bind(reminder.created_at)
        .bind(reminder.updated_at)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    async fn find(&self, user_id: Uuid, reminder_id: Uuid) -> Result<Option<Reminder>> {
        let sql = format!(
            "SELECT {} FROM reminders WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL",
            REMINDER_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(reminder_id)
            .bind(user_id)
            .fetch_optional(self.db.pool())
            .await?;
        row.as_ref().map(reminder_from_row).transpose()
    }

    async fn find_by_local_id(&self, user_id: Uuid, local_id: &str) -> Result<Option<Reminder>> {
        let sql = format!(
            "SELECT {} FROM reminders \
             WHERE user_id = $1 AND local_id = $2 AND deleted_at IS NULL",
            REMINDER_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(user_id)
            .bind(local_id)
            .fetch_optional(self.db.pool())
            .await?;
        row.as_ref().map(reminder_from_row).transpose()
    }

    async fn list(&self, user_id: Uuid, status: Option<ReminderStatus>) -> Result<Vec<Reminder>> {
        let sql = format!(
            "SELECT {} FROM reminders \
             WHERE user_id = $1 AND deleted_at IS NULL \
               AND ($2::text IS NULL OR status = $2) \
             ORDER BY due_at ASC NULLS LAST, created_at ASC",
            REMINDER_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .bind(status.map(|status| status.as_db()))
            .fetch_all(self.db.pool())
            .await?;
        rows.iter().map(reminder_from_row).collect()
    }

    async fn list_in_list(&self, user_id: Uuid, list_id: Uuid) -> Result<Vec<Reminder>> {
        let sql = format!(
            "SELECT {} FROM reminders \
             WHERE user_id = $1 AND list_id = $2 AND deleted_at IS NULL \
             ORDER BY created_at ASC",
            REMINDER_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .bind(list_id)
            .fetch_all(self.db.pool())
            .await?;
        rows.iter().map(reminder_from_row).collect()
    }

    async fn open_counts_by_list(&self, user_id: Uuid) -> Result<Vec<(Uuid, i64)>> {
        let rows: Vec<(Uuid, i64)> = sqlx::query_as(
            "SELECT list_id, COUNT(*) FROM reminders \
             WHERE user_id = $1 AND list_id IS NOT NULL AND deleted_at IS NULL \
               AND status IN ('active', 'snoozed') \
             GROUP BY list_id",
        )
        .bind(user_id)
        .fetch_all(self.db.pool())
        .await?;
        Ok(rows)
    }

    async fn update(&self, reminder: &Reminder, expected_version: i32, rearm: bool) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE reminders \
             SET list_id = $3, title = $4, notes = $5, due_at = $6, all_day = $7, status = $8, \
                 completed_at = $9, snooze_count = $10, is_alarm = $11, sound_id = $12, \
                 version = $13, last_modified_by = $14, updated_at = $15, \
                 notification_sent_at = CASE WHEN $16 THEN NULL ELSE notification_sent_at END \
             WHERE id = $1 AND version = $2 AND deleted_at IS NULL",
        )
        .bind(reminder.id)
        .bind(expected_version)
        .bind(reminder.list_id)
        .bind(&reminder.title)
        .bind(&reminder.notes)
        .bind(reminder.due_at)
        .bind(reminder.all_day)
        .bind(reminder.status.as_db())
        .bind(reminder.completed_at)
        .bind(reminder.snooze_count)
        .bind(reminder.is_alarm)
        .bind(&reminder.sound_id)
        .bind(reminder.version)
        .bind(reminder.last_modified_by)
        .bind(reminder.updated_at)
        .bind(rearm)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn soft_delete(
        &self,
        user_id: Uuid,
        reminder_id: Uuid,
        device_id: Option<Uuid>,
        now: OffsetDateTime,
    ) -> Result<Option<Reminder>> {
        let sql = format!(
            "UPDATE reminders \
             SET deleted_at = $3, updated_at = $3, version = version + 1, last_modified_by = $4 \
             WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL \
             RETURNING {}",
            REMINDER_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(reminder_id)
            .bind(user_id)
            .bind(now)
            .bind(device_id)
            .fetch_optional(self.db.pool())
            .await?;
        row.as_ref().map(reminder_from_row).transpose()
    }

    async fn find_due_for_notification(&self, now: OffsetDateTime, limit: i64) -> Result<Vec<Reminder>> {
        let sql = format!(
            "SELECT {} FROM reminders \
             WHERE due_at IS NOT NULL \
               AND status = 'active' \
               AND due_at <= $1 \
               AND notification_sent_at IS NULL \
               AND deleted_at IS NULL \
             ORDER BY due_at ASC \
             LIMIT $2",
            REMINDER_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(now)
            .bind(limit)
            .fetch_all(self.db.pool())
            .await?;
        rows.iter().map(reminder_from_row).collect()
    }

    async fn claim_notification(
        &self,
        reminder_id: Uuid,
        due_at: OffsetDateTime,
        at: OffsetDateTime,
    ) -> Result<Option<Reminder>> {
        let sql = format!(
            "UPDATE reminders SET notification_sent_at = $3 \
             WHERE id = $1 \
               AND due_at = $2 \
               AND status = 'active' \
               AND notification_sent_at IS NULL \
               AND deleted_at IS NULL \
             RETURNING {}",
            REMINDER_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(reminder_id)
            .bind(due_at)
            .bind(at)
            .fetch_optional(self.db.pool())
            .await?;
        row.as_ref().map(reminder_from_row).transpose()
    }

    async fn release_notification(&self, reminder_id: Uuid, due_at: OffsetDateTime) -> Result<()> {
        sqlx::query(
            "UPDATE reminders SET notification_sent_at = NULL \
             WHERE id = $1 AND due_at = $2",
        )
        .bind(reminder_id)
        .bind(due_at)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }
}
