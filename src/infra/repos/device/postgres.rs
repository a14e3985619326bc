use anyhow::{anyhow, Result};
use sqlx::postgres::PgRow;
use sqlx::Row;
use time::OffsetDateTime;
use uuid::Uuid;

use super::DeviceRepo;
use crate::domain::device::{Device, DeviceRegistration, Platform, PushTarget};
use crate::infra::db::Db;

const DEVICE_COLUMNS: &str = "id, user_id, device_identifier, platform, push_token, device_name, \
     app_version, os_version, last_seen_at, created_at";

pub struct PostgresDeviceRepo {
    db: Db,
}

impl PostgresDeviceRepo {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

fn parse_platform(row: &PgRow) -> Result<Platform> {
    let platform: String = row.get("platform");
    Platform::from_db(&platform).ok_or_else(|| anyhow!("unknown device platform: {}", platform))
}

fn device_from_row(row: &PgRow) -> Result<Device> {
    Ok(Device {
        id: row.get("id"),
        user_id: row.get("user_id"),
        device_identifier: row.get("device_identifier"),
        platform: parse_platform(row)?,
        push_token: row.get("push_token"),
        device_name: row.get("device_name"),
        app_version: row.get("app_version"),
        os_version: row.get("os_version"),
        last_seen_at: row.get("last_seen_at"),
        created_at: row.get("created_at"),
    })
}

fn target_from_row(row: &PgRow) -> Result<PushTarget> {
    Ok(PushTarget {
        device_id: row.get("id"),
        platform: parse_platform(row)?,
        token: row.get("push_token"),
    })
}

#[async_trait::async_trait]
impl DeviceRepo for PostgresDeviceRepo {
    async fn upsert(&self, registration: &DeviceRegistration, now: OffsetDateTime) -> Result<Device> {
        let mut tx = self.db.pool().begin().await?;

        sqlx::query("DELETE FROM devices WHERE device_identifier = $1 AND user_id <> $2")
            .bind(&registration.device_identifier)
            .bind(registration.user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "DELETE FROM devices \
             WHERE user_id = $1 AND push_token = $2 AND device_identifier <> $3",
        )
        .bind(registration.user_id)
        .bind(&registration.push_token)
        .bind(&registration.device_identifier)
        .execute(&mut *tx)
        .await?;

        let sql = format!(
            "INSERT INTO devices \
             (id, user_id, device_identifier, platform, push_token, device_name, app_version, \
              os_version, last_seen_at, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9) \
             ON CONFLICT (device_identifier) DO UPDATE \
             SET platform = EXCLUDED.platform, \
                 push_token = EXCLUDED.push_token, \
                 device_name = COALESCE(EXCLUDED.device_name, devices.device_name), \
                 app_version = COALESCE(EXCLUDED.app_version, devices.app_version), \
                 os_version = COALESCE(EXCLUDED.os_version, devices.os_version), \
                 last_seen_at = EXCLUDED.last_seen_at \
             RETURNING {}",
            DEVICE_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(Uuid::new_v4())
            .bind(registration.user_id)
            .bind(&registration.device_identifier)
            .bind(registration.platform.as_db())
            .bind(&registration.push_token)
            .bind(&registration.device_name)
            .bind(&registration.app_version)
            .bind(&registration.os_version)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        device_from_row(&row)
    }

    async fn find(&self, device_id: Uuid) -> Result<Option<Device>> {
        let sql = format!("SELECT {} FROM devices WHERE id = $1", DEVICE_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(device_id)
            .fetch_optional(self.db.pool())
            .await?;
        row.as_ref().map(device_from_row).transpose()
    }

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Device>> {
        let sql = format!(
            "SELECT {} FROM devices WHERE user_id = $1 ORDER BY last_seen_at DESC",
            DEVICE_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .fetch_all(self.db.pool())
            .await?;
        rows.iter().map(device_from_row).collect()
    }

    async fn delete(&self, user_id: Uuid, device_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM devices WHERE id = $1 AND user_id = $2")
            .bind(device_id)
            .bind(user_id)
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_by_push_token(&self, push_token: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM devices WHERE push_token = $1")
            .bind(push_token)
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_stale(&self, last_seen_before: OffsetDateTime) -> Result<u64> {
        let result = sqlx::query("DELETE FROM devices WHERE last_seen_at < $1")
            .bind(last_seen_before)
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected())
    }

    async fn touch(&self, device_id: Uuid, now: OffsetDateTime) -> Result<()> {
        sqlx::query("UPDATE devices SET last_seen_at = $2 WHERE id = $1")
            .bind(device_id)
            .bind(now)
            .execute(self.db.pool())
            .await?;
        Ok(())
    }

    async fn get_all_push_tokens(&self, user_id: Uuid) -> Result<Vec<PushTarget>> {
        let rows = sqlx::query(
            "SELECT DISTINCT ON (push_token) id, platform, push_token \
             FROM devices \
             WHERE user_id = $1 AND push_token <> '' \
             ORDER BY push_token, last_seen_at DESC",
        )
        .bind(user_id)
        .fetch_all(self.db.pool())
        .await?;
        rows.iter().map(target_from_row).collect()
    }

    async fn get_push_tokens_excluding(&self, user_id: Uuid, device_id: Uuid) -> Result<Vec<PushTarget>> {
        let rows = sqlx::query(
            "SELECT DISTINCT ON (d.push_token) d.id, d.platform, d.push_token \
             FROM devices d \
             WHERE d.user_id = $1 \
               AND d.id <> $2 \
               AND d.push_token <> '' \
               AND d.push_token NOT IN (SELECT push_token FROM devices WHERE id = $2) \
             ORDER BY d.push_token, d.last_seen_at DESC",
        )
        .bind(user_id)
        .bind(device_id)
        .fetch_all(self.db.pool())
        .await?;
        rows.iter().map(target_from_row).collect()
    }
}
