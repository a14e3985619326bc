use anyhow::{anyhow, Result};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::config::AppConfig;

const APPLICATION_NAME: &str = "rappel";

/// Shared Postgres pool behind every `Postgres*Repo`.
#[derive(Clone)]
pub struct Db {
    pool: PgPool,
}

impl Db {
    pub async fn connect(config: &AppConfig) -> Result<Self> {
        let options = PgConnectOptions::from_str(&config.database_url)
            .map_err(|err| anyhow!("invalid DATABASE_URL: {}", err))?
            .application_name(APPLICATION_NAME);

        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .acquire_timeout(Duration::from_secs(config.db_connect_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.db_idle_timeout_seconds))
            .max_lifetime(Duration::from_secs(config.db_max_lifetime_seconds))
            .connect_with(options)
            .await
            .map_err(|err| anyhow!("failed to connect to postgres: {}", err))?;

        info!(max_connections = config.db_max_connections, "postgres pool ready");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Applies the embedded `migrations/` directory. Safe to run from api and
    /// worker processes at once; sqlx serializes them with an advisory lock.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|err| anyhow!("failed to apply migrations: {}", err))?;
        info!("migrations applied");
        Ok(())
    }

    /// Used by the health endpoint.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }
}
