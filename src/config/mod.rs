pub mod push;

use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::net::SocketAddr;
use std::str::FromStr;

use push::PushConfig;

const PUSH_TIMEOUT_MIN_SECONDS: u64 = 10;
const PUSH_TIMEOUT_MAX_SECONDS: u64 = 30;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub http_addr: String,
    pub app_mode: String,
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_connect_timeout_seconds: u64,
    pub db_idle_timeout_seconds: u64,
    pub db_max_lifetime_seconds: u64,
    pub paseto_access_key: [u8; 32],
    pub access_ttl_minutes: u64,
    pub cron_secret: Option<String>,
    pub push_timeout_seconds: u64,
    pub job_timeout_seconds: u64,
    pub scan_interval_seconds: u64,
    pub sync_retention_days: i64,
    pub device_stale_days: i64,
    pub live_buffer_size: usize,
    pub background_concurrency: usize,
    pub push: PushConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let http_addr = env_or("HTTP_ADDR", "0.0.0.0:8080");
        let _parsed_http_addr = SocketAddr::from_str(&http_addr)
            .map_err(|err| anyhow!("invalid HTTP_ADDR: {}", err))?;
        let app_mode = env_or("APP_MODE", "api");

        let push_timeout_seconds: u64 = env_or_parse("PUSH_TIMEOUT_SECONDS", "30")?;
        let live_buffer_size: usize = env_or_parse("LIVE_BUFFER_SIZE", "32")?;
        if live_buffer_size == 0 {
            return Err(anyhow!("invalid LIVE_BUFFER_SIZE: must be positive"));
        }
        let scan_interval_seconds: u64 = env_or_parse("SCAN_INTERVAL_SECONDS", "60")?;
        if scan_interval_seconds == 0 {
            return Err(anyhow!("invalid SCAN_INTERVAL_SECONDS: must be positive"));
        }
        let background_concurrency: usize = env_or_parse("BACKGROUND_CONCURRENCY", "64")?;
        if background_concurrency == 0 {
            return Err(anyhow!("invalid BACKGROUND_CONCURRENCY: must be positive"));
        }

        Ok(Self {
            http_addr,
            app_mode,
            database_url: env_or_err("DATABASE_URL")?,
            db_max_connections: env_or_parse("DB_MAX_CONNECTIONS", "25")?,
            db_connect_timeout_seconds: env_or_parse("DB_CONNECT_TIMEOUT_SECONDS", "5")?,
            db_idle_timeout_seconds: env_or_parse("DB_IDLE_TIMEOUT_SECONDS", "300")?,
            db_max_lifetime_seconds: env_or_parse("DB_MAX_LIFETIME_SECONDS", "1800")?,
            paseto_access_key: env_key_32("ACCESS_TOKEN_KEY")?,
            access_ttl_minutes: env_or_parse("ACCESS_TTL_MINUTES", "60")?,
            cron_secret: env_optional("CRON_SECRET"),
            push_timeout_seconds: clamp_push_timeout(push_timeout_seconds),
            job_timeout_seconds: env_or_parse("JOB_TIMEOUT_SECONDS", "25")?,
            scan_interval_seconds,
            sync_retention_days: env_or_parse("SYNC_RETENTION_DAYS", "30")?,
            device_stale_days: env_or_parse("DEVICE_STALE_DAYS", "14")?,
            live_buffer_size,
            background_concurrency,
            push: PushConfig::from_env()?,
        })
    }
}

pub(crate) fn clamp_push_timeout(seconds: u64) -> u64 {
    seconds.clamp(PUSH_TIMEOUT_MIN_SECONDS, PUSH_TIMEOUT_MAX_SECONDS)
}

pub(crate) fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Unset and blank are the same thing.
pub(crate) fn env_optional(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_or_err(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| anyhow!("missing required env var: {}", key))
}

pub(crate) fn env_or_parse<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    let value = std::env::var(key).unwrap_or_else(|_| default.to_string());
    value
        .parse::<T>()
        .map_err(|err| anyhow!("invalid {}: {}", key, err))
}

fn env_key_32(key: &str) -> Result<[u8; 32]> {
    let value = env_or_err(key)?;
    decode_key_32(key, &value)
}

pub(crate) fn decode_key_32(key: &str, value: &str) -> Result<[u8; 32]> {
    let decoded = STANDARD
        .decode(value.as_bytes())
        .map_err(|err| anyhow!("invalid {}: {}", key, err))?;
    if decoded.len() != 32 {
        return Err(anyhow!("invalid {}: expected 32 bytes", key));
    }
    let mut key_bytes = [0u8; 32];
    key_bytes.copy_from_slice(&decoded);
    Ok(key_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_timeout_is_clamped() {
        assert_eq!(clamp_push_timeout(1), 10);
        assert_eq!(clamp_push_timeout(20), 20);
        assert_eq!(clamp_push_timeout(120), 30);
    }

    #[test]
    fn key_must_be_32_bytes() {
        let good = STANDARD.encode([7u8; 32]);
        assert_eq!(decode_key_32("K", &good).unwrap(), [7u8; 32]);

        let short = STANDARD.encode([7u8; 16]);
        assert!(decode_key_32("K", &short).is_err());
        assert!(decode_key_32("K", "not base64!").is_err());
    }
}
