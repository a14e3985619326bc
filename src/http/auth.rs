use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::http::AppError;
use crate::AppState;

/// Authenticated caller. `device_id` is set when the token was minted for a
/// registered device, and marks the origin of every mutation made with it.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub device_id: Option<Uuid>,
}

/// Scheduler calls to the cron endpoints.
#[derive(Debug, Clone)]
pub struct CronAuth;

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if parts.headers.get(header::AUTHORIZATION).is_none() {
            return Err(AppError::unauthorized("missing Authorization header"));
        }
        let token =
            bearer_token(parts).ok_or_else(|| AppError::unauthorized("invalid Authorization header"))?;

        let session = state
            .auth
            .authenticate_access_token(token)
            .map_err(|err| {
                tracing::error!(error = ?err, "failed to authenticate");
                AppError::internal("failed to authenticate")
            })?
            .ok_or_else(|| AppError::unauthorized("invalid token"))?;

        if let Some(device_id) = session.device_id {
            if let Err(err) = state.devices.touch(device_id).await {
                tracing::debug!(error = %err, %device_id, "failed to touch device");
            }
        }

        Ok(AuthUser {
            user_id: session.user_id,
            device_id: session.device_id,
        })
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for CronAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let expected = state
            .cron_secret
            .as_ref()
            .ok_or_else(|| AppError::forbidden("cron endpoints are disabled"))?;

        let provided = bearer_token(parts).ok_or_else(|| AppError::unauthorized("missing cron secret"))?;

        if !bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) {
            return Err(AppError::unauthorized("invalid cron secret"));
        }

        Ok(CronAuth)
    }
}
