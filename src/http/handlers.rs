use std::convert::Infallible;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::{self, Stream};
use serde::{Deserialize, Deserializer, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::reminders::Actor;
use crate::domain::device::{Device, DeviceRegistration, Platform};
use crate::domain::reminder::{NewReminder, Reminder, ReminderPatch, ReminderStatus};
use crate::domain::reminder_list::{NewReminderList, ReminderList, ReminderListPatch, ReminderListSummary};
use crate::domain::sync_event::SyncEvent;
use crate::http::{AppError, AuthUser, CronAuth};
use crate::jobs::due_reminders::ScanReport;
use crate::AppState;

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
pub struct ItemsResponse<T> {
    pub items: Vec<T>,
}

/// Absent stays `None`, an explicit `null` becomes `Some(None)`.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn parse_timestamp(field: &str, value: &str) -> Result<OffsetDateTime, AppError> {
    OffsetDateTime::parse(value, &Rfc3339)
        .map_err(|_| AppError::bad_request(format!("{} must be an RFC 3339 timestamp", field)))
}

fn actor(auth: &AuthUser) -> Actor {
    Actor {
        user_id: auth.user_id,
        device_id: auth.device_id,
    }
}

pub(crate) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = match state.repos.ping().await {
        Ok(()) => "ok",
        Err(err) => {
            tracing::warn!(error = ?err, "store ping failed");
            "degraded"
        }
    };
    Json(HealthResponse { status })
}

#[derive(Deserialize)]
pub struct RegisterDeviceRequest {
    pub device_identifier: String,
    pub platform: Platform,
    pub push_token: String,
    pub device_name: Option<String>,
    pub app_version: Option<String>,
    pub os_version: Option<String>,
}

#[derive(Serialize)]
pub struct RegisterDeviceResponse {
    pub device: Device,
    /// Access token bound to the registered device.
    pub access_token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub access_expires_at: OffsetDateTime,
}

pub async fn register_device(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<RegisterDeviceRequest>,
) -> Result<(StatusCode, Json<RegisterDeviceResponse>), AppError> {
    let device = state
        .devices
        .register(DeviceRegistration {
            user_id: auth.user_id,
            device_identifier: payload.device_identifier,
            platform: payload.platform,
            push_token: payload.push_token,
            device_name: payload.device_name,
            app_version: payload.app_version,
            os_version: payload.os_version,
        })
        .await?;

    let token = state
        .auth
        .issue_access_token(auth.user_id, Some(device.id))
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to issue device token");
            AppError::internal("failed to issue device token")
        })?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterDeviceResponse {
            device,
            access_token: token.token,
            access_expires_at: token.expires_at,
        }),
    ))
}

pub async fn list_devices(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ItemsResponse<Device>>, AppError> {
    let items = state.devices.list(auth.user_id).await?;
    Ok(Json(ItemsResponse { items }))
}

pub async fn unregister_device(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<StatusCode, AppError> {
    if state.devices.unregister(auth.user_id, id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("device not found"))
    }
}

#[derive(Deserialize)]
pub struct CreateReminderRequest {
    pub list_id: Option<Uuid>,
    pub title: String,
    pub notes: Option<String>,
    pub due_at: Option<String>,
    #[serde(default)]
    pub all_day: bool,
    #[serde(default)]
    pub is_alarm: bool,
    pub sound_id: Option<String>,
    pub local_id: Option<String>,
}

pub async fn create_reminder(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CreateReminderRequest>,
) -> Result<(StatusCode, Json<Reminder>), AppError> {
    let due_at = payload
        .due_at
        .as_deref()
        .map(|value| parse_timestamp("due_at", value))
        .transpose()?;

    let reminder = state
        .reminders
        .create(
            actor(&auth),
            NewReminder {
                list_id: payload.list_id,
                title: payload.title,
                notes: payload.notes,
                due_at,
                all_day: payload.all_day,
                is_alarm: payload.is_alarm,
                sound_id: payload.sound_id,
                local_id: payload.local_id,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(reminder)))
}

#[derive(Deserialize)]
pub struct ListRemindersQuery {
    pub status: Option<String>,
}

pub async fn list_reminders(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<ListRemindersQuery>,
) -> Result<Json<ItemsResponse<Reminder>>, AppError> {
    let status = query
        .status
        .as_deref()
        .map(|value| {
            ReminderStatus::from_db(value).ok_or_else(|| AppError::bad_request("unknown status"))
        })
        .transpose()?;

    let items = state.reminders.list(auth.user_id, status).await?;
    Ok(Json(ItemsResponse { items }))
}

pub async fn get_reminder(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Reminder>, AppError> {
    state
        .reminders
        .get(auth.user_id, id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("reminder not found"))
}

#[derive(Deserialize)]
pub struct UpdateReminderRequest {
    #[serde(default, deserialize_with = "nullable")]
    pub list_id: Option<Option<Uuid>>,
    pub title: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub notes: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub due_at: Option<Option<String>>,
    pub all_day: Option<bool>,
    pub is_alarm: Option<bool>,
    #[serde(default, deserialize_with = "nullable")]
    pub sound_id: Option<Option<String>>,
    pub status: Option<ReminderStatus>,
}

pub async fn update_reminder(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<UpdateReminderRequest>,
) -> Result<Json<Reminder>, AppError> {
    let due_at = match payload.due_at {
        Some(Some(value)) => Some(Some(parse_timestamp("due_at", &value)?)),
        Some(None) => Some(None),
        None => None,
    };

    let patch = ReminderPatch {
        list_id: payload.list_id,
        title: payload.title,
        notes: payload.notes,
        due_at,
        all_day: payload.all_day,
        is_alarm: payload.is_alarm,
        sound_id: payload.sound_id,
        status: payload.status,
    };

    state
        .reminders
        .update(actor(&auth), id, patch)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("reminder not found"))
}

pub async fn delete_reminder(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<StatusCode, AppError> {
    if state.reminders.delete(actor(&auth), id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("reminder not found"))
    }
}

#[derive(Deserialize)]
pub struct SnoozeRequest {
    pub minutes: i64,
}

pub async fn snooze_reminder(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<SnoozeRequest>,
) -> Result<Json<Reminder>, AppError> {
    state
        .reminders
        .snooze(actor(&auth), id, payload.minutes)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("reminder not found"))
}

pub async fn complete_reminder(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Reminder>, AppError> {
    state
        .reminders
        .complete(actor(&auth), id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("reminder not found"))
}

pub async fn dismiss_reminder(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Reminder>, AppError> {
    state
        .reminders
        .dismiss(actor(&auth), id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("reminder not found"))
}

#[derive(Deserialize)]
pub struct CreateListRequest {
    pub name: String,
    pub color_hex: Option<String>,
    pub icon_name: Option<String>,
}

pub async fn create_list(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CreateListRequest>,
) -> Result<(StatusCode, Json<ReminderList>), AppError> {
    let list = state
        .lists
        .create(
            actor(&auth),
            NewReminderList {
                name: payload.name,
                color_hex: payload.color_hex,
                icon_name: payload.icon_name,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(list)))
}

pub async fn list_lists(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ItemsResponse<ReminderListSummary>>, AppError> {
    let items = state.lists.list(actor(&auth)).await?;
    Ok(Json(ItemsResponse { items }))
}

pub async fn get_list(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ReminderListSummary>, AppError> {
    state
        .lists
        .get(auth.user_id, id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("list not found"))
}

#[derive(Deserialize)]
pub struct UpdateListRequest {
    pub name: Option<String>,
    pub color_hex: Option<String>,
    pub icon_name: Option<String>,
    pub sort_order: Option<i32>,
}

pub async fn update_list(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<UpdateListRequest>,
) -> Result<Json<ReminderList>, AppError> {
    let patch = ReminderListPatch {
        name: payload.name,
        color_hex: payload.color_hex,
        icon_name: payload.icon_name,
        sort_order: payload.sort_order,
    };
    state
        .lists
        .update(actor(&auth), id, patch)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("list not found"))
}

pub async fn delete_list(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<StatusCode, AppError> {
    if state.lists.delete(actor(&auth), id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("list not found"))
    }
}

#[derive(Deserialize)]
pub struct ReorderListsRequest {
    pub list_ids: Vec<Uuid>,
}

pub async fn reorder_lists(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<ReorderListsRequest>,
) -> Result<Json<ItemsResponse<ReminderListSummary>>, AppError> {
    let items = state.lists.reorder(actor(&auth), payload.list_ids).await?;
    Ok(Json(ItemsResponse { items }))
}

#[derive(Deserialize)]
pub struct SyncChangesQuery {
    pub since: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct SyncChangesResponse {
    pub changes: Vec<SyncEvent>,
    pub has_more: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub next_cursor: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub server_time: OffsetDateTime,
}

pub async fn sync_changes(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<SyncChangesQuery>,
) -> Result<Json<SyncChangesResponse>, AppError> {
    let since = query
        .since
        .as_deref()
        .map(|value| parse_timestamp("since", value))
        .transpose()?;

    let server_time = state.clock.now();
    let page = state
        .sync_log
        .changes_since(auth.user_id, since, query.limit)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to read sync changes");
            AppError::internal("failed to read sync changes")
        })?;

    let next_cursor = page.next_cursor();
    Ok(Json(SyncChangesResponse {
        changes: page.events,
        has_more: page.has_more,
        next_cursor,
        server_time,
    }))
}

pub async fn live_events(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.hub.subscribe(auth.user_id);
    tracing::debug!(user_id = %auth.user_id, subscription = subscription.id(), "live feed opened");

    // the subscription drops with the stream when the client goes away
    let events = stream::unfold(subscription, |mut subscription| async move {
        let event = subscription.recv().await?;
        let frame = Event::default()
            .event(event.event_name())
            .json_data(&event)
            .unwrap_or_else(|err| {
                tracing::warn!(error = %err, "failed to encode live event");
                Event::default().comment("encode error")
            });
        Some((Ok(frame), subscription))
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}

#[derive(Serialize)]
pub struct CleanupResponse {
    pub deleted: u64,
}

pub async fn cron_notifications(
    State(state): State<AppState>,
    _cron: CronAuth,
) -> Result<Json<ScanReport>, AppError> {
    let report = state.jobs.run_due_notifications().await.map_err(|err| {
        tracing::error!(error = ?err, "due reminder scan failed");
        AppError::internal("due reminder scan failed")
    })?;
    Ok(Json(report))
}

pub async fn cron_device_cleanup(
    State(state): State<AppState>,
    _cron: CronAuth,
) -> Result<Json<CleanupResponse>, AppError> {
    let deleted = state.jobs.run_device_cleanup().await.map_err(|err| {
        tracing::error!(error = ?err, "device cleanup failed");
        AppError::internal("device cleanup failed")
    })?;
    Ok(Json(CleanupResponse { deleted }))
}

pub async fn cron_sync_retention(
    State(state): State<AppState>,
    _cron: CronAuth,
) -> Result<Json<CleanupResponse>, AppError> {
    let deleted = state.jobs.run_sync_retention().await.map_err(|err| {
        tracing::error!(error = ?err, "sync retention sweep failed");
        AppError::internal("sync retention sweep failed")
    })?;
    Ok(Json(CleanupResponse { deleted }))
}
