use axum::{routing::delete, routing::get, routing::post, Router};

use crate::AppState;
use crate::http::handlers;

pub fn health() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health))
}

pub fn devices() -> Router<AppState> {
    Router::new()
        .route("/devices", post(handlers::register_device))
        .route("/devices", get(handlers::list_devices))
        .route("/devices/:id", delete(handlers::unregister_device))
}

pub fn reminders() -> Router<AppState> {
    Router::new()
        .route(
            "/reminders",
            post(handlers::create_reminder).get(handlers::list_reminders),
        )
        .route(
            "/reminders/:id",
            get(handlers::get_reminder)
                .patch(handlers::update_reminder)
                .delete(handlers::delete_reminder),
        )
        .route("/reminders/:id/snooze", post(handlers::snooze_reminder))
        .route("/reminders/:id/complete", post(handlers::complete_reminder))
        .route("/reminders/:id/dismiss", post(handlers::dismiss_reminder))
}

pub fn lists() -> Router<AppState> {
    Router::new()
        .route("/lists", post(handlers::create_list).get(handlers::list_lists))
        .route("/lists/reorder", post(handlers::reorder_lists))
        .route(
            "/lists/:id",
            get(handlers::get_list)
                .patch(handlers::update_list)
                .delete(handlers::delete_list),
        )
}

pub fn sync() -> Router<AppState> {
    Router::new().route("/sync/changes", get(handlers::sync_changes))
}

pub fn live() -> Router<AppState> {
    Router::new().route("/live", get(handlers::live_events))
}

pub fn cron() -> Router<AppState> {
    Router::new()
        .route("/cron/notifications", post(handlers::cron_notifications))
        .route("/cron/device-cleanup", post(handlers::cron_device_cleanup))
        .route("/cron/sync-retention", post(handlers::cron_sync_retention))
}
