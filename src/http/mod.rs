use axum::Router;

use crate::AppState;

mod auth;
mod error;
mod handlers;
mod routes;

pub use auth::{AuthUser, CronAuth};
pub use error::AppError;

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(routes::health())
        .merge(routes::devices())
        .merge(routes::reminders())
        .merge(routes::lists())
        .merge(routes::sync())
        .merge(routes::live())
        .merge(routes::cron())
        .with_state(state)
}
