use anyhow::anyhow;
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rappel::config::AppConfig;
use rappel::infra::clock::{Clock, SystemClock};
use rappel::infra::db::Db;
use rappel::infra::push::PushClients;
use rappel::infra::repos::Repos;
use rappel::{http, jobs, AppState, StateOptions};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let db = Db::connect(&config).await?;
    db.migrate().await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let push = PushClients::from_config(
        &config.push,
        Duration::from_secs(config.push_timeout_seconds),
        clock.clone(),
    )?;

    let state = AppState::new(
        Repos::create_postgres(db),
        clock.clone(),
        push,
        StateOptions::from_config(&config),
    );

    match config.app_mode.as_str() {
        "api" => {
            let tasks = state.tasks.clone();
            let app: Router = http::router(state).layer(TraceLayer::new_for_http());
            let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
            tracing::info!("listening on {}", config.http_addr);

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            tracing::info!(in_flight = tasks.in_flight(), "draining background pushes");
            if tokio::time::timeout(Duration::from_secs(config.push_timeout_seconds), tasks.wait_idle())
                .await
                .is_err()
            {
                tracing::warn!(in_flight = tasks.in_flight(), "background pushes abandoned on shutdown");
            }
        }
        "worker" => {
            tracing::info!("starting worker mode");
            let now_ts = clock.now().unix_timestamp();
            tokio::select! {
                _ = jobs::scheduler::run(
                    state.jobs.clone(),
                    now_ts,
                    Duration::from_secs(config.scan_interval_seconds),
                ) => {}
                _ = shutdown_signal() => {}
            }
            state.tasks.wait_idle().await;
        }
        other => return Err(anyhow!("unknown APP_MODE: {}", other)),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
