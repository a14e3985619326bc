pub mod app;
pub mod config;
pub mod domain;
pub mod http;
pub mod infra;
pub mod jobs;

use std::sync::Arc;
use std::time::Duration;

use crate::app::auth::AuthService;
use crate::app::background::BackgroundTasks;
use crate::app::devices::DeviceService;
use crate::app::dispatcher::NotificationDispatcher;
use crate::app::hub::PubSubHub;
use crate::app::propagation::ActionPropagator;
use crate::app::reminder_lists::ReminderListService;
use crate::app::reminders::ReminderService;
use crate::app::sync_log::SyncLog;
use crate::config::AppConfig;
use crate::infra::clock::Clock;
use crate::infra::push::PushClients;
use crate::infra::repos::Repos;
use crate::jobs::device_cleanup::DeviceCleanupJob;
use crate::jobs::due_reminders::DueReminderScanner;
use crate::jobs::sync_retention::SyncRetentionJob;
use crate::jobs::Jobs;

/// Tunables that shape the state, split from `AppConfig` so tests can build
/// a state without touching the environment.
#[derive(Clone, Debug)]
pub struct StateOptions {
    pub access_key: [u8; 32],
    pub access_ttl_minutes: u64,
    pub cron_secret: Option<String>,
    pub live_buffer: usize,
    pub background_concurrency: usize,
    pub push_timeout: Duration,
    pub job_timeout: Duration,
    pub device_stale_days: i64,
    pub sync_retention_days: i64,
}

impl StateOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            access_key: config.paseto_access_key,
            access_ttl_minutes: config.access_ttl_minutes,
            cron_secret: config.cron_secret.clone(),
            live_buffer: config.live_buffer_size,
            background_concurrency: config.background_concurrency,
            push_timeout: Duration::from_secs(config.push_timeout_seconds),
            job_timeout: Duration::from_secs(config.job_timeout_seconds),
            device_stale_days: config.device_stale_days,
            sync_retention_days: config.sync_retention_days,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub repos: Repos,
    pub clock: Arc<dyn Clock>,
    pub hub: Arc<PubSubHub>,
    pub dispatcher: NotificationDispatcher,
    pub tasks: BackgroundTasks,
    pub sync_log: SyncLog,
    pub reminders: ReminderService,
    pub lists: ReminderListService,
    pub devices: DeviceService,
    pub jobs: Jobs,
    pub auth: AuthService,
    pub cron_secret: Option<String>,
}

impl AppState {
    pub fn new(repos: Repos, clock: Arc<dyn Clock>, push: PushClients, options: StateOptions) -> Self {
        let hub = Arc::new(PubSubHub::new(options.live_buffer));
        let dispatcher = NotificationDispatcher::new(repos.devices.clone(), push);
        // one background task may fan out to several devices in parallel
        let tasks = BackgroundTasks::new(options.background_concurrency, options.push_timeout * 2);
        let sync_log = SyncLog::new(repos.sync_events.clone());
        let propagator = ActionPropagator::new(dispatcher.clone(), tasks.clone());

        let reminders = ReminderService::new(
            repos.reminders.clone(),
            repos.lists.clone(),
            sync_log.clone(),
            hub.clone(),
            propagator.clone(),
            clock.clone(),
        );
        let lists = ReminderListService::new(
            repos.lists.clone(),
            repos.reminders.clone(),
            sync_log.clone(),
            hub.clone(),
            propagator,
            clock.clone(),
        );
        let devices = DeviceService::new(repos.devices.clone(), clock.clone());

        let jobs = Jobs::new(
            DueReminderScanner::new(
                repos.reminders.clone(),
                dispatcher.clone(),
                clock.clone(),
                options.job_timeout,
            ),
            DeviceCleanupJob::new(repos.devices.clone(), clock.clone(), options.device_stale_days),
            SyncRetentionJob::new(sync_log.clone(), clock.clone(), options.sync_retention_days),
            options.job_timeout,
        );

        Self {
            repos,
            clock,
            hub,
            dispatcher,
            tasks,
            sync_log,
            reminders,
            lists,
            devices,
            jobs,
            auth: AuthService::new(options.access_key, options.access_ttl_minutes),
            cron_secret: options.cron_secret,
        }
    }
}
