pub mod auth;
pub mod background;
pub mod devices;
pub mod dispatcher;
pub mod error;
pub mod hub;
pub mod propagation;
pub mod reminder_lists;
pub mod reminders;
pub mod sync_log;
