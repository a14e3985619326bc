pub mod device;
pub mod live;
pub mod notification;
pub mod reminder;
pub mod reminder_list;
pub mod sync_event;
