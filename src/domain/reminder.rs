use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

pub const TITLE_MAX_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderStatus {
    Active,
    Completed,
    Snoozed,
    Dismissed,
}

impl ReminderStatus {
    pub fn as_db(&self) -> &'static str {
        match self {
            ReminderStatus::Active => "active",
            ReminderStatus::Completed => "completed",
            ReminderStatus::Snoozed => "snoozed",
            ReminderStatus::Dismissed => "dismissed",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "active" => Some(ReminderStatus::Active),
            "completed" => Some(ReminderStatus::Completed),
            "snoozed" => Some(ReminderStatus::Snoozed),
            "dismissed" => Some(ReminderStatus::Dismissed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reminder {
    pub id: Uuid,
    pub user_id: Uuid,
    pub list_id: Option<Uuid>,
    pub title: String,
    pub notes: Option<String>,
    /// Reminders without a due date never trigger a notification
    #[serde(with = "time::serde::rfc3339::option")]
    pub due_at: Option<OffsetDateTime>,
    pub all_day: bool,
    pub status: ReminderStatus,
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    /// Set once the due notification for the current `due_at` has been dispatched.
    #[serde(with = "time::serde::rfc3339::option")]
    pub notification_sent_at: Option<OffsetDateTime>,
    pub snooze_count: i32,
    /// Alarm-style reminders bypass do-not-disturb on the device
    pub is_alarm: bool,
    pub sound_id: Option<String>,
    /// Client-generated id, used to make creates idempotent
    pub local_id: Option<String>,
    pub version: i32,
    pub last_modified_by: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Reminder {
    pub fn new(user_id: Uuid, input: NewReminder, device_id: Option<Uuid>, now: OffsetDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            list_id: input.list_id,
            title: input.title,
            notes: input.notes,
            due_at: input.due_at,
            all_day: input.all_day,
            status: ReminderStatus::Active,
            completed_at: None,
            notification_sent_at: None,
            snooze_count: 0,
            is_alarm: input.is_alarm,
            sound_id: input.sound_id,
            local_id: input.local_id,
            version: 1,
            last_modified_by: device_id,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the scanner should pick this reminder up at `now`.
    pub fn is_due_for_notification(&self, now: OffsetDateTime) -> bool {
        self.status == ReminderStatus::Active
            && self.notification_sent_at.is_none()
            && matches!(self.due_at, Some(due_at) if due_at <= now)
    }

    /// Moves the due date. Returns true when the reminder must be re-armed
    /// for notification.
    pub fn reschedule(&mut self, due_at: Option<OffsetDateTime>) -> bool {
        if self.due_at == due_at {
            return false;
        }
        self.due_at = due_at;
        self.notification_sent_at = None;
        true
    }

    pub fn snooze_until(&mut self, until: OffsetDateTime) {
        // snoozed reminders stay active with a moved due date
        self.status = ReminderStatus::Active;
        self.due_at = Some(until);
        self.notification_sent_at = None;
        self.snooze_count += 1;
    }

    pub fn complete(&mut self, now: OffsetDateTime) {
        self.status = ReminderStatus::Completed;
        self.completed_at = Some(now);
    }

    pub fn dismiss(&mut self) {
        self.status = ReminderStatus::Dismissed;
    }

    pub fn touch(&mut self, device_id: Option<Uuid>, now: OffsetDateTime) {
        self.version += 1;
        self.last_modified_by = device_id;
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewReminder {
    pub list_id: Option<Uuid>,
    pub title: String,
    pub notes: Option<String>,
    pub due_at: Option<OffsetDateTime>,
    pub all_day: bool,
    pub is_alarm: bool,
    pub sound_id: Option<String>,
    pub local_id: Option<String>,
}

/// Partial update. Outer `None` leaves a field untouched, `Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct ReminderPatch {
    pub list_id: Option<Option<Uuid>>,
    pub title: Option<String>,
    pub notes: Option<Option<String>>,
    pub due_at: Option<Option<OffsetDateTime>>,
    pub all_day: Option<bool>,
    pub is_alarm: Option<bool>,
    pub sound_id: Option<Option<String>>,
    pub status: Option<ReminderStatus>,
}

impl ReminderPatch {
    /// Applies the patch and reports whether the notification guard was reset.
    pub fn apply(self, reminder: &mut Reminder) -> bool {
        if let Some(list_id) = self.list_id {
            reminder.list_id = list_id;
        }
        if let Some(title) = self.title {
            reminder.title = title;
        }
        if let Some(notes) = self.notes {
            reminder.notes = notes;
        }
        if let Some(all_day) = self.all_day {
            reminder.all_day = all_day;
        }
        if let Some(is_alarm) = self.is_alarm {
            reminder.is_alarm = is_alarm;
        }
        if let Some(sound_id) = self.sound_id {
            reminder.sound_id = sound_id;
        }
        if let Some(status) = self.status {
            reminder.status = status;
        }
        match self.due_at {
            Some(due_at) => reminder.reschedule(due_at),
            None => false,
        }
    }
}

pub fn validate_title(title: &str) -> Result<(), &'static str> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err("title must not be empty");
    }
    if trimmed.chars().count() > TITLE_MAX_CHARS {
        return Err("title must be at most 500 characters");
    }
    Ok(())
}
