use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

pub const NAME_MAX_CHARS: usize = 100;
pub const DEFAULT_LIST_NAME: &str = "Reminders";
pub const DEFAULT_COLOR_HEX: &str = "#007AFF";
pub const DEFAULT_ICON_NAME: &str = "list.bullet";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderList {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub color_hex: String,
    pub icon_name: String,
    pub sort_order: i32,
    /// Every user has exactly one, created on first listing. It cannot be deleted.
    pub is_default: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl ReminderList {
    pub fn new(user_id: Uuid, input: NewReminderList, sort_order: i32, now: OffsetDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            name: input.name,
            color_hex: input.color_hex.unwrap_or_else(|| DEFAULT_COLOR_HEX.to_string()),
            icon_name: input.icon_name.unwrap_or_else(|| DEFAULT_ICON_NAME.to_string()),
            sort_order,
            is_default: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn default_for(user_id: Uuid, now: OffsetDateTime) -> Self {
        Self {
            is_default: true,
            ..Self::new(
                user_id,
                NewReminderList {
                    name: DEFAULT_LIST_NAME.to_string(),
                    ..Default::default()
                },
                0,
                now,
            )
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewReminderList {
    pub name: String,
    pub color_hex: Option<String>,
    pub icon_name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ReminderListPatch {
    pub name: Option<String>,
    pub color_hex: Option<String>,
    pub icon_name: Option<String>,
    pub sort_order: Option<i32>,
}

impl ReminderListPatch {
    pub fn apply(self, list: &mut ReminderList) {
        if let Some(name) = self.name {
            list.name = name;
        }
        if let Some(color_hex) = self.color_hex {
            list.color_hex = color_hex;
        }
        if let Some(icon_name) = self.icon_name {
            list.icon_name = icon_name;
        }
        if let Some(sort_order) = self.sort_order {
            list.sort_order = sort_order;
        }
    }
}

/// A list with the number of open reminders filed under it.
#[derive(Debug, Clone, Serialize)]
pub struct ReminderListSummary {
    #[serde(flatten)]
    pub list: ReminderList,
    pub reminder_count: i64,
}

pub fn validate_name(name: &str) -> Result<(), &'static str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err("name must not be empty");
    }
    if trimmed.chars().count() > NAME_MAX_CHARS {
        return Err("name must be at most 100 characters");
    }
    Ok(())
}

/// `#RRGGBB`
pub fn validate_color_hex(color: &str) -> Result<(), &'static str> {
    match color.strip_prefix('#') {
        Some(hex) if hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()) => Ok(()),
        _ => Err("color_hex must look like #RRGGBB"),
    }
}
