use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReminderList {
    pub id: String,
    pub name: String,
    pub color: Option<String>,
    pub emblem: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reminder {
    /// Reminder ID (use for updates)
    pub id: String,
    pub title: String,
    pub notes: Option<String>,
    pub completed: bool,
    pub completion_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    /// 0 none, 1 low, 2 medium, 3 high
    pub priority: u8,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewReminder {
    pub title: String,
    pub notes: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub priority: Option<u8>,
}

/// Fields to change on an existing reminder; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReminderUpdate {
    pub title: Option<String>,
    pub notes: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub priority: Option<u8>,
    pub completed: Option<bool>,
}

impl ReminderUpdate {
    pub fn completed() -> Self {
        Self {
            completed: Some(true),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.notes.is_none()
            && self.due_date.is_none()
            && self.priority.is_none()
            && self.completed.is_none()
    }
}
