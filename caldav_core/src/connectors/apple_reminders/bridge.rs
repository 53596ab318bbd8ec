//! Access to the OS reminders store.

use std::sync::Arc;

use async_trait::async_trait;

use super::types::{NewReminder, Reminder, ReminderList, ReminderUpdate};
use crate::connectors::apple_common::{
    applescript_date_block, escape_applescript_string, optional_field, parse_local_iso,
    run_applescript_output, split_records, DATE_HANDLERS,
};
use crate::error::ConnectorError;

pub const UNAVAILABLE_MESSAGE: &str = "Apple Reminders is only available on macOS";

#[async_trait]
pub trait RemindersBridge: Send + Sync {
    /// All reminder lists, in the order the reminders store reports them.
    async fn lists(&self) -> Result<Vec<ReminderList>, ConnectorError>;

    async fn reminders(&self, list_id: &str) -> Result<Vec<Reminder>, ConnectorError>;

    /// Create a reminder in `list_id` and return its ID.
    async fn create_reminder(
        &self,
        list_id: &str,
        reminder: &NewReminder,
    ) -> Result<String, ConnectorError>;

    async fn update_reminder(&self, id: &str, update: &ReminderUpdate)
        -> Result<(), ConnectorError>;

    async fn delete_reminder(&self, id: &str) -> Result<(), ConnectorError>;
}

/// Probe for a reminders store on this platform.
pub fn detect_bridge() -> Result<Arc<dyn RemindersBridge>, ConnectorError> {
    if cfg!(target_os = "macos") {
        Ok(Arc::new(AppleScriptBridge::new()))
    } else {
        Err(ConnectorError::Unavailable(UNAVAILABLE_MESSAGE.to_string()))
    }
}

// ============================================================================
// Priority Mapping
// ============================================================================

/// 0..=3 (none, low, medium, high) to the Reminders scale, where 1 is the
/// highest priority and 9 the lowest.
pub fn to_native_priority(priority: u8) -> i32 {
    match priority {
        0 => 0,
        1 => 9,
        2 => 5,
        _ => 1,
    }
}

pub fn from_native_priority(native: i32) -> u8 {
    match native {
        1..=4 => 3,
        5 => 2,
        6..=9 => 1,
        _ => 0,
    }
}

// ============================================================================
// AppleScript Generators
// ============================================================================

fn script_list_lists() -> String {
    r#"
set recSep to character id 30
set fieldSep to character id 31
tell application "Reminders"
    set output to ""
    repeat with l in lists
        set lColor to ""
        try
            set c to color of l
            if c is not missing value then set lColor to c as string
        end try
        set lEmblem to ""
        try
            set e to emblem of l
            if e is not missing value then set lEmblem to e as string
        end try
        if output is not "" then set output to output & recSep
        set output to output & (id of l) & fieldSep & (name of l) & fieldSep & lColor & fieldSep & lEmblem
    end repeat
    return output
end tell
"#
    .to_string()
}

fn script_list_reminders(list_id: &str) -> String {
    format!(
        r#"
set recSep to character id 30
set fieldSep to character id 31
tell application "Reminders"
    set output to ""
    repeat with r in reminders of list id "{list_id}"
        set rBody to body of r
        if rBody is missing value then set rBody to ""
        set rCompleted to completed of r
        set rCompletionDate to ""
        if rCompleted then set rCompletionDate to my isoDate(completion date of r)
        set rDueDate to my isoDate(due date of r)
        if output is not "" then set output to output & recSep
        set output to output & (id of r) & fieldSep & (name of r) & fieldSep & rBody & fieldSep & rCompleted & fieldSep & rCompletionDate & fieldSep & rDueDate & fieldSep & (priority of r)
    end repeat
    return output
end tell
{handlers}"#,
        list_id = escape_applescript_string(list_id),
        handlers = DATE_HANDLERS,
    )
}

fn script_create_reminder(list_id: &str, reminder: &NewReminder) -> String {
    let mut props = vec![format!(
        r#"name:"{}""#,
        escape_applescript_string(&reminder.title)
    )];
    if let Some(notes) = reminder.notes.as_deref().filter(|n| !n.is_empty()) {
        props.push(format!(r#"body:"{}""#, escape_applescript_string(notes)));
    }
    if let Some(priority) = reminder.priority {
        props.push(format!("priority:{}", to_native_priority(priority)));
    }

    // Dates are built outside the tell block; `current date` is a scripting
    // addition Reminders does not handle.
    let (date_setup, due_clause) = match &reminder.due_date {
        Some(due) => (
            applescript_date_block("dueValue", due),
            "\n    set due date of newReminder to dueValue",
        ),
        None => (String::new(), ""),
    };

    format!(
        r#"{date_setup}
tell application "Reminders"
    set newReminder to make new reminder in list id "{list_id}" with properties {{{props}}}{due_clause}
    return id of newReminder
end tell
"#,
        date_setup = date_setup,
        list_id = escape_applescript_string(list_id),
        props = props.join(", "),
        due_clause = due_clause,
    )
}

fn script_update_reminder(id: &str, update: &ReminderUpdate) -> String {
    let mut date_setup = String::new();
    let mut updates = Vec::new();

    if let Some(title) = &update.title {
        updates.push(format!(
            r#"set name of r to "{}""#,
            escape_applescript_string(title)
        ));
    }
    if let Some(notes) = &update.notes {
        updates.push(format!(
            r#"set body of r to "{}""#,
            escape_applescript_string(notes)
        ));
    }
    if let Some(due) = &update.due_date {
        date_setup = applescript_date_block("dueValue", due);
        updates.push("set due date of r to dueValue".to_string());
    }
    if let Some(priority) = update.priority {
        updates.push(format!("set priority of r to {}", to_native_priority(priority)));
    }
    if let Some(completed) = update.completed {
        updates.push(format!("set completed of r to {}", completed));
    }

    format!(
        r#"{date_setup}
tell application "Reminders"
    set r to reminder id "{id}"
    {updates}
end tell
"#,
        date_setup = date_setup,
        id = escape_applescript_string(id),
        updates = updates.join("\n    "),
    )
}

fn script_delete_reminder(id: &str) -> String {
    format!(
        r#"
tell application "Reminders"
    delete reminder id "{}"
end tell
"#,
        escape_applescript_string(id)
    )
}

// ============================================================================
// Parsing Functions
// ============================================================================

fn parse_lists(output: &str) -> Vec<ReminderList> {
    split_records(output, 2)
        .into_iter()
        .map(|parts| ReminderList {
            id: parts[0].to_string(),
            name: parts[1].to_string(),
            color: parts.get(2).and_then(|c| optional_field(c)),
            emblem: parts.get(3).and_then(|e| optional_field(e)),
        })
        .collect()
}

fn parse_reminders(output: &str) -> Vec<Reminder> {
    split_records(output, 7)
        .into_iter()
        .map(|parts| Reminder {
            id: parts[0].to_string(),
            title: parts[1].to_string(),
            notes: optional_field(parts[2]),
            completed: parts[3].trim() == "true",
            completion_date: parse_local_iso(parts[4]),
            due_date: parse_local_iso(parts[5]),
            priority: from_native_priority(parts[6].trim().parse().unwrap_or(0)),
        })
        .collect()
}

// ============================================================================
// AppleScript Bridge
// ============================================================================

/// Drives Reminders.app through `osascript`. The first call may trigger the
/// macOS automation permission prompt.
#[derive(Debug, Default)]
pub struct AppleScriptBridge;

impl AppleScriptBridge {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RemindersBridge for AppleScriptBridge {
    async fn lists(&self) -> Result<Vec<ReminderList>, ConnectorError> {
        let output = run_applescript_output(&script_list_lists()).await?;
        Ok(parse_lists(&output))
    }

    async fn reminders(&self, list_id: &str) -> Result<Vec<Reminder>, ConnectorError> {
        let output = run_applescript_output(&script_list_reminders(list_id)).await?;
        Ok(parse_reminders(&output))
    }

    async fn create_reminder(
        &self,
        list_id: &str,
        reminder: &NewReminder,
    ) -> Result<String, ConnectorError> {
        let output = run_applescript_output(&script_create_reminder(list_id, reminder)).await?;
        Ok(output.trim().to_string())
    }

    async fn update_reminder(
        &self,
        id: &str,
        update: &ReminderUpdate,
    ) -> Result<(), ConnectorError> {
        if update.is_empty() {
            return Ok(());
        }
        run_applescript_output(&script_update_reminder(id, update)).await?;
        Ok(())
    }

    async fn delete_reminder(&self, id: &str) -> Result<(), ConnectorError> {
        run_applescript_output(&script_delete_reminder(id)).await?;
        Ok(())
    }
}
