// Apple Reminders Connector - Reminders.app lists and todos
//
// Reminders are addressed by title: a named list (case-insensitive) is
// searched alone, otherwise every list is scanned in the order the bridge
// reports them and the first match wins.

pub mod bridge;
pub mod types;

pub use bridge::{AppleScriptBridge, RemindersBridge};
pub use types::{NewReminder, Reminder, ReminderList, ReminderUpdate};

use crate::connectors::apple_common::apple_connector_capabilities;
use crate::connectors::caldav::types::date_time_schema;
use crate::error::ConnectorError;
use crate::utils::{
    parse_iso_datetime, parse_params, pretty_json_text_result, text_result, tool, ToolParams,
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use futures::future::join_all;
use rmcp::model::*;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

pub struct RemindersConnector {
    bridge: Arc<dyn RemindersBridge>,
}

impl RemindersConnector {
    pub fn new(bridge: Arc<dyn RemindersBridge>) -> Self {
        Self { bridge }
    }

    async fn lists(&self) -> Result<Vec<ReminderList>, ConnectorError> {
        self.bridge.lists().await
    }

    /// Lists to search for `list_name`, or every list when none is given.
    async fn search_scope(
        &self,
        list_name: Option<&str>,
    ) -> Result<Vec<ReminderList>, ConnectorError> {
        let lists = self.lists().await?;
        match list_name {
            Some(name) => match find_list(&lists, name) {
                Some(list) => Ok(vec![list.clone()]),
                None => Err(ConnectorError::NotFound(format!("List '{}' not found", name))),
            },
            None => Ok(lists),
        }
    }

    /// First reminder matching `pred`, scanning lists one at a time and
    /// stopping at the first hit.
    async fn find_sequential<F>(
        &self,
        scope: &[ReminderList],
        pred: F,
    ) -> Result<Option<(Reminder, String)>, ConnectorError>
    where
        F: Fn(&Reminder) -> bool,
    {
        for list in scope {
            let reminders = self.bridge.reminders(&list.id).await?;
            if let Some(found) = reminders.into_iter().find(|r| pred(r)) {
                return Ok(Some((found, list.name.clone())));
            }
        }
        Ok(None)
    }

    /// Look up every list concurrently, then take the first match in list order.
    async fn find_concurrent(
        &self,
        scope: &[ReminderList],
        title: &str,
    ) -> Result<Option<(Reminder, String)>, ConnectorError> {
        let lookups = scope.iter().map(|list| async move {
            let reminders = self.bridge.reminders(&list.id).await?;
            Ok::<_, ConnectorError>(
                reminders
                    .into_iter()
                    .find(|r| r.title == title)
                    .map(|r| (r, list.name.clone())),
            )
        });

        for result in join_all(lookups).await {
            if let Some(found) = result? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    async fn list_reminders(
        &self,
        params: ListRemindersParams,
    ) -> Result<CallToolResult, ConnectorError> {
        let lists = self.lists().await?;

        let Some(list_name) = params.list_name else {
            let summary: Vec<ListSummary<'_>> = lists.iter().map(ListSummary::from).collect();
            let json = serde_json::to_string_pretty(&summary)?;
            return Ok(text_result(format!("Available reminder lists:\n{}", json)));
        };

        let list = find_list(&lists, &list_name).ok_or_else(|| {
            ConnectorError::NotFound(format!(
                "List '{}' not found. Available lists: {}",
                list_name,
                list_names(&lists)
            ))
        })?;

        let search = params.search.map(|s| s.to_lowercase());
        let all = self.bridge.reminders(&list.id).await?;
        let reminders: Vec<ReminderView<'_>> = all
            .iter()
            .filter(|r| params.show_completed.unwrap_or(false) || !r.completed)
            .filter(|r| match &search {
                Some(term) => {
                    r.title.to_lowercase().contains(term.as_str())
                        || r.notes
                            .as_deref()
                            .is_some_and(|n| n.to_lowercase().contains(term.as_str()))
                }
                None => true,
            })
            .map(|r| ReminderView::new(r, &list_name))
            .collect();

        pretty_json_text_result(&reminders)
    }

    async fn create_reminder(
        &self,
        params: CreateReminderParams,
    ) -> Result<CallToolResult, ConnectorError> {
        let lists = self.lists().await?;
        if lists.is_empty() {
            return Err(ConnectorError::NotFound("No reminder lists found".to_string()));
        }

        let list = match params.list_name.as_deref() {
            Some(name) => find_list(&lists, name).ok_or_else(|| {
                ConnectorError::NotFound(format!(
                    "List '{}' not found. Available lists: {}",
                    name,
                    list_names(&lists)
                ))
            })?,
            None => &lists[0],
        };

        let reminder = NewReminder {
            title: params.title.clone(),
            notes: params.notes.filter(|n| !n.is_empty()),
            due_date: optional_due_date(params.due_date.as_deref())?,
            priority: params.priority,
        };
        let id = self.bridge.create_reminder(&list.id, &reminder).await?;
        debug!(id = %id, list = %list.name, "Created reminder");

        Ok(text_result(format!(
            "Successfully created reminder: \"{}\" in list \"{}\" with ID: {}",
            params.title, list.name, id
        )))
    }

    async fn update_reminder(
        &self,
        params: UpdateReminderParams,
    ) -> Result<CallToolResult, ConnectorError> {
        let scope = self.search_scope(params.list_name.as_deref()).await?;
        let (target, list_name) = self
            .find_concurrent(&scope, &params.title)
            .await?
            .ok_or_else(|| {
                ConnectorError::NotFound(format!(
                    "Reminder '{}' not found {}",
                    params.title,
                    scope_label(params.list_name.as_deref())
                ))
            })?;

        let new_title = params.new_title.filter(|t| !t.is_empty());
        let update = ReminderUpdate {
            title: new_title.clone(),
            notes: params.notes,
            due_date: optional_due_date(params.due_date.as_deref())?,
            priority: params.priority,
            completed: params.completed,
        };
        self.bridge.update_reminder(&target.id, &update).await?;

        Ok(text_result(format!(
            "Successfully updated reminder: \"{}\" in list \"{}\"",
            new_title.as_deref().unwrap_or(&params.title),
            list_name
        )))
    }

    async fn complete_reminder(
        &self,
        params: ReminderByTitleParams,
    ) -> Result<CallToolResult, ConnectorError> {
        let scope = self.search_scope(params.list_name.as_deref()).await?;
        let (target, list_name) = self
            .find_sequential(&scope, |r| r.title == params.title && !r.completed)
            .await?
            .ok_or_else(|| {
                ConnectorError::NotFound(format!(
                    "Active reminder '{}' not found {}",
                    params.title,
                    scope_label(params.list_name.as_deref())
                ))
            })?;

        self.bridge
            .update_reminder(&target.id, &ReminderUpdate::completed())
            .await?;

        Ok(text_result(format!(
            "Successfully marked reminder as completed: \"{}\" in list \"{}\"",
            params.title, list_name
        )))
    }

    async fn delete_reminder(
        &self,
        params: ReminderByTitleParams,
    ) -> Result<CallToolResult, ConnectorError> {
        let scope = self.search_scope(params.list_name.as_deref()).await?;
        let (target, list_name) = self
            .find_sequential(&scope, |r| r.title == params.title)
            .await?
            .ok_or_else(|| {
                ConnectorError::NotFound(format!(
                    "Reminder '{}' not found {}",
                    params.title,
                    scope_label(params.list_name.as_deref())
                ))
            })?;

        self.bridge.delete_reminder(&target.id).await?;

        Ok(text_result(format!(
            "Successfully deleted reminder: \"{}\" from list \"{}\"",
            params.title, list_name
        )))
    }
}

fn find_list<'a>(lists: &'a [ReminderList], name: &str) -> Option<&'a ReminderList> {
    let wanted = name.to_lowercase();
    lists.iter().find(|l| l.name.to_lowercase() == wanted)
}

fn list_names(lists: &[ReminderList]) -> String {
    lists
        .iter()
        .map(|l| l.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn scope_label(list_name: Option<&str>) -> String {
    match list_name {
        Some(name) => format!("in list '{}'", name),
        None => "in any list".to_string(),
    }
}

fn optional_due_date(value: Option<&str>) -> Result<Option<DateTime<Utc>>, ConnectorError> {
    value.map(|v| parse_iso_datetime("dueDate", v)).transpose()
}

fn check_priority(priority: Option<u8>) -> Result<(), ConnectorError> {
    match priority {
        Some(p) if p > 3 => Err(ConnectorError::InvalidParams(format!(
            "priority must be between 0 and 3, got {}",
            p
        ))),
        _ => Ok(()),
    }
}

// ============================================================================
// Tool Parameters
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListRemindersParams {
    /// Name of the reminder list (if not specified, will list available lists)
    #[serde(default)]
    pub list_name: Option<String>,
    /// Include completed reminders
    #[serde(default)]
    pub show_completed: Option<bool>,
    /// Search term to filter reminders
    #[serde(default)]
    pub search: Option<String>,
}

impl ToolParams for ListRemindersParams {}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateReminderParams {
    /// Title of the reminder
    pub title: String,
    /// Target list name (default: first available list)
    #[serde(default)]
    pub list_name: Option<String>,
    /// Due date in ISO format
    #[serde(default)]
    #[schemars(schema_with = "date_time_schema")]
    pub due_date: Option<String>,
    /// Additional notes for the reminder
    #[serde(default)]
    pub notes: Option<String>,
    /// Priority level (0=none, 1=low, 2=medium, 3=high)
    #[serde(default)]
    #[schemars(range(min = 0, max = 3))]
    pub priority: Option<u8>,
}

impl ToolParams for CreateReminderParams {
    fn validate(&self) -> Result<(), ConnectorError> {
        optional_due_date(self.due_date.as_deref())?;
        check_priority(self.priority)
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReminderParams {
    /// Current title of the reminder to update
    pub title: String,
    /// List containing the reminder (searches all lists if not specified)
    #[serde(default)]
    pub list_name: Option<String>,
    /// New title for the reminder
    #[serde(default)]
    pub new_title: Option<String>,
    /// New due date in ISO format
    #[serde(default)]
    #[schemars(schema_with = "date_time_schema")]
    pub due_date: Option<String>,
    /// New notes for the reminder
    #[serde(default)]
    pub notes: Option<String>,
    /// New priority level (0=none, 1=low, 2=medium, 3=high)
    #[serde(default)]
    #[schemars(range(min = 0, max = 3))]
    pub priority: Option<u8>,
    /// Mark reminder as completed or uncompleted
    #[serde(default)]
    pub completed: Option<bool>,
}

impl ToolParams for UpdateReminderParams {
    fn validate(&self) -> Result<(), ConnectorError> {
        optional_due_date(self.due_date.as_deref())?;
        check_priority(self.priority)
    }
}

/// Parameters for tools that act on one reminder found by title.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReminderByTitleParams {
    /// Title of the reminder
    pub title: String,
    /// List containing the reminder (searches all lists if not specified)
    #[serde(default)]
    pub list_name: Option<String>,
}

impl ToolParams for ReminderByTitleParams {}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListReminderListsParams {}

impl ToolParams for ListReminderListsParams {}

// ============================================================================
// Output Views
// ============================================================================

#[derive(Debug, Serialize)]
struct ListSummary<'a> {
    id: &'a str,
    name: &'a str,
}

impl<'a> From<&'a ReminderList> for ListSummary<'a> {
    fn from(list: &'a ReminderList) -> Self {
        Self {
            id: &list.id,
            name: &list.name,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReminderView<'a> {
    id: &'a str,
    title: &'a str,
    notes: Option<&'a str>,
    completed: bool,
    completion_date: Option<String>,
    due_date: Option<String>,
    priority: u8,
    list: &'a str,
}

impl<'a> ReminderView<'a> {
    fn new(reminder: &'a Reminder, list: &'a str) -> Self {
        let iso = |d: &DateTime<Utc>| d.to_rfc3339_opts(SecondsFormat::Millis, true);
        Self {
            id: &reminder.id,
            title: &reminder.title,
            notes: reminder.notes.as_deref(),
            completed: reminder.completed,
            completion_date: reminder.completion_date.as_ref().map(iso),
            due_date: reminder.due_date.as_ref().map(iso),
            priority: reminder.priority,
            list,
        }
    }
}

// ============================================================================
// Connector Implementation
// ============================================================================

#[async_trait]
impl crate::Connector for RemindersConnector {
    fn name(&self) -> &'static str {
        "apple-reminders"
    }

    fn description(&self) -> &'static str {
        "Apple Reminders: lists and todos from Reminders.app (macOS only)."
    }

    async fn capabilities(&self) -> ServerCapabilities {
        apple_connector_capabilities()
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
    ) -> Result<ListToolsResult, ConnectorError> {
        let tools = vec![
            tool::<ListRemindersParams>(
                "list-reminders",
                "List Reminders",
                "List todos from Apple Reminders",
            ),
            tool::<CreateReminderParams>(
                "create-reminder",
                "Create Reminder",
                "Create a new reminder in Apple Reminders",
            ),
            tool::<UpdateReminderParams>(
                "update-reminder",
                "Update Reminder",
                "Update an existing reminder",
            ),
            tool::<ReminderByTitleParams>(
                "complete-reminder",
                "Complete Reminder",
                "Mark a reminder as completed",
            ),
            tool::<ReminderByTitleParams>(
                "delete-reminder",
                "Delete Reminder",
                "Delete a reminder from Apple Reminders",
            ),
            tool::<ListReminderListsParams>(
                "list-reminder-lists",
                "List Reminder Lists",
                "Get all available reminder lists",
            ),
        ];

        Ok(ListToolsResult {
            tools,
            next_cursor: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
    ) -> Result<CallToolResult, ConnectorError> {
        let name = request.name.as_ref();
        let args = request.arguments;

        match name {
            "list-reminders" => {
                let params = parse_params(args)?;
                self.list_reminders(params)
                    .await
                    .map_err(|e| e.context("Failed to list reminders"))
            }
            "create-reminder" => {
                let params = parse_params(args)?;
                self.create_reminder(params)
                    .await
                    .map_err(|e| e.context("Failed to create reminder"))
            }
            "update-reminder" => {
                let params = parse_params(args)?;
                self.update_reminder(params)
                    .await
                    .map_err(|e| e.context("Failed to update reminder"))
            }
            "complete-reminder" => {
                let params = parse_params(args)?;
                self.complete_reminder(params)
                    .await
                    .map_err(|e| e.context("Failed to complete reminder"))
            }
            "delete-reminder" => {
                let params = parse_params(args)?;
                self.delete_reminder(params)
                    .await
                    .map_err(|e| e.context("Failed to delete reminder"))
            }
            "list-reminder-lists" => {
                let _: ListReminderListsParams = parse_params(args)?;
                let lists = self
                    .lists()
                    .await
                    .map_err(|e| e.context("Failed to get reminder lists"))?;
                pretty_json_text_result(&lists)
            }
            _ => Err(ConnectorError::ToolNotFound(name.to_string())),
        }
    }
}
