// CalDAV Connector - calendar events on any CalDAV server
//
// Tools: create-event, list-events, delete-event, list-calendars.
// The calendar list is fetched once when the connector is built.

pub mod client;
pub mod ical;
pub mod types;
pub mod xml;

pub use client::{CalendarClient, HttpCalDavClient};
pub use types::{Calendar, EventSummary, NewEvent, RecurrenceRule, TimeRange};

use crate::error::ConnectorError;
use crate::utils::{
    json_text_result, parse_iso_datetime, parse_params, required_datetime, text_result, tool,
    ToolParams,
};
use async_trait::async_trait;
use chrono::SecondsFormat;
use rmcp::model::*;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use types::date_time_schema;

pub struct CalDavConnector {
    client: Arc<dyn CalendarClient>,
    calendars: Vec<Calendar>,
}

impl CalDavConnector {
    /// Wrap `client`, taking the calendar snapshot now.
    pub async fn new(client: Arc<dyn CalendarClient>) -> Result<Self, ConnectorError> {
        let calendars = client
            .list_calendars()
            .await
            .map_err(|e| e.context("Failed to list calendars"))?;
        Ok(Self { client, calendars })
    }

    pub fn calendars(&self) -> &[Calendar] {
        &self.calendars
    }
}

// ============================================================================
// Tool Parameters
// ============================================================================

fn check_calendar_url(calendar_url: &str) -> Result<(), ConnectorError> {
    url::Url::parse(calendar_url).map(|_| ()).map_err(|e| {
        ConnectorError::InvalidParams(format!("calendarUrl is not a valid URL: {}", e))
    })
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventParams {
    /// Event title
    pub summary: String,
    /// Start time as an ISO-8601 date-time, e.g. 2025-06-15T10:00:00Z
    #[schemars(schema_with = "date_time_schema")]
    pub start: String,
    /// End time as an ISO-8601 date-time
    #[schemars(schema_with = "date_time_schema")]
    pub end: String,
    /// URL of the calendar, as returned by list-calendars
    pub calendar_url: String,
    /// Optional recurrence rule
    #[serde(default)]
    pub recurrence_rule: Option<RecurrenceRule>,
}

impl CreateEventParams {
    fn to_event(&self) -> Result<NewEvent, ConnectorError> {
        let start = parse_iso_datetime("start", &self.start)?;
        let end = parse_iso_datetime("end", &self.end)?;
        if end < start {
            return Err(ConnectorError::InvalidParams(
                "end must not be before start".to_string(),
            ));
        }
        Ok(NewEvent {
            summary: self.summary.clone(),
            start,
            end,
            recurrence: self.recurrence_rule.clone(),
        })
    }
}

impl ToolParams for CreateEventParams {
    fn validate(&self) -> Result<(), ConnectorError> {
        self.to_event()?;
        check_calendar_url(&self.calendar_url)?;
        if let Some(rule) = &self.recurrence_rule {
            rule.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListEventsParams {
    /// Range start; an ISO-8601 date-time or a YYYY-MM-DD date
    pub start: String,
    /// Range end; an ISO-8601 date-time or a YYYY-MM-DD date
    pub end: String,
    /// URL of the calendar, as returned by list-calendars
    pub calendar_url: String,
}

impl ListEventsParams {
    fn range(&self) -> Result<TimeRange, ConnectorError> {
        TimeRange::new(
            required_datetime("start", &self.start)?,
            required_datetime("end", &self.end)?,
        )
    }
}

impl ToolParams for ListEventsParams {
    fn validate(&self) -> Result<(), ConnectorError> {
        self.range()?;
        check_calendar_url(&self.calendar_url)
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeleteEventParams {
    /// UID of the event, as returned by create-event
    pub uid: String,
    /// URL of the calendar holding the event
    pub calendar_url: String,
}

impl ToolParams for DeleteEventParams {
    fn validate(&self) -> Result<(), ConnectorError> {
        if self.uid.trim().is_empty() {
            return Err(ConnectorError::InvalidParams("uid must not be empty".to_string()));
        }
        check_calendar_url(&self.calendar_url)
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListCalendarsParams {}

impl ToolParams for ListCalendarsParams {}

#[derive(Debug, Serialize)]
struct EventView {
    summary: String,
    start: String,
    end: String,
}

impl From<&EventSummary> for EventView {
    fn from(event: &EventSummary) -> Self {
        Self {
            summary: event.summary.clone(),
            start: event.start.to_rfc3339_opts(SecondsFormat::Millis, true),
            end: event.end.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

// ============================================================================
// Connector Implementation
// ============================================================================

#[async_trait]
impl crate::Connector for CalDavConnector {
    fn name(&self) -> &'static str {
        "caldav"
    }

    fn description(&self) -> &'static str {
        "CalDAV calendars: create, list and delete events on the configured server."
    }

    async fn capabilities(&self) -> ServerCapabilities {
        ServerCapabilities {
            tools: Some(ToolsCapability { list_changed: None }),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
    ) -> Result<ListToolsResult, ConnectorError> {
        let tools = vec![
            tool::<CreateEventParams>(
                "create-event",
                "Create Event",
                "Creates an event in the calendar specified by its URL",
            ),
            tool::<ListEventsParams>(
                "list-events",
                "List Events",
                "List all events between start and end date in the calendar specified by its URL",
            ),
            tool::<DeleteEventParams>(
                "delete-event",
                "Delete Event",
                "Deletes an event in the calendar specified by its URL",
            ),
            tool::<ListCalendarsParams>(
                "list-calendars",
                "List Calendars",
                "List all calendars returning both name and URL",
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
            "create-event" => {
                let params: CreateEventParams = parse_params(args)?;
                let event = params.to_event()?;
                let uid = self
                    .client
                    .create_event(&params.calendar_url, &event)
                    .await
                    .map_err(|e| e.context("Failed to create event"))?;
                debug!(uid = %uid, "Created event");
                Ok(text_result(uid))
            }

            "list-events" => {
                let params: ListEventsParams = parse_params(args)?;
                let range = params.range()?;
                let events = self
                    .client
                    .list_events(&params.calendar_url, range)
                    .await
                    .map_err(|e| e.context("Failed to list events"))?;
                let view: Vec<EventView> = events
                    .iter()
                    .filter(|e| e.intersects(&range))
                    .map(EventView::from)
                    .collect();
                json_text_result(&view)
            }

            "delete-event" => {
                let params: DeleteEventParams = parse_params(args)?;
                self.client
                    .delete_event(&params.calendar_url, &params.uid)
                    .await
                    .map_err(|e| e.context("Failed to delete event"))?;
                Ok(text_result("Event deleted"))
            }

            "list-calendars" => {
                let _: ListCalendarsParams = parse_params(args)?;
                json_text_result(&self.calendars)
            }

            _ => Err(ConnectorError::ToolNotFound(name.to_string())),
        }
    }
}
