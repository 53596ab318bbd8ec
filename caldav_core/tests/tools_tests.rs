use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use caldav_core::connectors::apple_reminders::{
    NewReminder, Reminder, ReminderList, ReminderUpdate, RemindersBridge,
};
use caldav_core::connectors::caldav::{
    Calendar, CalendarClient, EventSummary, NewEvent, TimeRange,
};
use caldav_core::mcp_server::{JsonRpcHandler, McpServer};
use caldav_core::{build_registry_with, ConnectorError};
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};

const CAL_URL: &str = "https://dav.example.com/calendars/alice/home/";

// ============================================================================
// In-memory fakes
// ============================================================================

#[derive(Default)]
struct FakeCalendar {
    events: Mutex<Vec<(String, EventSummary)>>,
    calls: Mutex<Vec<String>>,
    next_uid: Mutex<u32>,
}

impl FakeCalendar {
    fn with_events(events: Vec<EventSummary>) -> Self {
        let fake = Self::default();
        {
            let mut stored = fake.events.lock().unwrap();
            for event in events {
                stored.push((CAL_URL.to_string(), event));
            }
        }
        fake
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }
}

#[async_trait]
impl CalendarClient for FakeCalendar {
    async fn list_calendars(&self) -> Result<Vec<Calendar>, ConnectorError> {
        self.record("list_calendars");
        Ok(vec![Calendar {
            name: "Home".into(),
            url: CAL_URL.into(),
        }])
    }

    async fn create_event(
        &self,
        calendar_url: &str,
        event: &NewEvent,
    ) -> Result<String, ConnectorError> {
        self.record("create_event");
        let uid = {
            let mut next = self.next_uid.lock().unwrap();
            *next += 1;
            format!("event-{}", next)
        };
        self.events.lock().unwrap().push((
            calendar_url.to_string(),
            EventSummary {
                uid: Some(uid.clone()),
                summary: event.summary.clone(),
                start: event.start,
                end: event.end,
            },
        ));
        Ok(uid)
    }

    async fn list_events(
        &self,
        calendar_url: &str,
        range: TimeRange,
    ) -> Result<Vec<EventSummary>, ConnectorError> {
        self.record("list_events");
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|(url, e)| url == calendar_url && e.intersects(&range))
            .map(|(_, e)| e.clone())
            .collect())
    }

    async fn delete_event(&self, calendar_url: &str, uid: &str) -> Result<(), ConnectorError> {
        self.record("delete_event");
        let mut events = self.events.lock().unwrap();
        let before = events.len();
        events.retain(|(url, e)| !(url == calendar_url && e.uid.as_deref() == Some(uid)));
        if events.len() == before {
            return Err(ConnectorError::NotFound(format!("no event {}", uid)));
        }
        Ok(())
    }
}

#[derive(Default)]
struct FakeReminders {
    lists: Vec<ReminderList>,
    reminders: Mutex<Vec<(String, Reminder)>>,
    calls: Mutex<Vec<String>>,
}

impl FakeReminders {
    fn new(lists: &[(&str, &str)], reminders: Vec<(&str, Reminder)>) -> Self {
        Self {
            lists: lists
                .iter()
                .map(|(id, name)| ReminderList {
                    id: id.to_string(),
                    name: name.to_string(),
                    color: None,
                    emblem: None,
                })
                .collect(),
            reminders: Mutex::new(
                reminders
                    .into_iter()
                    .map(|(list, r)| (list.to_string(), r))
                    .collect(),
            ),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn get(&self, id: &str) -> Option<Reminder> {
        self.reminders
            .lock()
            .unwrap()
            .iter()
            .find(|(_, r)| r.id == id)
            .map(|(_, r)| r.clone())
    }
}

#[async_trait]
impl RemindersBridge for FakeReminders {
    async fn lists(&self) -> Result<Vec<ReminderList>, ConnectorError> {
        self.record("lists".into());
        Ok(self.lists.clone())
    }

    async fn reminders(&self, list_id: &str) -> Result<Vec<Reminder>, ConnectorError> {
        self.record(format!("reminders:{}", list_id));
        Ok(self
            .reminders
            .lock()
            .unwrap()
            .iter()
            .filter(|(list, _)| list == list_id)
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn create_reminder(
        &self,
        list_id: &str,
        reminder: &NewReminder,
    ) -> Result<String, ConnectorError> {
        self.record(format!("create:{}", list_id));
        let mut stored = self.reminders.lock().unwrap();
        let id = format!("rem-{}", stored.len() + 1);
        stored.push((
            list_id.to_string(),
            Reminder {
                id: id.clone(),
                title: reminder.title.clone(),
                notes: reminder.notes.clone(),
                completed: false,
                completion_date: None,
                due_date: reminder.due_date,
                priority: reminder.priority.unwrap_or(0),
            },
        ));
        Ok(id)
    }

    async fn update_reminder(
        &self,
        id: &str,
        update: &ReminderUpdate,
    ) -> Result<(), ConnectorError> {
        self.record(format!("update:{}", id));
        let mut stored = self.reminders.lock().unwrap();
        let (_, reminder) = stored
            .iter_mut()
            .find(|(_, r)| r.id == id)
            .ok_or_else(|| ConnectorError::NotFound(id.to_string()))?;
        if let Some(title) = &update.title {
            reminder.title = title.clone();
        }
        if let Some(notes) = &update.notes {
            reminder.notes = Some(notes.clone());
        }
        if let Some(due) = update.due_date {
            reminder.due_date = Some(due);
        }
        if let Some(priority) = update.priority {
            reminder.priority = priority;
        }
        if let Some(completed) = update.completed {
            reminder.completed = completed;
        }
        Ok(())
    }

    async fn delete_reminder(&self, id: &str) -> Result<(), ConnectorError> {
        self.record(format!("delete:{}", id));
        self.reminders.lock().unwrap().retain(|(_, r)| r.id != id);
        Ok(())
    }
}

fn reminder(id: &str, title: &str, completed: bool) -> Reminder {
    Reminder {
        id: id.into(),
        title: title.into(),
        notes: None,
        completed,
        completion_date: None,
        due_date: None,
        priority: 0,
    }
}

// ============================================================================
// Harness
// ============================================================================

async fn handler(
    calendar: Arc<FakeCalendar>,
    reminders: Option<Arc<FakeReminders>>,
) -> JsonRpcHandler {
    let bridge = reminders.map(|r| r as Arc<dyn RemindersBridge>);
    let registry = build_registry_with(calendar, bridge).await.unwrap();
    JsonRpcHandler::new(McpServer::new(Arc::new(registry)))
}

async fn call(handler: &JsonRpcHandler, tool: &str, arguments: Value) -> Value {
    handler
        .handle_request(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": {"name": tool, "arguments": arguments},
        }))
        .await
        .expect("requests with an id get a response")
}

fn text(response: &Value) -> &str {
    response["result"]["content"][0]["text"]
        .as_str()
        .unwrap_or_else(|| panic!("no text content in {}", response))
}

fn is_tool_error(response: &Value) -> bool {
    response["result"]["isError"] == json!(true)
}

fn sample_reminders() -> Arc<FakeReminders> {
    let mut milk = reminder("r1", "Buy milk", false);
    milk.notes = Some("2 litres".into());
    milk.priority = 2;
    milk.due_date = Some(Utc.with_ymd_and_hms(2025, 6, 15, 9, 0, 0).unwrap());

    Arc::new(FakeReminders::new(
        &[("inbox", "Inbox"), ("work", "Work"), ("home", "Home")],
        vec![
            ("inbox", milk),
            ("inbox", reminder("r2", "Old task", true)),
            ("work", reminder("r3", "Send report", false)),
            ("home", reminder("r4", "Send report", false)),
            ("work", reminder("r5", "Water plants", true)),
        ],
    ))
}

// ============================================================================
// Protocol surface
// ============================================================================

#[tokio::test]
async fn tools_list_includes_both_connectors() {
    let handler = handler(Arc::new(FakeCalendar::default()), Some(sample_reminders())).await;
    let response = handler
        .handle_request(json!({"jsonrpc": "2.0", "id": 7, "method": "tools/list"}))
        .await
        .unwrap();

    let names: Vec<&str> = response["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        vec![
            "create-event",
            "list-events",
            "delete-event",
            "list-calendars",
            "list-reminders",
            "create-reminder",
            "update-reminder",
            "complete-reminder",
            "delete-reminder",
            "list-reminder-lists",
        ]
    );
    assert_eq!(response["id"], 7);
}

#[tokio::test]
async fn reminder_tools_absent_without_bridge() {
    let handler = handler(Arc::new(FakeCalendar::default()), None).await;
    let response = handler
        .handle_request(json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}))
        .await
        .unwrap();
    assert_eq!(response["result"]["tools"].as_array().unwrap().len(), 4);

    let response = call(&handler, "list-reminder-lists", json!({})).await;
    assert_eq!(response["error"]["code"], -32602);
}

// ============================================================================
// Calendar tools
// ============================================================================

#[tokio::test]
async fn created_event_shows_up_in_listing() {
    let calendar = Arc::new(FakeCalendar::default());
    let handler = handler(calendar.clone(), None).await;

    let created = call(
        &handler,
        "create-event",
        json!({
            "summary": "Dentist",
            "start": "2025-06-15T10:00:00Z",
            "end": "2025-06-15T11:00:00Z",
            "calendarUrl": CAL_URL,
        }),
    )
    .await;
    assert!(!is_tool_error(&created));
    let uid = text(&created).to_string();
    assert!(!uid.is_empty());

    let listed = call(
        &handler,
        "list-events",
        json!({"start": "2025-06-15", "end": "2025-06-16", "calendarUrl": CAL_URL}),
    )
    .await;
    let events: Value = serde_json::from_str(text(&listed)).unwrap();
    assert_eq!(
        events,
        json!([{
            "summary": "Dentist",
            "start": "2025-06-15T10:00:00.000Z",
            "end": "2025-06-15T11:00:00.000Z",
        }])
    );
}

#[tokio::test]
async fn list_events_excludes_events_outside_range() {
    let at = |d, h| Utc.with_ymd_and_hms(2025, 6, d, h, 0, 0).unwrap();
    let calendar = Arc::new(FakeCalendar::with_events(vec![
        EventSummary {
            uid: Some("before".into()),
            summary: "Before".into(),
            start: at(1, 9),
            end: at(1, 10),
        },
        EventSummary {
            uid: Some("overlap".into()),
            summary: "Overlapping".into(),
            start: at(9, 22),
            end: at(10, 2),
        },
        EventSummary {
            uid: Some("inside".into()),
            summary: "Inside".into(),
            start: at(10, 12),
            end: at(10, 13),
        },
        EventSummary {
            uid: Some("after".into()),
            summary: "After".into(),
            start: at(20, 9),
            end: at(20, 10),
        },
    ]));
    let handler = handler(calendar, None).await;

    let listed = call(
        &handler,
        "list-events",
        json!({
            "start": "2025-06-10T00:00:00Z",
            "end": "2025-06-11T00:00:00Z",
            "calendarUrl": CAL_URL,
        }),
    )
    .await;
    let events: Vec<Value> = serde_json::from_str(text(&listed)).unwrap();
    let summaries: Vec<&str> = events.iter().map(|e| e["summary"].as_str().unwrap()).collect();
    assert_eq!(summaries, vec!["Overlapping", "Inside"]);
}

#[tokio::test]
async fn deleted_event_is_not_listed_again() {
    let calendar = Arc::new(FakeCalendar::default());
    let handler = handler(calendar.clone(), None).await;

    let created = call(
        &handler,
        "create-event",
        json!({
            "summary": "Standup",
            "start": "2025-06-16T09:00:00Z",
            "end": "2025-06-16T09:15:00Z",
            "calendarUrl": CAL_URL,
            "recurrenceRule": {"freq": "DAILY", "count": 5},
        }),
    )
    .await;
    let uid = text(&created).to_string();

    let deleted = call(
        &handler,
        "delete-event",
        json!({"uid": &uid, "calendarUrl": CAL_URL}),
    )
    .await;
    assert_eq!(text(&deleted), "Event deleted");

    let listed = call(
        &handler,
        "list-events",
        json!({"start": "2025-06-01", "end": "2025-06-30", "calendarUrl": CAL_URL}),
    )
    .await;
    assert_eq!(text(&listed), "[]");

    let again = call(
        &handler,
        "delete-event",
        json!({"uid": &uid, "calendarUrl": CAL_URL}),
    )
    .await;
    assert!(is_tool_error(&again));
    assert!(text(&again).starts_with("Failed to delete event: "));
}

#[tokio::test]
async fn list_calendars_uses_startup_snapshot() {
    let calendar = Arc::new(FakeCalendar::default());
    let handler = handler(calendar.clone(), None).await;

    for _ in 0..2 {
        let response = call(&handler, "list-calendars", json!({})).await;
        let calendars: Value = serde_json::from_str(text(&response)).unwrap();
        assert_eq!(calendars, json!([{"name": "Home", "url": CAL_URL}]));
    }
    assert_eq!(calendar.calls(), vec!["list_calendars"]);
}

#[tokio::test]
async fn missing_required_fields_never_reach_clients() {
    let calendar = Arc::new(FakeCalendar::default());
    let reminders = sample_reminders();
    let handler = handler(calendar.clone(), Some(reminders.clone())).await;

    let cases = [
        ("create-event", json!({"summary": "No times", "calendarUrl": CAL_URL})),
        ("list-events", json!({"start": "2025-06-01", "calendarUrl": CAL_URL})),
        ("delete-event", json!({"calendarUrl": CAL_URL})),
        ("create-reminder", json!({"notes": "untitled"})),
        ("update-reminder", json!({"newTitle": "Renamed"})),
        ("complete-reminder", json!({"listName": "Inbox"})),
        ("delete-reminder", json!({})),
    ];
    for (tool, arguments) in cases {
        let response = call(&handler, tool, arguments).await;
        assert_eq!(response["error"]["code"], -32602, "{} should be rejected", tool);
    }

    assert_eq!(calendar.calls(), vec!["list_calendars"]);
    assert!(reminders.calls().is_empty());
}

// ============================================================================
// Reminder tools
// ============================================================================

#[tokio::test]
async fn update_with_only_completed_leaves_other_fields() {
    let reminders = sample_reminders();
    let handler = handler(Arc::new(FakeCalendar::default()), Some(reminders.clone())).await;
    let before = reminders.get("r1").unwrap();

    let response = call(
        &handler,
        "update-reminder",
        json!({"title": "Buy milk", "completed": true}),
    )
    .await;
    assert_eq!(
        text(&response),
        "Successfully updated reminder: \"Buy milk\" in list \"Inbox\""
    );

    let after = reminders.get("r1").unwrap();
    assert!(after.completed);
    assert_eq!(after.title, before.title);
    assert_eq!(after.notes, before.notes);
    assert_eq!(after.due_date, before.due_date);
    assert_eq!(after.priority, before.priority);
}

#[tokio::test]
async fn update_reports_new_title_and_looks_in_every_list() {
    let reminders = sample_reminders();
    let handler = handler(Arc::new(FakeCalendar::default()), Some(reminders.clone())).await;

    let response = call(
        &handler,
        "update-reminder",
        json!({"title": "Send report", "newTitle": "Send Q2 report"}),
    )
    .await;
    assert_eq!(
        text(&response),
        "Successfully updated reminder: \"Send Q2 report\" in list \"Work\""
    );
    assert_eq!(reminders.get("r3").unwrap().title, "Send Q2 report");
    assert_eq!(reminders.get("r4").unwrap().title, "Send report");

    let calls = reminders.calls();
    for list in ["inbox", "work", "home"] {
        assert!(calls.contains(&format!("reminders:{}", list)));
    }
}

#[tokio::test]
async fn resolution_without_list_takes_first_match_in_list_order() {
    let reminders = sample_reminders();
    let handler = handler(Arc::new(FakeCalendar::default()), Some(reminders.clone())).await;

    let response = call(&handler, "complete-reminder", json!({"title": "Send report"})).await;
    assert_eq!(
        text(&response),
        "Successfully marked reminder as completed: \"Send report\" in list \"Work\""
    );
    assert!(reminders.get("r3").unwrap().completed);
    assert!(!reminders.get("r4").unwrap().completed);

    // The scan stops at the first hit.
    assert!(!reminders.calls().contains(&"reminders:home".to_string()));
}

#[tokio::test]
async fn complete_without_active_match_names_title_and_scope() {
    let reminders = sample_reminders();
    let handler = handler(Arc::new(FakeCalendar::default()), Some(reminders.clone())).await;

    let response = call(&handler, "complete-reminder", json!({"title": "Water plants"})).await;
    assert!(is_tool_error(&response));
    assert_eq!(
        text(&response),
        "Failed to complete reminder: Active reminder 'Water plants' not found in any list"
    );

    let response = call(
        &handler,
        "complete-reminder",
        json!({"title": "Buy milk", "listName": "Work"}),
    )
    .await;
    assert_eq!(
        text(&response),
        "Failed to complete reminder: Active reminder 'Buy milk' not found in list 'Work'"
    );

    assert!(!reminders.calls().iter().any(|c| c.starts_with("update:")));
}

#[tokio::test]
async fn list_reminders_without_list_shows_available_lists() {
    let handler = handler(Arc::new(FakeCalendar::default()), Some(sample_reminders())).await;

    let response = call(&handler, "list-reminders", json!({})).await;
    let body = text(&response);
    let json_part = body.strip_prefix("Available reminder lists:\n").unwrap();
    let lists: Value = serde_json::from_str(json_part).unwrap();
    assert_eq!(
        lists,
        json!([
            {"id": "inbox", "name": "Inbox"},
            {"id": "work", "name": "Work"},
            {"id": "home", "name": "Home"},
        ])
    );
}

#[tokio::test]
async fn list_reminders_filters_completed_and_search() {
    let handler = handler(Arc::new(FakeCalendar::default()), Some(sample_reminders())).await;

    let response = call(&handler, "list-reminders", json!({"listName": "inbox"})).await;
    let items: Vec<Value> = serde_json::from_str(text(&response)).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(
        items[0],
        json!({
            "id": "r1",
            "title": "Buy milk",
            "notes": "2 litres",
            "completed": false,
            "completionDate": null,
            "dueDate": "2025-06-15T09:00:00.000Z",
            "priority": 2,
            "list": "inbox",
        })
    );

    let response = call(
        &handler,
        "list-reminders",
        json!({"listName": "Inbox", "showCompleted": true, "search": "LITRES"}),
    )
    .await;
    let items: Vec<Value> = serde_json::from_str(text(&response)).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], "r1");

    let response = call(
        &handler,
        "list-reminders",
        json!({"listName": "Inbox", "showCompleted": true}),
    )
    .await;
    let items: Vec<Value> = serde_json::from_str(text(&response)).unwrap();
    assert_eq!(items.len(), 2);

    let response = call(
        &handler,
        "list-reminders",
        json!({"listName": "Inbox", "showCompleted": null}),
    )
    .await;
    assert!(!is_tool_error(&response));
    let items: Vec<Value> = serde_json::from_str(text(&response)).unwrap();
    assert_eq!(items.len(), 1);
}

#[tokio::test]
async fn unknown_list_lists_alternatives() {
    let handler = handler(Arc::new(FakeCalendar::default()), Some(sample_reminders())).await;

    let response = call(&handler, "list-reminders", json!({"listName": "Errands"})).await;
    assert!(is_tool_error(&response));
    assert_eq!(
        text(&response),
        "Failed to list reminders: List 'Errands' not found. Available lists: Inbox, Work, Home"
    );
}

#[tokio::test]
async fn create_reminder_defaults_to_first_list() {
    let reminders = sample_reminders();
    let handler = handler(Arc::new(FakeCalendar::default()), Some(reminders.clone())).await;

    let response = call(
        &handler,
        "create-reminder",
        json!({"title": "Call plumber", "notes": "", "priority": 3}),
    )
    .await;
    assert_eq!(
        text(&response),
        "Successfully created reminder: \"Call plumber\" in list \"Inbox\" with ID: rem-6"
    );
    let created = reminders.get("rem-6").unwrap();
    assert_eq!(created.notes, None);
    assert_eq!(created.priority, 3);
    assert!(reminders.calls().contains(&"create:inbox".to_string()));

    let response = call(
        &handler,
        "create-reminder",
        json!({"title": "Book flights", "listName": "home", "dueDate": "2025-07-01T08:00:00Z"}),
    )
    .await;
    assert!(text(&response).contains("in list \"Home\""));
}

#[tokio::test]
async fn create_reminder_without_lists_fails() {
    let reminders = Arc::new(FakeReminders::new(&[], vec![]));
    let handler = handler(Arc::new(FakeCalendar::default()), Some(reminders)).await;

    let response = call(&handler, "create-reminder", json!({"title": "Anything"})).await;
    assert!(is_tool_error(&response));
    assert_eq!(
        text(&response),
        "Failed to create reminder: No reminder lists found"
    );
}

#[tokio::test]
async fn delete_reminder_scans_until_found() {
    let reminders = sample_reminders();
    let handler = handler(Arc::new(FakeCalendar::default()), Some(reminders.clone())).await;

    let response = call(&handler, "delete-reminder", json!({"title": "Water plants"})).await;
    assert_eq!(
        text(&response),
        "Successfully deleted reminder: \"Water plants\" from list \"Work\""
    );
    assert!(reminders.get("r5").is_none());

    let response = call(&handler, "delete-reminder", json!({"title": "Water plants"})).await;
    assert_eq!(
        text(&response),
        "Failed to delete reminder: Reminder 'Water plants' not found in any list"
    );
}

#[tokio::test]
async fn list_reminder_lists_includes_color_and_emblem() {
    let handler = handler(Arc::new(FakeCalendar::default()), Some(sample_reminders())).await;

    let response = call(&handler, "list-reminder-lists", json!({})).await;
    let lists: Value = serde_json::from_str(text(&response)).unwrap();
    assert_eq!(
        lists[0],
        json!({"id": "inbox", "name": "Inbox", "color": null, "emblem": null})
    );
    assert_eq!(lists.as_array().unwrap().len(), 3);
}
