//! Typed records for CalDAV operations.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ConnectorError;

/// A calendar collection discovered under the user's calendar home.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Calendar {
    /// Display name, falling back to the last path segment of the URL.
    pub name: String,
    /// Absolute URL of the collection.
    pub url: String,
}

/// Event to be created.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub summary: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub recurrence: Option<RecurrenceRule>,
}

/// Event instance as read back from the server.
#[derive(Debug, Clone, PartialEq)]
pub struct EventSummary {
    pub uid: Option<String>,
    pub summary: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl EventSummary {
    /// Closed-interval overlap with `range`.
    pub fn intersects(&self, range: &TimeRange) -> bool {
        self.start <= range.end && self.end >= range.start
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, ConnectorError> {
        if end < start {
            return Err(ConnectorError::InvalidParams(
                "end must not be before start".to_string(),
            ));
        }
        Ok(Self { start, end })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "DAILY",
            Frequency::Weekly => "WEEKLY",
            Frequency::Monthly => "MONTHLY",
            Frequency::Yearly => "YEARLY",
        }
    }
}

/// Structured RFC 5545 recurrence rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecurrenceRule {
    /// Repeat frequency
    pub freq: Frequency,
    /// Interval between occurrences, in units of `freq`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u32>,
    /// Total number of occurrences
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    /// Last possible occurrence (ISO-8601 date-time)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "crate::connectors::caldav::types::date_time_schema")]
    pub until: Option<String>,
    /// Weekdays, optionally with an ordinal, e.g. ["MO", "TU", "-1FR"]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub byday: Option<Vec<String>>,
    /// Days of the month, 1..31 or -31..-1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bymonthday: Option<Vec<i32>>,
    /// Months of the year, 1..12
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bymonth: Option<Vec<u32>>,
}

const WEEKDAYS: [&str; 7] = ["MO", "TU", "WE", "TH", "FR", "SA", "SU"];

impl RecurrenceRule {
    pub fn validate(&self) -> Result<(), ConnectorError> {
        let invalid = |msg: String| Err(ConnectorError::InvalidParams(msg));

        if self.interval == Some(0) {
            return invalid("recurrenceRule.interval must be at least 1".into());
        }
        if self.count == Some(0) {
            return invalid("recurrenceRule.count must be at least 1".into());
        }
        if self.count.is_some() && self.until.is_some() {
            return invalid("recurrenceRule.count and recurrenceRule.until are mutually exclusive".into());
        }
        if let Some(until) = &self.until {
            crate::utils::parse_iso_datetime("recurrenceRule.until", until)?;
        }
        for day in self.byday.iter().flatten() {
            if !is_weekday_token(day) {
                return invalid(format!("recurrenceRule.byday has an invalid entry '{}'", day));
            }
        }
        for day in self.bymonthday.iter().flatten() {
            if *day == 0 || !(-31..=31).contains(day) {
                return invalid(format!("recurrenceRule.bymonthday has an invalid entry {}", day));
            }
        }
        for month in self.bymonth.iter().flatten() {
            if !(1..=12).contains(month) {
                return invalid(format!("recurrenceRule.bymonth has an invalid entry {}", month));
            }
        }
        Ok(())
    }

    /// Render as an `RRULE` property value.
    pub fn to_rrule(&self) -> String {
        let mut parts = vec![format!("FREQ={}", self.freq.as_str())];
        if let Some(interval) = self.interval {
            parts.push(format!("INTERVAL={}", interval));
        }
        if let Some(count) = self.count {
            parts.push(format!("COUNT={}", count));
        }
        if let Some(until) = self
            .until
            .as_deref()
            .and_then(|u| DateTime::parse_from_rfc3339(u).ok())
        {
            parts.push(format!(
                "UNTIL={}",
                until.with_timezone(&Utc).format("%Y%m%dT%H%M%SZ")
            ));
        }
        if let Some(days) = self.byday.as_ref().filter(|d| !d.is_empty()) {
            let days: Vec<String> = days.iter().map(|d| d.trim().to_ascii_uppercase()).collect();
            parts.push(format!("BYDAY={}", days.join(",")));
        }
        if let Some(days) = self.bymonthday.as_ref().filter(|d| !d.is_empty()) {
            let days: Vec<String> = days.iter().map(|d| d.to_string()).collect();
            parts.push(format!("BYMONTHDAY={}", days.join(",")));
        }
        if let Some(months) = self.bymonth.as_ref().filter(|m| !m.is_empty()) {
            let months: Vec<String> = months.iter().map(|m| m.to_string()).collect();
            parts.push(format!("BYMONTH={}", months.join(",")));
        }
        parts.join(";")
    }
}

/// `[+-]?\d{0,2}` followed by a two-letter weekday.
fn is_weekday_token(token: &str) -> bool {
    let token = token.trim().to_ascii_uppercase();
    if !token.is_ascii() || token.len() < 2 {
        return false;
    }
    let (prefix, day) = token.split_at(token.len() - 2);
    if !WEEKDAYS.contains(&day) {
        return false;
    }
    let digits = prefix
        .strip_prefix('+')
        .or_else(|| prefix.strip_prefix('-'))
        .unwrap_or(prefix);
    if prefix.len() != digits.len() && digits.is_empty() {
        return false;
    }
    digits.len() <= 2
        && digits.chars().all(|c| c.is_ascii_digit())
        && digits.parse::<u32>().map_or(true, |n| (1..=53).contains(&n))
}

/// `string` with `format: date-time`.
pub(crate) fn date_time_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
    let mut schema = String::json_schema(gen).into_object();
    schema.format = Some("date-time".to_string());
    schema.into()
}
