//! iCalendar build/parse helpers using the `icalendar` crate.

use chrono::{DateTime, Duration, Local, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use icalendar::{Calendar, CalendarComponent, CalendarDateTime, Component, DatePerhapsTime, Event};
use tracing::debug;

use super::types::{EventSummary, NewEvent};
use crate::error::ConnectorError;

/// Build a VCALENDAR string containing a single VEVENT.
#[must_use]
pub fn build_vevent(event: &NewEvent, uid: &str) -> String {
    let mut vevent = Event::new();
    vevent.uid(uid);
    vevent.timestamp(Utc::now());
    vevent.summary(&event.summary);
    vevent.add_property("DTSTART", format_utc(&event.start));
    vevent.add_property("DTEND", format_utc(&event.end));
    if let Some(rule) = &event.recurrence {
        vevent.add_property("RRULE", rule.to_rrule());
    }

    let cal = Calendar::new().push(vevent).done();
    cal.to_string()
}

fn format_utc(dt: &DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}

/// A DTSTART/DTEND value resolved to UTC. Floating times, and TZIDs
/// chrono-tz does not know, are read as local time.
fn to_utc(value: &DatePerhapsTime) -> Option<DateTime<Utc>> {
    let naive = match value {
        DatePerhapsTime::Date(date) => {
            return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
        }
        DatePerhapsTime::DateTime(CalendarDateTime::Utc(dt)) => return Some(*dt),
        DatePerhapsTime::DateTime(CalendarDateTime::WithTimezone { date_time, tzid }) => {
            if let Ok(tz) = tzid.parse::<Tz>() {
                return tz
                    .from_local_datetime(date_time)
                    .earliest()
                    .map(|dt| dt.with_timezone(&Utc));
            }
            date_time
        }
        DatePerhapsTime::DateTime(CalendarDateTime::Floating(date_time)) => date_time,
    };
    Local
        .from_local_datetime(naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// DTSTART as UTC plus whether it is a DATE. A bare `YYYYMMDD` without
/// `VALUE=DATE` is accepted as a date too.
fn event_start(event: &Event) -> Option<(DateTime<Utc>, bool)> {
    if let Some(start) = event.get_start() {
        let is_date = matches!(start, DatePerhapsTime::Date(_));
        return to_utc(&start).map(|dt| (dt, is_date));
    }
    let raw = event.property_value("DTSTART")?;
    let date = NaiveDate::parse_from_str(raw.trim(), "%Y%m%d").ok()?;
    Some((Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?), true))
}

/// `[+-]P[nW]` or `[+-]P[nD][T[nH][nM][nS]]`. Values chrono cannot represent
/// are rejected.
fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    let (negative, rest) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value.strip_prefix('+').unwrap_or(value)),
    };
    let rest = rest.strip_prefix('P')?;

    let mut total = Duration::zero();
    let mut number = String::new();
    let mut in_time = false;
    for c in rest.chars() {
        match c {
            'T' => in_time = true,
            '0'..='9' => number.push(c),
            unit => {
                let n: i64 = number.parse().ok()?;
                number.clear();
                let part = match (unit, in_time) {
                    ('W', false) => Duration::try_weeks(n),
                    ('D', false) => Duration::try_days(n),
                    ('H', true) => Duration::try_hours(n),
                    ('M', true) => Duration::try_minutes(n),
                    ('S', true) => Duration::try_seconds(n),
                    _ => None,
                }?;
                total = total.checked_add(&part)?;
            }
        }
    }
    if !number.is_empty() {
        return None;
    }
    Some(if negative { -total } else { total })
}

/// End falls back to DTSTART + DURATION, then one day for DATE events,
/// then the start itself.
fn event_end(event: &Event, start: DateTime<Utc>, is_date: bool) -> Option<DateTime<Utc>> {
    if let Some(end) = event.get_end().as_ref().and_then(to_utc) {
        return Some(end);
    }
    match event.property_value("DURATION") {
        Some(raw) => start.checked_add_signed(parse_duration(raw)?),
        None if is_date => start.checked_add_signed(Duration::try_days(1)?),
        None => Some(start),
    }
}

/// Extract every VEVENT in `data`. Events without a usable DTSTART, or whose
/// end cannot be computed, are skipped.
pub fn parse_events(data: &str) -> Result<Vec<EventSummary>, ConnectorError> {
    if !data
        .trim_start()
        .get(..15)
        .is_some_and(|head| head.eq_ignore_ascii_case("BEGIN:VCALENDAR"))
    {
        return Err(ConnectorError::Calendar(
            "calendar data does not start with BEGIN:VCALENDAR".to_string(),
        ));
    }

    let calendar: Calendar = data
        .parse()
        .map_err(|e| ConnectorError::Calendar(format!("failed to parse iCalendar data: {}", e)))?;

    let mut events = Vec::new();
    for component in &calendar.components {
        let CalendarComponent::Event(vevent) = component else {
            continue;
        };
        let Some((start, is_date)) = event_start(vevent) else {
            debug!("Skipping VEVENT without a usable DTSTART");
            continue;
        };
        let Some(end) = event_end(vevent, start, is_date) else {
            debug!(uid = ?vevent.get_uid(), "Skipping VEVENT with an unusable end or duration");
            continue;
        };
        events.push(EventSummary {
            uid: vevent.get_uid().map(String::from),
            summary: vevent.get_summary().unwrap_or_default().to_string(),
            start,
            end,
        });
    }

    Ok(events)
}
