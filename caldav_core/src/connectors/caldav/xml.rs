//! WebDAV request bodies and multistatus parsing.

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::error::ConnectorError;

pub const PROPFIND_PRINCIPAL: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<D:propfind xmlns:D="DAV:">
  <D:prop>
    <D:current-user-principal/>
  </D:prop>
</D:propfind>"#;

pub const PROPFIND_HOME_SET: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<D:propfind xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
  <D:prop>
    <C:calendar-home-set/>
  </D:prop>
</D:propfind>"#;

pub const PROPFIND_CALENDARS: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<D:propfind xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
  <D:prop>
    <D:displayname/>
    <D:resourcetype/>
    <C:supported-calendar-component-set/>
  </D:prop>
</D:propfind>"#;

/// `calendar-query` REPORT body for VEVENTs overlapping `[start, end)`,
/// with recurring events expanded server-side.
pub fn calendar_query(start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    let start = start.format("%Y%m%dT%H%M%SZ");
    let end = end.format("%Y%m%dT%H%M%SZ");
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<C:calendar-query xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
  <D:prop>
    <D:getetag/>
    <C:calendar-data>
      <C:expand start="{start}" end="{end}"/>
    </C:calendar-data>
  </D:prop>
  <C:filter>
    <C:comp-filter name="VCALENDAR">
      <C:comp-filter name="VEVENT">
        <C:time-range start="{start}" end="{end}"/>
      </C:comp-filter>
    </C:comp-filter>
  </C:filter>
</C:calendar-query>"#
    )
}

/// One `<response>` of a multistatus body, holding only properties reported
/// with a 2xx `propstat` status.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DavResponse {
    pub href: String,
    pub display_name: Option<String>,
    pub current_user_principal: Option<String>,
    pub calendar_home_set: Option<String>,
    pub is_calendar: bool,
    pub components: Vec<String>,
    pub calendar_data: Option<String>,
}

impl DavResponse {
    /// Collections advertising no component set are assumed to hold events.
    pub fn supports_events(&self) -> bool {
        self.components.is_empty() || self.components.iter().any(|c| c.eq_ignore_ascii_case("VEVENT"))
    }
}

#[derive(Default)]
struct PropSet {
    display_name: Option<String>,
    current_user_principal: Option<String>,
    calendar_home_set: Option<String>,
    is_calendar: bool,
    components: Vec<String>,
    calendar_data: Option<String>,
}

impl PropSet {
    fn merge_into(self, response: &mut DavResponse) {
        if self.display_name.is_some() {
            response.display_name = self.display_name;
        }
        if self.current_user_principal.is_some() {
            response.current_user_principal = self.current_user_principal;
        }
        if self.calendar_home_set.is_some() {
            response.calendar_home_set = self.calendar_home_set;
        }
        response.is_calendar |= self.is_calendar;
        response.components.extend(self.components);
        if self.calendar_data.is_some() {
            response.calendar_data = self.calendar_data;
        }
    }
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).to_string()
}

fn comp_name(e: &BytesStart<'_>) -> Option<String> {
    e.attributes()
        .filter_map(Result::ok)
        .find(|attr| attr.key.local_name().as_ref() == b"name")
        .map(|attr| String::from_utf8_lossy(&attr.value).to_string())
}

/// `HTTP/1.1 200 OK` and friends. A missing status counts as success.
fn status_is_success(status: Option<&str>) -> bool {
    match status {
        None => true,
        Some(line) => line
            .split_whitespace()
            .nth(1)
            .and_then(|code| code.parse::<u16>().ok())
            .is_some_and(|code| (200..300).contains(&code)),
    }
}

/// Parse a `207 Multi-Status` body. Element matching uses local names only,
/// so any namespace prefix the server picks is accepted.
pub fn parse_multistatus(xml: &str) -> Result<Vec<DavResponse>, ConnectorError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut responses = Vec::new();
    let mut current: Option<DavResponse> = None;
    let mut pending = PropSet::default();
    let mut propstat_status: Option<String> = None;
    let mut stack: Vec<String> = Vec::new();
    let mut buffer = Vec::new();

    loop {
        match reader.read_event_into(&mut buffer) {
            Ok(Event::Start(ref e)) => {
                let name = local_name(e);
                match name.as_str() {
                    "response" => current = Some(DavResponse::default()),
                    "propstat" => {
                        pending = PropSet::default();
                        propstat_status = None;
                    }
                    _ => on_element(&name, e, &stack, &mut pending),
                }
                stack.push(name);
            }
            Ok(Event::Empty(ref e)) => {
                let name = local_name(e);
                on_element(&name, e, &stack, &mut pending);
            }
            Ok(Event::Text(ref e)) => {
                let text = e.unescape()?.to_string();
                on_text(text, &stack, &mut current, &mut pending, &mut propstat_status);
            }
            Ok(Event::CData(e)) => {
                let text = String::from_utf8_lossy(&e.into_inner()).to_string();
                on_text(text, &stack, &mut current, &mut pending, &mut propstat_status);
            }
            Ok(Event::End(_)) => match stack.pop().as_deref() {
                Some("propstat") => {
                    let props = std::mem::take(&mut pending);
                    if status_is_success(propstat_status.as_deref()) {
                        if let Some(response) = current.as_mut() {
                            props.merge_into(response);
                        }
                    }
                }
                Some("response") => {
                    if let Some(response) = current.take() {
                        responses.push(response);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.into()),
            _ => {}
        }

        buffer.clear();
    }

    Ok(responses)
}

fn on_element(name: &str, e: &BytesStart<'_>, stack: &[String], pending: &mut PropSet) {
    let parent = stack.last().map(String::as_str);
    match (name, parent) {
        ("calendar", Some("resourcetype")) => pending.is_calendar = true,
        ("comp", Some("supported-calendar-component-set")) => {
            if let Some(comp) = comp_name(e) {
                pending.components.push(comp);
            }
        }
        _ => {}
    }
}

fn on_text(
    text: String,
    stack: &[String],
    current: &mut Option<DavResponse>,
    pending: &mut PropSet,
    propstat_status: &mut Option<String>,
) {
    let Some(element) = stack.last().map(String::as_str) else {
        return;
    };
    let parent = stack.len().checked_sub(2).map(|i| stack[i].as_str());

    match (element, parent) {
        ("href", Some("response")) => {
            if let Some(response) = current.as_mut() {
                response.href = text;
            }
        }
        ("href", Some("current-user-principal")) => pending.current_user_principal = Some(text),
        ("href", Some("calendar-home-set")) => {
            // Servers may list several home sets; the first one wins.
            if pending.calendar_home_set.is_none() {
                pending.calendar_home_set = Some(text);
            }
        }
        ("displayname", _) => pending.display_name = Some(text),
        ("calendar-data", _) => match pending.calendar_data.as_mut() {
            Some(data) => data.push_str(&text),
            None => pending.calendar_data = Some(text),
        },
        ("status", Some("propstat")) => *propstat_status = Some(text),
        _ => {}
    }
}
