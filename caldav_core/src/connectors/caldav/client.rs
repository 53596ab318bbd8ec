//! CalDAV client abstraction and its HTTP implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Method, StatusCode};
use tracing::{debug, warn};
use url::Url;

use super::ical::{build_vevent, parse_events};
use super::types::{Calendar, EventSummary, NewEvent, TimeRange};
use super::xml::{
    calendar_query, parse_multistatus, DavResponse, PROPFIND_CALENDARS, PROPFIND_HOME_SET,
    PROPFIND_PRINCIPAL,
};
use crate::error::ConnectorError;

/// Operations the calendar tools need from a CalDAV server.
#[async_trait]
pub trait CalendarClient: Send + Sync {
    /// Event-capable calendar collections under the user's calendar home.
    async fn list_calendars(&self) -> Result<Vec<Calendar>, ConnectorError>;

    /// Store a new event and return its generated UID.
    async fn create_event(
        &self,
        calendar_url: &str,
        event: &NewEvent,
    ) -> Result<String, ConnectorError>;

    /// Event instances intersecting `range`, recurring events expanded.
    async fn list_events(
        &self,
        calendar_url: &str,
        range: TimeRange,
    ) -> Result<Vec<EventSummary>, ConnectorError>;

    async fn delete_event(&self, calendar_url: &str, uid: &str) -> Result<(), ConnectorError>;
}

/// `<calendarUrl>/<uid>.ics`
pub fn event_url(calendar_url: &str, uid: &str) -> Result<Url, ConnectorError> {
    let mut url = Url::parse(calendar_url).map_err(|e| {
        ConnectorError::InvalidParams(format!("calendarUrl is not a valid URL: {}", e))
    })?;
    url.path_segments_mut()
        .map_err(|_| ConnectorError::InvalidParams("calendarUrl cannot hold events".to_string()))?
        .pop_if_empty()
        .push(&format!("{}.ics", uid));
    Ok(url)
}

fn dav_method(name: &'static str) -> Result<Method, ConnectorError> {
    Method::from_bytes(name.as_bytes())
        .map_err(|e| ConnectorError::InternalError(format!("invalid HTTP method {}: {}", name, e)))
}

/// CalDAV over HTTP basic auth.
pub struct HttpCalDavClient {
    client: reqwest::Client,
    username: String,
    password: String,
    home_set: Url,
}

impl HttpCalDavClient {
    /// Authenticate and discover the calendar home. Credential problems
    /// surface here rather than on the first tool call.
    pub async fn connect(
        base_url: &Url,
        username: &str,
        password: &str,
    ) -> Result<Self, ConnectorError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("caldav-mcp/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(15))
            .build()?;

        let mut dav = Self {
            client,
            username: username.to_string(),
            password: password.to_string(),
            home_set: base_url.clone(),
        };

        let principal = dav.discover_principal(base_url).await?;
        dav.home_set = dav.discover_home_set(&principal).await?;
        debug!(principal = %principal, home_set = %dav.home_set, "CalDAV discovery complete");
        Ok(dav)
    }

    pub fn home_set(&self) -> &Url {
        &self.home_set
    }

    async fn discover_principal(&self, base_url: &Url) -> Result<Url, ConnectorError> {
        let found = self
            .propfind_href(base_url, PROPFIND_PRINCIPAL, |r| {
                r.current_user_principal.clone()
            })
            .await?;
        Ok(found.unwrap_or_else(|| base_url.clone()))
    }

    async fn discover_home_set(&self, principal: &Url) -> Result<Url, ConnectorError> {
        let found = self
            .propfind_href(principal, PROPFIND_HOME_SET, |r| r.calendar_home_set.clone())
            .await?;
        Ok(found.unwrap_or_else(|| principal.clone()))
    }

    /// Depth 0 PROPFIND returning the first href `pick` extracts, resolved
    /// against `url`. Non-auth failures fall back to `None`.
    async fn propfind_href<F>(
        &self,
        url: &Url,
        body: &'static str,
        pick: F,
    ) -> Result<Option<Url>, ConnectorError>
    where
        F: Fn(&DavResponse) -> Option<String>,
    {
        let responses = match self.propfind(url, "0", body).await {
            Ok(responses) => responses,
            Err(ConnectorError::Upstream { method, url, status }) => {
                warn!(%method, %url, status, "Discovery request failed, using fallback URL");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        Ok(responses
            .iter()
            .filter_map(pick)
            .find_map(|href| url.join(href.trim()).ok()))
    }

    async fn propfind(
        &self,
        url: &Url,
        depth: &'static str,
        body: &'static str,
    ) -> Result<Vec<DavResponse>, ConnectorError> {
        let method = dav_method("PROPFIND")?;
        let request = self
            .request(method.clone(), url)
            .header("Depth", depth)
            .header(header::CONTENT_TYPE, "application/xml; charset=utf-8")
            .body(body);
        let text = self.send(&method, url, request).await?.text().await?;
        parse_multistatus(&text)
    }

    fn request(&self, method: Method, url: &Url) -> reqwest::RequestBuilder {
        self.client
            .request(method, url.clone())
            .basic_auth(&self.username, Some(&self.password))
    }

    async fn send(
        &self,
        method: &Method,
        url: &Url,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ConnectorError> {
        debug!(%method, %url, "CalDAV request");
        let response = request.send().await?;
        check_status(method, url, response)
    }
}

fn check_status(
    method: &Method,
    url: &Url,
    response: reqwest::Response,
) -> Result<reqwest::Response, ConnectorError> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ConnectorError::Authentication(format!(
            "{} {} returned {}",
            method,
            url,
            status.as_u16()
        )));
    }
    if !status.is_success() {
        return Err(ConnectorError::Upstream {
            method: method.to_string(),
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    Ok(response)
}

fn calendar_name(response: &DavResponse, url: &Url) -> String {
    response
        .display_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .or_else(|| {
            url.path_segments()
                .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
                .map(str::to_string)
        })
        .unwrap_or_else(|| url.to_string())
}

#[async_trait]
impl CalendarClient for HttpCalDavClient {
    async fn list_calendars(&self) -> Result<Vec<Calendar>, ConnectorError> {
        let responses = self.propfind(&self.home_set, "1", PROPFIND_CALENDARS).await?;

        let mut calendars = Vec::new();
        for response in &responses {
            if !response.is_calendar || !response.supports_events() {
                continue;
            }
            let Ok(url) = self.home_set.join(response.href.trim()) else {
                warn!(href = %response.href, "Skipping calendar with unresolvable href");
                continue;
            };
            calendars.push(Calendar {
                name: calendar_name(response, &url),
                url: url.to_string(),
            });
        }
        Ok(calendars)
    }

    async fn create_event(
        &self,
        calendar_url: &str,
        event: &NewEvent,
    ) -> Result<String, ConnectorError> {
        let uid = uuid::Uuid::new_v4().to_string();
        let url = event_url(calendar_url, &uid)?;
        let body = build_vevent(event, &uid);

        let method = Method::PUT;
        let request = self
            .request(method.clone(), &url)
            .header(header::CONTENT_TYPE, "text/calendar; charset=utf-8")
            .header(header::IF_NONE_MATCH, "*")
            .body(body);
        self.send(&method, &url, request).await?;
        Ok(uid)
    }

    async fn list_events(
        &self,
        calendar_url: &str,
        range: TimeRange,
    ) -> Result<Vec<EventSummary>, ConnectorError> {
        let url = Url::parse(calendar_url).map_err(|e| {
            ConnectorError::InvalidParams(format!("calendarUrl is not a valid URL: {}", e))
        })?;
        // The server's time-range is half-open; widen it so events touching
        // either bound come back, then filter on the closed interval.
        let slack = chrono::Duration::seconds(1);
        let body = calendar_query(range.start - slack, range.end + slack);

        let method = dav_method("REPORT")?;
        let request = self
            .request(method.clone(), &url)
            .header("Depth", "1")
            .header(header::CONTENT_TYPE, "application/xml; charset=utf-8")
            .body(body);
        let text = self.send(&method, &url, request).await?.text().await?;

        let mut events = Vec::new();
        for response in parse_multistatus(&text)? {
            let Some(data) = response.calendar_data.as_deref() else {
                continue;
            };
            match parse_events(data) {
                Ok(parsed) => events.extend(parsed.into_iter().filter(|e| e.intersects(&range))),
                Err(e) => warn!(href = %response.href, "Skipping unreadable calendar object: {}", e),
            }
        }
        events.sort_by_key(|e| e.start);
        Ok(events)
    }

    async fn delete_event(&self, calendar_url: &str, uid: &str) -> Result<(), ConnectorError> {
        let url = event_url(calendar_url, uid)?;
        let method = Method::DELETE;
        let request = self.request(method.clone(), &url);
        self.send(&method, &url, request).await?;
        Ok(())
    }
}
