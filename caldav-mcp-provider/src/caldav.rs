//! CalDAV client helpers using libdav.
//!
//! Provides the HTTP client stack, href helpers and the time-range REPORT that
//! libdav does not ship. Discovery, collection listing and PUT use libdav's
//! own requests.

use caldav_mcp_core::{CalendarError, CalendarObject, CalendarResult};
use http::{Method, StatusCode, Uri};
use hyper_rustls::HttpsConnectorBuilder;
use hyper_util::{client::legacy::Client, rt::TokioExecutor};
use libdav::CalDavClient;
use libdav::dav::{WebDavClient, WebDavError};
use libdav::requests::{DavRequest, ParseResponseError, PreparedRequest};
use tower::ServiceBuilder;
use tower_http::{auth::AddAuthorization, follow_redirect::FollowRedirect};

const XML_CONTENT_TYPE: &str = "application/xml; charset=utf-8";

/// Type alias for the HTTP client with auth and redirect following.
type HttpClient = FollowRedirect<
    AddAuthorization<
        Client<hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>, String>,
    >,
>;

/// Type alias for our CalDAV client.
pub type SessionClient = CalDavClient<HttpClient>;

/// Error returned by requests sent through [`SessionClient`].
pub type DavError = WebDavError<hyper_util::client::legacy::Error>;

/// Create a libdav CalDavClient for `base_url`.
///
/// The client is configured with:
/// - Basic authentication using the provided credentials
/// - Automatic redirect following (hosted services redirect to per-user servers)
/// - HTTPS support
pub fn create_caldav_client(
    base_url: &Uri,
    username: &str,
    password: &str,
) -> CalendarResult<SessionClient> {
    let https_connector = HttpsConnectorBuilder::new()
        .with_native_roots()
        .map_err(|e| CalendarError::Network(format!("Failed to load native TLS roots: {e}")))?
        .https_or_http()
        .enable_http1()
        .build();

    let http_client = Client::builder(TokioExecutor::new()).build(https_connector);

    // Add basic auth
    let auth_client = AddAuthorization::basic(http_client, username, password);

    let client = ServiceBuilder::new()
        .layer(tower_http::follow_redirect::FollowRedirectLayer::new())
        .service(auth_client);

    let webdav = WebDavClient::new(base_url.clone(), client);
    Ok(CalDavClient::new(webdav))
}

/// Build the href for an event resource inside a collection.
pub fn event_href(collection_href: &str, event_uid: &str) -> String {
    let base = collection_href.trim_end_matches('/');
    format!("{}/{}.ics", base, event_uid)
}

/// Extract the href path from a full URL.
///
/// Converts "https://dav.example.com/123/calendars/abc/" to "/123/calendars/abc/"
pub fn url_to_href(url: &str) -> String {
    match url.parse::<Uri>() {
        Ok(uri) if uri.scheme().is_some() => uri.path().to_string(),
        _ => url.to_string(),
    }
}

/// Make an href absolute using the scheme and authority of `base`.
pub fn absolute_url(base: &Uri, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    match (base.scheme_str(), base.authority()) {
        (Some(scheme), Some(authority)) => format!("{scheme}://{authority}{href}"),
        _ => href.to_string(),
    }
}

/// The 401/403 status behind a failed request, if credentials were rejected.
///
/// Walks the source chain so errors wrapping a [`DavError`] (such as
/// principal discovery failures) are recognised too.
pub fn rejected_status(err: &(dyn std::error::Error + 'static)) -> Option<StatusCode> {
    std::iter::successors(Some(err), |e| e.source())
        .filter_map(|e| e.downcast_ref::<DavError>())
        .find_map(|e| match e {
            WebDavError::BadStatusCode(status)
                if *status == StatusCode::UNAUTHORIZED || *status == StatusCode::FORBIDDEN =>
            {
                Some(*status)
            }
            _ => None,
        })
}

fn child_href(response: roxmltree::Node<'_, '_>) -> Option<String> {
    response
        .children()
        .find(|n| n.tag_name().name() == "href")
        .and_then(|n| n.text())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

// ============================================================================
// Custom CalDAV request for time-range filtered calendar queries
// ============================================================================

/// Request to fetch calendar resources with server-side time-range filtering.
///
/// This uses the CalDAV calendar-query REPORT with a time-range filter,
/// which is much more efficient than fetching all events and filtering locally.
pub struct GetCalendarResourcesInRange<'a> {
    collection_href: &'a str,
    start: &'a str,
    end: &'a str,
}

impl<'a> GetCalendarResourcesInRange<'a> {
    /// Create a new request to fetch calendar resources within a time range.
    ///
    /// `start` and `end` must be in CalDAV format: `YYYYMMDDTHHMMSSZ`
    pub fn new(collection_href: &'a str, start: &'a str, end: &'a str) -> Self {
        Self {
            collection_href,
            start,
            end,
        }
    }
}

impl DavRequest for GetCalendarResourcesInRange<'_> {
    type Response = Vec<CalendarObject>;
    type ParseError = ParseResponseError;
    type Error<E> = libdav::dav::WebDavError<E>;

    fn prepare_request(&self) -> std::result::Result<PreparedRequest, http::Error> {
        // Build calendar-query REPORT with time-range filter
        let body = format!(
            r#"<C:calendar-query xmlns="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
    <prop>
        <getetag/>
        <C:calendar-data/>
    </prop>
    <C:filter>
        <C:comp-filter name="VCALENDAR">
            <C:comp-filter name="VEVENT">
                <C:time-range start="{}" end="{}"/>
            </C:comp-filter>
        </C:comp-filter>
    </C:filter>
</C:calendar-query>"#,
            self.start, self.end
        );

        Ok(PreparedRequest {
            method: Method::from_bytes(b"REPORT")?,
            path: self.collection_href.to_string(),
            body,
            headers: vec![
                ("Depth".to_string(), "1".to_string()),
                ("Content-Type".to_string(), XML_CONTENT_TYPE.to_string()),
            ],
        })
    }

    fn parse_response(
        &self,
        parts: &http::response::Parts,
        body: &[u8],
    ) -> std::result::Result<Self::Response, ParseResponseError> {
        if !parts.status.is_success() {
            return Err(ParseResponseError::BadStatusCode(parts.status));
        }
        parse_calendar_resources(body)
    }
}

/// Parse calendar resources from a CalDAV multistatus response.
fn parse_calendar_resources(
    body: &[u8],
) -> std::result::Result<Vec<CalendarObject>, ParseResponseError> {
    let text = std::str::from_utf8(body)?;
    let doc = roxmltree::Document::parse(text)?;
    let root = doc.root_element();

    let mut resources = Vec::new();

    for response in root.descendants().filter(|n| n.tag_name().name() == "response") {
        let Some(href) = child_href(response) else { continue };

        let etag = response
            .descendants()
            .find(|n| n.tag_name().name() == "getetag")
            .and_then(|n| n.text())
            .map(|s| s.trim().to_string());

        let data = response
            .descendants()
            .find(|n| n.tag_name().name() == "calendar-data")
            .and_then(|n| n.text())
            .map(|s| s.to_string());

        // Only include resources that have calendar data
        if let Some(data) = data {
            resources.push(CalendarObject { href, etag, data });
        }
    }

    Ok(resources)
}
