//! MCP tool surface.
//!
//! Each tool deserialises its parameters, delegates to `CalendarTools` and
//! returns JSON. Calendar errors become tool results with `isError` set so the
//! assistant can read `{"error": {"kind", "message"}}` and react.

use caldav_mcp_core::request::{CreateEventRequest, GetEventsRequest};
use caldav_mcp_core::{CalendarError, CalendarTools};
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, Implementation, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};
use serde::Serialize;
use serde_json::json;

#[derive(Clone)]
pub struct CalendarServer {
    tools: CalendarTools,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl CalendarServer {
    pub fn new(tools: CalendarTools) -> Self {
        Self {
            tools,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        description = "Get the current date and time in the server's timezone. Call this before creating or searching events relative to today."
    )]
    async fn get_current_time(&self) -> Result<CallToolResult, McpError> {
        tracing::info!("get_current_time");
        json_result(&self.tools.current_time())
    }

    #[tool(description = "List the calendars available on the CalDAV server (name, url, id).")]
    async fn list_calendars(&self) -> Result<CallToolResult, McpError> {
        tracing::info!("list_calendars");
        match self.tools.list_calendars().await {
            Ok(calendars) => json_result(&json!({ "calendars": calendars })),
            Err(e) => error_result(&e),
        }
    }

    #[tool(
        description = "Create an event in the named calendar. Times are ISO 8601 (YYYY-MM-DDTHH:MM:SS); without an offset they are in the server's timezone. Attendees are invited by email and asked to RSVP."
    )]
    async fn create_event(
        &self,
        Parameters(req): Parameters<CreateEventRequest>,
    ) -> Result<CallToolResult, McpError> {
        tracing::info!(calendar = %req.calendar_name, summary = %req.summary, "create_event");
        match self.tools.create_event(req).await {
            Ok(created) => json_result(&created),
            Err(e) => error_result(&e),
        }
    }

    #[tool(
        description = "Get events from the named calendar that overlap [start_time, end_time). Times are ISO 8601; recurring events are expanded into occurrences."
    )]
    async fn get_events(
        &self,
        Parameters(req): Parameters<GetEventsRequest>,
    ) -> Result<CallToolResult, McpError> {
        tracing::info!(
            calendar = %req.calendar_name,
            start = %req.start_time,
            end = %req.end_time,
            "get_events"
        );
        match self.tools.get_events(req).await {
            Ok(events) => json_result(&json!({ "events": events })),
            Err(e) => error_result(&e),
        }
    }
}

#[tool_handler]
impl ServerHandler for CalendarServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(format!(
                "Calendar tools backed by a CalDAV server. Naive times are interpreted in {}. \
                 Use get_current_time to resolve relative dates and list_calendars for exact calendar names.",
                self.tools.timezone()
            )),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Implementation::default()
            },
            ..ServerInfo::default()
        }
    }
}

fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::success(vec![Content::json(value)?]))
}

fn error_result(err: &CalendarError) -> Result<CallToolResult, McpError> {
    tracing::warn!(kind = ?err.kind(), error = %err, "Tool call failed");
    let body = json!({
        "error": {
            "kind": err.kind(),
            "message": err.to_string(),
        }
    });
    Ok(CallToolResult::error(vec![Content::json(body)?]))
}
