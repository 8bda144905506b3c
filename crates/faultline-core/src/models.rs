//! Canonical error event model and strongly-typed identifiers.
//!
//! Defines the immutable `ErrorEvent` shape that every capture path
//! produces and the dispatcher delivers. Serialization follows the wire
//! contract of the aggregation service: camelCase field names, optional
//! fields omitted entirely rather than sent as null.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Strongly-typed event identifier.
///
/// Wraps a UUID to prevent mixing with other ID types. The id is used for
/// log correlation only and is not part of the wire contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EventId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Identifying metadata attached to every event from this process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceContext {
    /// Logical name of the reporting service.
    pub service: String,
    /// Version label the hosting application is deployed as.
    pub version: String,
}

impl ServiceContext {
    /// Creates a service context from name and version labels.
    pub fn new(service: impl Into<String>, version: impl Into<String>) -> Self {
        Self { service: service.into(), version: version.into() }
    }
}

/// A single resolved stack frame.
///
/// Fields are best-effort: frames parsed from partial traces keep whatever
/// could be recovered and default the rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    /// Fully qualified function or symbol name.
    pub function: String,
    /// Source file path, when the trace carried one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Line number within the source file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

/// Request context captured alongside framework-surfaced errors.
///
/// Every field is independently optional; adapters populate whatever their
/// framework exposes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpContext {
    /// HTTP method of the failing request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Full request URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Client user agent string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Originating client IP.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_ip: Option<String>,
    /// Response status code the request completed with.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_status_code: Option<u16>,
}

impl HttpContext {
    /// Returns true when no field carries a value.
    pub fn is_empty(&self) -> bool {
        self.method.is_none()
            && self.url.is_none()
            && self.user_agent.is_none()
            && self.remote_ip.is_none()
            && self.response_status_code.is_none()
    }
}

/// Structured metadata supplied with manual reports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportMetadata {
    /// Identifier of the user the error occurred for.
    pub user: Option<String>,
    /// Request context, when the caller has one at hand.
    pub http: Option<HttpContext>,
}

impl ReportMetadata {
    /// Creates metadata carrying only a user identifier.
    pub fn for_user(user: impl Into<String>) -> Self {
        Self { user: Some(user.into()), http: None }
    }
}

/// Canonical, normalized representation of a single reported fault.
///
/// Immutable once built. The message is always non-empty: unnormalizable
/// inputs are coerced to a placeholder rather than dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEvent {
    /// Event id for log correlation, not part of the wire document.
    #[serde(skip)]
    pub id: EventId,
    /// Human-readable fault description, never empty.
    pub message: String,
    /// Ordered stack frames, innermost first. Omitted when unavailable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_frames: Option<Vec<StackFrame>>,
    /// Moment the fault was captured.
    pub event_time: DateTime<Utc>,
    /// Service identity of the reporting process.
    pub service_context: ServiceContext,
    /// Request context for framework-surfaced errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_request: Option<HttpContext>,
    /// User the fault occurred for, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl ErrorEvent {
    /// Creates a minimal event stamped with the current wall-clock time.
    ///
    /// Capture paths normally go through [`crate::Normalizer`], which uses
    /// an injected clock; this constructor covers callers that already
    /// hold a finished message.
    pub fn new(message: impl Into<String>, service_context: ServiceContext) -> Self {
        Self {
            id: EventId::new(),
            message: message.into(),
            stack_frames: None,
            event_time: Utc::now(),
            service_context,
            http_request: None,
            user: None,
        }
    }
}
