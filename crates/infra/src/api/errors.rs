//! Classified request failures
//!
//! Every failure surfaced by the request pipeline is a [`ClientError`]: one
//! human-readable message plus a machine-readable [`ErrorKind`], the HTTP
//! status when there was one, and for transient failures a way to build a
//! fresh retry of the original request.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use taskdesk_common::{ErrorClassification, ErrorSeverity};
use taskdesk_domain::TaskdeskError;
use thiserror::Error;

use super::request::RequestDescriptor;

/// Field name to validation messages, as returned with a `422`.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Error kinds for request failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Offline, or the connection could not be established
    NetworkUnavailable,
    /// An attempt exceeded its wall-clock timeout
    Timeout,
    /// `401`
    Unauthorized,
    /// `403`
    Forbidden,
    /// `404`
    NotFound,
    /// `422`, with field errors
    Validation,
    /// `429`, with an optional `Retry-After`
    RateLimited,
    /// `5xx`
    ServerError,
    /// Anything else
    Unknown,
    /// A `401` that could not be recovered by refreshing the session. The
    /// session has been ended.
    ForcedLogout,
}

impl ErrorKind {
    /// Message used when the server did not supply one
    pub fn default_message(self) -> &'static str {
        match self {
            Self::NetworkUnavailable => "Network error. Please check your internet connection.",
            Self::Timeout => "Request timeout. Please check your connection and try again.",
            Self::Unauthorized => "Authentication required. Please log in.",
            Self::Forbidden => "Access denied. Insufficient permissions.",
            Self::NotFound => "The requested resource was not found.",
            Self::Validation => "Validation failed.",
            Self::RateLimited => "Too many requests. Please try again later.",
            Self::ServerError => "Server error occurred. Please try again.",
            Self::Unknown => "An unexpected error occurred.",
            Self::ForcedLogout => "Your session has expired. Please log in again.",
        }
    }

    /// Failures that may succeed if the same request is sent again later
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            Self::NetworkUnavailable | Self::Timeout | Self::ServerError | Self::RateLimited
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NetworkUnavailable => "network_unavailable",
            Self::Timeout => "timeout",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not_found",
            Self::Validation => "validation",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::Unknown => "unknown",
            Self::ForcedLogout => "forced_logout",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified request failure.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ClientError {
    kind: ErrorKind,
    message: String,
    server_message: bool,
    status: Option<u16>,
    request_id: Option<String>,
    retry_after: Option<Duration>,
    field_errors: FieldErrors,
    request: Option<Arc<RequestDescriptor>>,
}

impl ClientError {
    /// Error of `kind` carrying its default message.
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: kind.default_message().to_string(),
            server_message: false,
            status: None,
            request_id: None,
            retry_after: None,
            field_errors: FieldErrors::new(),
            request: None,
        }
    }

    /// Request refused locally because the client is offline.
    pub fn offline() -> Self {
        Self::new(ErrorKind::NetworkUnavailable)
            .with_message("No internet connection available")
    }

    /// A `401` that ended the session.
    pub fn forced_logout() -> Self {
        Self::new(ErrorKind::ForcedLogout).with_status(401)
    }

    /// Replace the message with a client-side one.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Replace the message with one the server sent back.
    pub fn with_server_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self.server_message = true;
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Server-requested wait before the next attempt.
    pub fn with_retry_after(mut self, delay: Duration) -> Self {
        self.retry_after = Some(delay);
        self
    }

    pub fn with_field_errors(mut self, field_errors: FieldErrors) -> Self {
        self.field_errors = field_errors;
        self
    }

    /// Attach the request this failure belongs to.
    pub fn for_request(mut self, request: &RequestDescriptor) -> Self {
        self.request_id = Some(request.request_id().to_string());
        self.request = Some(Arc::new(request.clone()));
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether [`message`](Self::message) came from the response body.
    pub fn has_server_message(&self) -> bool {
        self.server_message
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// Id of the failed request, for log correlation.
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Per-field validation messages; empty unless the kind is `Validation`.
    pub fn field_errors(&self) -> &FieldErrors {
        &self.field_errors
    }

    /// The failed request, reset to its first attempt, for transient
    /// failures. Pass it back to `RequestPipeline::send` to try again; the
    /// request id is preserved for log correlation.
    pub fn retry_request(&self) -> Option<RequestDescriptor> {
        if !self.kind.is_transient() {
            return None;
        }
        self.request.as_deref().map(RequestDescriptor::restart)
    }

    pub fn is_forced_logout(&self) -> bool {
        self.kind == ErrorKind::ForcedLogout
    }
}

impl ErrorClassification for ClientError {
    fn is_retryable(&self) -> bool {
        self.kind.is_transient()
    }

    fn severity(&self) -> ErrorSeverity {
        match self.kind {
            ErrorKind::NotFound | ErrorKind::Validation => ErrorSeverity::Info,
            ErrorKind::NetworkUnavailable
            | ErrorKind::Timeout
            | ErrorKind::RateLimited
            | ErrorKind::ServerError => ErrorSeverity::Warning,
            ErrorKind::Unauthorized | ErrorKind::Forbidden | ErrorKind::Unknown => {
                ErrorSeverity::Error
            }
            ErrorKind::ForcedLogout => ErrorSeverity::Critical,
        }
    }

    fn is_critical(&self) -> bool {
        self.kind == ErrorKind::ForcedLogout
    }

    fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }
}

impl From<TaskdeskError> for ClientError {
    fn from(err: TaskdeskError) -> Self {
        Self::new(ErrorKind::Unknown).with_message(err.to_string())
    }
}
